//! Domain events published by the host broker for UI layers.

use serde::Serialize;

use crate::host::ModalRequest;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum BrokerEvent {
    AppInitialized(AppPayload),
    RouteChanged(RouteChangedEventPayload),
    NavigationDenied(NavigationDeniedPayload),
    AppReset(AppResetPayload),
    ModalOpened(ModalRequest),
    ModalClosed(ModalClosedPayload),
    AppErrorReported(AppErrorReportedPayload),
    MessageForwarded(MessageForwardedPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppPayload {
    pub app_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteChangedEventPayload {
    pub app_id: String,
    pub route_path: String,
    pub internal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationScope {
    Internal,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationDeniedPayload {
    pub app_id: String,
    pub route_path: String,
    pub scope: NavigationScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppResetPayload {
    pub app_id: String,
    pub entry_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModalClosedPayload {
    pub modal_id: String,
    pub app_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppErrorReportedPayload {
    pub app_id: String,
    pub error: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageForwardedPayload {
    pub source_id: String,
    pub target_id: String,
}
