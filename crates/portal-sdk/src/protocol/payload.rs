//! Payload shapes, one per message type.
//!
//! Unknown fields are ignored; a missing required field invalidates the whole
//! message.

use serde::{Deserialize, Serialize};

/// `app:ready` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppReadyPayload {
    pub message: String,
}

/// `app:error` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppErrorPayload {
    /// Machine-readable error kind (e.g. `initialization_error`).
    pub error: String,
    pub message: String,
}

/// `app:navigation:internal` and `app:navigation:parent` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatePayload {
    pub route_path: String,
}

/// Content displayed by a host-rendered modal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalContent {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModalSize {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalDisplayOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ModalSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_on_click_outside: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_close_button: Option<bool>,
}

/// `app:modal:show` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowModalPayload {
    /// Id chosen by the requesting app; the host generates one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modal_id: Option<String>,
    pub content: ModalContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_options: Option<ModalDisplayOptions>,
}

/// `app:modal:close` payload, sent by an app or echoed back by the host.
///
/// Without `modal_id` the close applies to every modal of the sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseModalPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modal_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationErrorKind {
    InternalNavigationBoundaryViolation,
    ParentNavigationBoundaryViolation,
}

/// Payload of both navigation-denied replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationErrorPayload {
    pub error: NavigationErrorKind,
    pub message: String,
    /// The path that violated the allow-list.
    pub route_path: String,
}

impl NavigationErrorPayload {
    pub fn denied(error: NavigationErrorKind, route_path: impl Into<String>) -> Self {
        Self {
            error,
            message: "Insufficient permissions to navigate there.".to_string(),
            route_path: route_path.into(),
        }
    }
}

/// `portal:route_changed` payload. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteChangedPayload {
    /// App whose request caused the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    pub route_path: String,
    /// `true` for navigation inside a child frame, `false` for host navigation.
    pub internal: bool,
}
