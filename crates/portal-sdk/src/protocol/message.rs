//! The wire unit: a typed event plus addressing metadata.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::time::now_millis;

use super::app::AppConfig;
use super::payload::{
    AppErrorPayload, AppReadyPayload, CloseModalPayload, NavigatePayload, NavigationErrorPayload,
    RouteChangedPayload, ShowModalPayload,
};
use super::validate::ValidationError;

/// Closed enumeration of message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    AppReady,
    AppError,
    NavigateInternal,
    NavigateParent,
    ShowModal,
    CloseModal,
    SendMessage,
    InitApp,
    InternalNavigationError,
    ParentNavigationError,
    RouteChanged,
}

/// Which party a message kind is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Sent by a child, handled by the host.
    Host,
    /// Sent by the host, handled by a child.
    Child,
    /// Handled by both (modal close echo).
    Both,
    /// Sent by one child, forwarded by the host to another.
    App,
}

impl EventType {
    pub const ALL: [EventType; 11] = [
        EventType::AppReady,
        EventType::AppError,
        EventType::NavigateInternal,
        EventType::NavigateParent,
        EventType::ShowModal,
        EventType::CloseModal,
        EventType::SendMessage,
        EventType::InitApp,
        EventType::InternalNavigationError,
        EventType::ParentNavigationError,
        EventType::RouteChanged,
    ];

    /// Wire name used in the `type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AppReady => "app:ready",
            EventType::AppError => "app:error",
            EventType::NavigateInternal => "app:navigation:internal",
            EventType::NavigateParent => "app:navigation:parent",
            EventType::ShowModal => "app:modal:show",
            EventType::CloseModal => "app:modal:close",
            EventType::SendMessage => "app:sendMessage",
            EventType::InitApp => "portal:init_app",
            EventType::InternalNavigationError => "portal:internal_navigation_error",
            EventType::ParentNavigationError => "portal:parent_navigation_error",
            EventType::RouteChanged => "portal:route_changed",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    pub fn audience(&self) -> Audience {
        match self {
            EventType::AppReady
            | EventType::AppError
            | EventType::NavigateInternal
            | EventType::NavigateParent
            | EventType::ShowModal => Audience::Host,
            EventType::CloseModal => Audience::Both,
            EventType::SendMessage => Audience::App,
            EventType::InitApp
            | EventType::InternalNavigationError
            | EventType::ParentNavigationError
            | EventType::RouteChanged => Audience::Child,
        }
    }

    pub fn is_host_bound(&self) -> bool {
        matches!(self.audience(), Audience::Host | Audience::Both | Audience::App)
    }

    pub fn is_child_bound(&self) -> bool {
        matches!(self.audience(), Audience::Child | Audience::Both | Audience::App)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message kind together with its payload (`type` + `data` on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PortalEvent {
    #[serde(rename = "app:ready")]
    AppReady(AppReadyPayload),
    #[serde(rename = "app:error")]
    AppError(AppErrorPayload),
    #[serde(rename = "app:navigation:internal")]
    NavigateInternal(NavigatePayload),
    #[serde(rename = "app:navigation:parent")]
    NavigateParent(NavigatePayload),
    #[serde(rename = "app:modal:show")]
    ShowModal(ShowModalPayload),
    #[serde(rename = "app:modal:close")]
    CloseModal(CloseModalPayload),
    /// App-to-app message; the payload is any JSON object, forwarded verbatim.
    #[serde(rename = "app:sendMessage")]
    SendMessage(Map<String, Value>),
    #[serde(rename = "portal:init_app")]
    InitApp(AppConfig),
    #[serde(rename = "portal:internal_navigation_error")]
    InternalNavigationError(NavigationErrorPayload),
    #[serde(rename = "portal:parent_navigation_error")]
    ParentNavigationError(NavigationErrorPayload),
    #[serde(rename = "portal:route_changed")]
    RouteChanged(RouteChangedPayload),
}

impl PortalEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            PortalEvent::AppReady(_) => EventType::AppReady,
            PortalEvent::AppError(_) => EventType::AppError,
            PortalEvent::NavigateInternal(_) => EventType::NavigateInternal,
            PortalEvent::NavigateParent(_) => EventType::NavigateParent,
            PortalEvent::ShowModal(_) => EventType::ShowModal,
            PortalEvent::CloseModal(_) => EventType::CloseModal,
            PortalEvent::SendMessage(_) => EventType::SendMessage,
            PortalEvent::InitApp(_) => EventType::InitApp,
            PortalEvent::InternalNavigationError(_) => EventType::InternalNavigationError,
            PortalEvent::ParentNavigationError(_) => EventType::ParentNavigationError,
            PortalEvent::RouteChanged(_) => EventType::RouteChanged,
        }
    }
}

/// A message as it travels over the transport.
///
/// Immutable once constructed: every send builds a fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalMessage {
    #[serde(flatten)]
    pub event: PortalEvent,
    /// Identity of the sender (`"portal"` or an app id).
    pub source_id: String,
    /// Intended recipient; absent for broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl PortalMessage {
    /// Build a message stamped with the current time.
    pub fn new(event: PortalEvent, source_id: impl Into<String>, target_id: Option<String>) -> Self {
        Self {
            event,
            source_id: source_id.into(),
            target_id,
            timestamp: now_millis(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event.event_type()
    }

    /// Serialized form handed to a transport.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Reject messages whose `targetId` names someone the receiver is not.
    ///
    /// An absent `targetId` is accepted: it marks a broadcast.
    pub fn check_addressed<F>(&self, is_recipient: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> bool,
    {
        match &self.target_id {
            Some(target_id) if !is_recipient(target_id) => Err(ValidationError::Unaddressed {
                target_id: target_id.clone(),
            }),
            _ => Ok(()),
        }
    }
}
