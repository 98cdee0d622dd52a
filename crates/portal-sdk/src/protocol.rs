//! Portal wire protocol: the closed message schema shared by host and child.
//!
//! Both sides are built from this one module, so neither can silently accept
//! a message shape the other does not understand. Adding a message kind is a
//! schema change (bump [`PROTOCOL_VERSION`]), never a runtime option.

pub mod app;
pub mod message;
pub mod payload;
pub mod validate;

pub use app::AppConfig;
pub use message::{Audience, EventType, PortalEvent, PortalMessage};
pub use payload::{
    AppErrorPayload, AppReadyPayload, CloseModalPayload, ModalContent, ModalDisplayOptions,
    ModalSize, NavigatePayload, NavigationErrorKind, NavigationErrorPayload, RouteChangedPayload,
    ShowModalPayload,
};
pub use validate::{parse_message, parse_message_str, ValidationError};

/// Identity of the host on the wire, used as `sourceId` for everything the
/// host sends and as `targetId` for everything a child sends to the host.
pub const PORTAL_ID: &str = "portal";

/// Version of the closed message schema. A portal config declaring another
/// `protocolVersion` fails validation.
pub const PROTOCOL_VERSION: u32 = 1;
