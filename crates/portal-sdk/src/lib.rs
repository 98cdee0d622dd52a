pub mod error;
pub mod utils;

pub mod protocol;
pub mod routes;
pub mod transport;

pub mod bus;
pub mod event;
pub mod listener;

pub mod child;
pub mod config;
pub mod host;

pub use crate::child::{AgentOptions, AgentPhase, ChildAgent};
pub use crate::config::PortalConfig;
pub use crate::error::{PortalError, PortalResult};
pub use crate::event::BrokerEvent;
pub use crate::host::{HostBroker, HostOptions, ModalRequest, NavigateFn};
pub use crate::listener::{ListenerId, MessageDirection};
pub use crate::protocol::{AppConfig, PortalEvent, PortalMessage, PORTAL_ID};
pub use crate::routes::{match_route, RouteMatch, RouteMatchOptions};
pub use crate::transport::{FrameHandle, Transport, TransportError};
