//! Host-side broker: owns the registry of micro-apps, enforces their
//! navigation permissions, and brokers modal and app-to-app traffic.

mod broker;
mod modal;
mod registry;

#[cfg(test)]
mod tests;

pub use broker::{HostBroker, HostOptions, NavigateFn};
pub use modal::ModalRequest;
