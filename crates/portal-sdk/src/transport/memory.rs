//! In-process transport backed by tokio channels.
//!
//! Used to wire a host and its children inside one process (tests, the demo
//! binary, native embedders that run children as tasks).

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{FrameHandle, Transport, TransportError};

/// Sending end of an in-memory channel; also records frame reloads.
pub struct MemoryPort {
    label: String,
    sender: mpsc::UnboundedSender<Value>,
    reloads: Mutex<Vec<String>>,
}

impl MemoryPort {
    /// URLs passed to [`FrameHandle::reload`], oldest first.
    pub fn reloads(&self) -> Vec<String> {
        self.reloads.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for MemoryPort {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("MemoryPort")
            .field("label", &self.label)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl Transport for MemoryPort {
    fn post(&self, message: Value) -> Result<(), TransportError> {
        self.sender.send(message).map_err(|_| TransportError::Closed)
    }
}

impl FrameHandle for MemoryPort {
    fn reload(&self, url: &str) -> Result<(), TransportError> {
        if self.sender.is_closed() {
            return Err(TransportError::Closed);
        }
        tracing::debug!("frame '{}' reloading at {url}", self.label);
        self.reloads.lock().push(url.to_string());
        Ok(())
    }
}

/// Create a port and the receiver that observes what is posted to it.
pub fn port(label: impl Into<String>) -> (Arc<MemoryPort>, mpsc::UnboundedReceiver<Value>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let port = Arc::new(MemoryPort {
        label: label.into(),
        sender,
        reloads: Mutex::new(Vec::new()),
    });
    (port, receiver)
}

/// Deliver everything arriving on `receiver` to `handler`, one message at a
/// time, until `cancel` fires or every sender is gone.
///
/// Cancellation is checked before each delivery, so messages already queued
/// when `cancel` fires are never handed to `handler`.
pub fn spawn_pump<F>(
    mut receiver: mpsc::UnboundedReceiver<Value>,
    cancel: CancellationToken,
    handler: F,
) -> JoinHandle<()>
where
    F: Fn(Value) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(message) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        handler(message);
                    }
                    None => break,
                },
            }
        }
        receiver.close();
    })
}
