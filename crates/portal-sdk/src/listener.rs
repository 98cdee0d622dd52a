//! Plain callback registration, scoped to an instance's cancellation token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::protocol::PortalMessage;

/// Handle returned by `add_event_listener`, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Whether a message was received or sent by the instance notifying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

pub type MessageListener = Arc<dyn Fn(&PortalMessage, MessageDirection) + Send + Sync>;

/// Listeners registered on one broker or agent.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, MessageListener)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: MessageListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Invoke every listener with `message`, outside the lock.
    ///
    /// Stops as soon as `cancel` is observed, so a `destroy()` issued by one
    /// listener silences the rest. Returns the number of invocations.
    pub fn emit(
        &self,
        message: &PortalMessage,
        direction: MessageDirection,
        cancel: &CancellationToken,
    ) -> usize {
        let snapshot: Vec<MessageListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        let mut invoked = 0;
        for listener in snapshot {
            if cancel.is_cancelled() {
                break;
            }
            listener(message, direction);
            invoked += 1;
        }
        invoked
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}
