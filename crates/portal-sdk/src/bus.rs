use tokio::sync::broadcast;

use crate::event::BrokerEvent;

#[derive(Clone)]
pub struct Bus {
    sender: broadcast::Sender<BrokerEvent>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BrokerEvent> {
        self.sender.subscribe()
    }

    pub fn publish(
        &self,
        event: BrokerEvent,
    ) -> Result<usize, broadcast::error::SendError<BrokerEvent>> {
        self.sender.send(event)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Bus")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
