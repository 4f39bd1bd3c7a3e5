use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::ScheduleEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Fire-and-forget fan-out of ledger events, per slot and across all slots.
/// Mail senders and other side channels subscribe here; a slow or absent
/// subscriber never holds up a booking.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<ScheduleEvent>>,
    all: broadcast::Sender<ScheduleEvent>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to events for one slot. Creates the channel if needed.
    pub fn subscribe(&self, slot_id: Ulid) -> broadcast::Receiver<ScheduleEvent> {
        self.channels
            .entry(slot_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.all.subscribe()
    }

    /// No-op when nobody is listening.
    pub fn send(&self, event: &ScheduleEvent) {
        if let Some(sender) = self.channels.get(&event.slot_id()) {
            let _ = sender.send(event.clone());
        }
        let _ = self.all.send(event.clone());
    }
}
