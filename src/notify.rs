use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::log::AppointmentEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for live appends, one channel per appointment log.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<AppointmentEvent>>,
}

fn channel_key(group: &str, appointment: &str) -> String {
    format!("{group}/{appointment}")
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to appends on one appointment log. Creates the channel if needed.
    pub fn subscribe(&self, group: &str, appointment: &str) -> broadcast::Receiver<AppointmentEvent> {
        let sender = self
            .channels
            .entry(channel_key(group, appointment))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, group: &str, appointment: &str, event: &AppointmentEvent) {
        if let Some(sender) = self.channels.get(&channel_key(group, appointment)) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop channels whose subscribers have all gone away.
    pub fn prune(&self) {
        self.channels.retain(|_, sender| sender.receiver_count() > 0);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}
