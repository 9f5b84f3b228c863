use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Day, Event};

const CHANNEL_CAPACITY: usize = 256;

/// Fire-and-forget broadcast hub, one channel per business day. Connected
/// dispatcher viewers subscribe to the days they display and re-fetch the
/// schedule on any event; a lost or lagged notification only delays a
/// refresh, it never corrupts state.
pub struct NotifyHub {
    channels: DashMap<Day, broadcast::Sender<Event>>,
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
        }
    }

    /// Subscribe to change notifications for a day. Creates the channel if needed.
    pub fn subscribe(&self, day: Day) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(day)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is watching the day.
    pub fn send(&self, day: Day, event: &Event) {
        if let Some(sender) = self.channels.get(&day) {
            let _ = sender.send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe(42);

        let event = Event::WorkOrderConfirmed {
            id: Ulid::new(),
            day: 42,
            actor: "dispatcher-a".into(),
            at: 100,
        };
        hub.send(42, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(
            7,
            &Event::SlotUnlocked {
                id: Ulid::new(),
                day: 7,
            },
        );
    }

    #[tokio::test]
    async fn days_are_isolated() {
        let hub = NotifyHub::new();
        let mut rx_other = hub.subscribe(8);
        let _rx_target = hub.subscribe(7);

        hub.send(
            7,
            &Event::SlotUnlocked {
                id: Ulid::new(),
                day: 7,
            },
        );

        assert!(matches!(
            rx_other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
