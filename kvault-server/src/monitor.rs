//! # Command Monitor Broadcast
//!
//! Purpose: Back `MONITOR` sessions, which stream every command dispatched
//! anywhere on the server — a peripheral component per distilled spec §1
//! ("documented as peripheral, not part of the hot path's core contract").
//!
//! Every dispatched command is published here regardless of whether any
//! `MONITOR` session is subscribed; `tokio::sync::broadcast` drops a
//! message with no receivers for free, so publishing is cheap when nobody
//! is watching.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct MonitorEvent {
    pub db_index: u16,
    pub argv: Vec<Vec<u8>>,
}

pub struct MonitorBroadcaster {
    tx: broadcast::Sender<MonitorEvent>,
}

impl MonitorBroadcaster {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        MonitorBroadcaster { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    /// Publishes a dispatched command. Silently dropped if nobody is
    /// subscribed, or if the channel is momentarily full (lagging
    /// subscribers only affect their own stream via `RecvError::Lagged`).
    pub fn publish(&self, db_index: u16, argv: &[Vec<u8>]) {
        let _ = self.tx.send(MonitorEvent {
            db_index,
            argv: argv.to_vec(),
        });
    }
}

impl Default for MonitorBroadcaster {
    fn default() -> Self {
        MonitorBroadcaster::new()
    }
}

/// Formats a `MonitorEvent` the way `MONITOR` streams it to subscribers:
/// a simple string line naming the database and quoted argv.
pub fn format_monitor_line(event: &MonitorEvent) -> String {
    let mut line = format!("[{}] ", event.db_index);
    for (idx, arg) in event.argv.iter().enumerate() {
        if idx > 0 {
            line.push(' ');
        }
        line.push('"');
        line.push_str(&String::from_utf8_lossy(arg));
        line.push('"');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_receives_published_event() {
        let broadcaster = MonitorBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        broadcaster.publish(0, &[b"GET".to_vec(), b"k".to_vec()]);
        let event = rx.try_recv().expect("event available");
        assert_eq!(event.db_index, 0);
        assert_eq!(event.argv, vec![b"GET".to_vec(), b"k".to_vec()]);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let broadcaster = MonitorBroadcaster::new();
        broadcaster.publish(1, &[b"PING".to_vec()]);
    }

    #[test]
    fn formats_line_with_quoted_argv() {
        let event = MonitorEvent {
            db_index: 2,
            argv: vec![b"SET".to_vec(), b"k".to_vec(), b"v".to_vec()],
        };
        assert_eq!(format_monitor_line(&event), "[2] \"SET\" \"k\" \"v\"");
    }
}
