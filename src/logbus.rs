//! Log Bus: per-workspace publish/subscribe fan-out for process output and
//! lifecycle events, with a bounded replay buffer so a subscriber joining
//! mid-run still gets recent history (§4.5).
//!
//! Each workspace gets its own broadcast channel. Slow subscribers drop the
//! oldest buffered events rather than block the publisher — a dev server's
//! stdout must never apply backpressure to the process that's producing it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

const CHANNEL_CAPACITY: usize = 512;
const REPLAY_BUFFER_LEN: usize = 200;

/// `(workspace_id, message, is_error, timestamp)` per §3 — `workspace_id` is
/// the topic key subscribers already join by, so it isn't carried on the
/// event itself; the Subscription Fabric attaches it to the outbound frame.
#[derive(Debug, Clone, Serialize)]
pub struct LogEvent {
    pub message: String,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, is_error: bool) -> Self {
        Self { message: message.into(), is_error, timestamp: Utc::now() }
    }

    pub fn stdout(line: impl Into<String>) -> Self {
        Self::new(line, false)
    }

    pub fn stderr(line: impl Into<String>) -> Self {
        Self::new(line, true)
    }
}

struct Workspace {
    sender: broadcast::Sender<LogEvent>,
    replay: VecDeque<LogEvent>,
}

#[derive(Clone, Default)]
pub struct LogBus {
    workspaces: Arc<Mutex<HashMap<i64, Workspace>>>,
}

impl LogBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, app_id: i64, event: LogEvent) {
        let mut workspaces = self.workspaces.lock().await;
        let entry = workspaces.entry(app_id).or_insert_with(|| Workspace {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            replay: VecDeque::with_capacity(REPLAY_BUFFER_LEN),
        });

        if entry.replay.len() == REPLAY_BUFFER_LEN {
            entry.replay.pop_front();
        }
        entry.replay.push_back(event.clone());

        // No subscribers is not an error — stdout produced before anyone
        // joins the room is still recorded in the replay buffer.
        let _ = entry.sender.send(event);
    }

    /// Subscribe to an app's log room, returning buffered replay events and a
    /// receiver for everything published from this point on.
    pub async fn subscribe(&self, app_id: i64) -> (Vec<LogEvent>, broadcast::Receiver<LogEvent>) {
        let mut workspaces = self.workspaces.lock().await;
        let entry = workspaces.entry(app_id).or_insert_with(|| Workspace {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            replay: VecDeque::with_capacity(REPLAY_BUFFER_LEN),
        });
        (entry.replay.iter().cloned().collect(), entry.sender.subscribe())
    }

    pub async fn clear(&self, app_id: i64) {
        self.workspaces.lock().await.remove(&app_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_buffer_caps_at_configured_length() {
        let bus = LogBus::new();
        for i in 0..(REPLAY_BUFFER_LEN + 10) {
            bus.publish(1, LogEvent::stdout(i.to_string())).await;
        }
        let (replay, _rx) = bus.subscribe(1).await;
        assert_eq!(replay.len(), REPLAY_BUFFER_LEN);
    }

    #[tokio::test]
    async fn late_subscriber_sees_prior_events_via_replay() {
        let bus = LogBus::new();
        bus.publish(1, LogEvent::stdout("hello")).await;
        let (replay, _rx) = bus.subscribe(1).await;
        assert_eq!(replay.len(), 1);
    }

    #[tokio::test]
    async fn subscriber_receives_events_published_after_join() {
        let bus = LogBus::new();
        let (_, mut rx) = bus.subscribe(1).await;
        bus.publish(1, LogEvent::stdout("live")).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.message, "live");
        assert!(!event.is_error);
    }

    #[tokio::test]
    async fn stderr_lines_are_flagged_as_errors() {
        let bus = LogBus::new();
        bus.publish(1, LogEvent::stderr("boom")).await;
        let (replay, _rx) = bus.subscribe(1).await;
        assert!(replay[0].is_error);
    }
}
