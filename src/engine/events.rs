// src/engine/events.rs

//! Push-based fan-out of engine events to UI subscribers.
//!
//! Subscribers are kept in an explicit registry and each gets its own
//! unbounded channel, so publishing never waits on a slow consumer. A
//! subscriber whose receiver has been dropped is removed the next time an
//! event fails to reach it.
//!
//! Events published before a subscriber attaches are not replayed; a log
//! viewer that opens mid-run reads the `LogBuffer` snapshot first.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::errors::{poisoned, Result};
use crate::types::{CommandId, ExecutionState, LogLine, StreamKind};

/// Event name used by the UI for status changes.
pub const STATUS_CHANGED: &str = "command-status-changed";
/// Event name used by the UI for log lines.
pub const LOG_UPDATE: &str = "command-log-update";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum EngineEvent {
    StatusChanged(ExecutionState),
    LogLine(LogLine),
}

impl EngineEvent {
    pub fn command_id(&self) -> CommandId {
        match self {
            EngineEvent::StatusChanged(state) => state.command_id,
            EngineEvent::LogLine(line) => line.command_id,
        }
    }

    /// UI-facing event name.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::StatusChanged(_) => STATUS_CHANGED,
            EngineEvent::LogLine(_) => LOG_UPDATE,
        }
    }
}

pub type SubscriberId = u64;

/// Receiving side of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<EngineEvent>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once the subscriber was removed.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug, Default)]
struct Subscribers {
    next_id: SubscriberId,
    senders: HashMap<SubscriberId, mpsc::UnboundedSender<EngineEvent>>,
}

#[derive(Debug, Default)]
pub struct EventBroadcaster {
    subscribers: Mutex<Subscribers>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Result<Subscription> {
        let mut subs = self.subscribers.lock().map_err(poisoned("event subscribers"))?;
        subs.next_id += 1;
        let id = subs.next_id;
        let (tx, rx) = mpsc::unbounded_channel();
        subs.senders.insert(id, tx);
        debug!(subscriber = id, "subscriber attached");
        Ok(Subscription { id, rx })
    }

    /// Detach a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> Result<bool> {
        let mut subs = self.subscribers.lock().map_err(poisoned("event subscribers"))?;
        let removed = subs.senders.remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "subscriber detached");
        }
        Ok(removed)
    }

    pub fn subscriber_count(&self) -> Result<usize> {
        let subs = self.subscribers.lock().map_err(poisoned("event subscribers"))?;
        Ok(subs.senders.len())
    }

    pub fn publish_status_change(&self, state: ExecutionState) -> Result<()> {
        self.publish(EngineEvent::StatusChanged(state))
    }

    pub fn publish_log_line(
        &self,
        command_id: CommandId,
        stream: StreamKind,
        line: impl Into<String>,
    ) -> Result<()> {
        self.publish(EngineEvent::LogLine(LogLine::new(command_id, stream, line)))
    }

    /// Deliver to every current subscriber, dropping the ones that are gone.
    pub fn publish(&self, event: EngineEvent) -> Result<()> {
        let mut subs = self.subscribers.lock().map_err(poisoned("event subscribers"))?;
        trace!(event = event.name(), command_id = event.command_id(), "publishing");

        subs.senders.retain(|id, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                debug!(subscriber = *id, "subscriber gone; dropping");
            }
            alive
        });
        Ok(())
    }
}
