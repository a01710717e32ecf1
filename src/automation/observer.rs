//! Progress events emitted by an automation run

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Step within one work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStep {
    Restored,
    Launched,
    LinkOpened,
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunState {
    /// Every planned item was processed, whatever its outcome
    Completed,
    /// A precondition failed before any item ran
    Aborted { reason: String },
    /// Stopped on request; remaining items were not started
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub event_id: i64,
    pub state: RunState,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Event emitted while a run progresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    RunStarted {
        run_id: Uuid,
        event_id: i64,
        teams: usize,
        items: usize,
    },
    SlotSkipped {
        team_id: i64,
        slot: usize,
    },
    ItemStarted {
        team_id: i64,
        slot: usize,
        profile_id: i64,
    },
    ItemProgress {
        team_id: i64,
        slot: usize,
        step: ItemStep,
    },
    ItemCompleted {
        team_id: i64,
        slot: usize,
        profile: String,
        user_id: String,
    },
    ItemFailed {
        team_id: i64,
        slot: usize,
        error: String,
    },
    TeamCompleted {
        team_id: i64,
        name: String,
        completed: usize,
        failed: usize,
    },
    RunFinished(RunSummary),
}

impl RunEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunFinished(_))
    }
}

/// Receives run events in order
#[async_trait]
pub trait RunObserver: Send + Sync {
    async fn on_event(&self, event: RunEvent);
}

/// Forwards events onto an mpsc channel for a single consumer
pub struct ChannelObserver {
    tx: mpsc::Sender<RunEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl RunObserver for ChannelObserver {
    async fn on_event(&self, event: RunEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Run event receiver dropped");
        }
    }
}

/// Keeps every event; used by tests and dry runs
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl RunObserver for RecordingObserver {
    async fn on_event(&self, event: RunEvent) {
        self.events.lock().push(event);
    }
}
