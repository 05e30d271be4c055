//! Run events and the sink that enforces their ordering.
//!
//! One run moves through
//! `idle → trending → research → generation → complete`, each stage going
//! active (after its `stage` event) then done (after its `result` event).
//! An `error` event may follow any non-terminal phase. Nothing follows a
//! terminal event.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use postforge_shared::{ParsedPost, PostforgeError, Result, StageId};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One event of a run, serialized as `{"type": ..., "message": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AgentEvent {
    /// A stage is starting.
    Stage { stage: StageId, message: String },
    /// Informational progress inside the active stage.
    Progress { message: String },
    /// A stage finished with its output.
    Result {
        stage: StageId,
        message: String,
        data: StageOutput,
    },
    /// The run finished; carries the final posts.
    Complete { message: String, data: StageOutput },
    /// The run failed.
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<StageId>,
    },
}

impl AgentEvent {
    pub fn message(&self) -> &str {
        match self {
            Self::Stage { message, .. }
            | Self::Progress { message }
            | Self::Result { message, .. }
            | Self::Complete { message, .. }
            | Self::Error { message, .. } => message,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Stage payloads: `{topics}`, `{report}` or `{posts}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageOutput {
    Topics { topics: String },
    Report { report: String },
    Posts { posts: Vec<ParsedPost> },
}

// ---------------------------------------------------------------------------
// RunPhase
// ---------------------------------------------------------------------------

/// Where a run is in the event protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Active(StageId),
    Done(StageId),
    Complete,
    Errored,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Errored)
    }

    /// The phase after `event`, or `None` if `event` is not allowed here.
    fn after(&self, event: &AgentEvent) -> Option<RunPhase> {
        match (*self, event) {
            (Self::Idle, AgentEvent::Stage { stage, .. }) if *stage == StageId::Trending => {
                Some(Self::Active(*stage))
            }
            (Self::Done(done), AgentEvent::Stage { stage, .. }) if done.next() == Some(*stage) => {
                Some(Self::Active(*stage))
            }
            (Self::Active(active), AgentEvent::Progress { .. }) => Some(Self::Active(active)),
            (Self::Active(active), AgentEvent::Result { stage, .. }) if active == *stage => {
                Some(Self::Done(active))
            }
            (Self::Done(StageId::Generation), AgentEvent::Complete { .. }) => Some(Self::Complete),
            (phase, AgentEvent::Error { .. }) if !phase.is_terminal() => Some(Self::Errored),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// EventSink
// ---------------------------------------------------------------------------

/// Producer side of a run's event channel.
///
/// Events that would break the protocol are logged and dropped. Once the
/// receiver is gone the sink is closed: later events are discarded and
/// [`EventSink::ensure_open`] reports `Cancelled`.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<AgentEvent>,
    phase: RunPhase,
    closed: bool,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self {
            tx,
            phase: RunPhase::Idle,
            closed: false,
        }
    }

    /// A sink and the receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.closed || self.tx.is_closed()
    }

    /// Stage-boundary check: `Cancelled` once the consumer has gone.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(PostforgeError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub async fn stage(&mut self, stage: StageId, message: impl Into<String>) {
        self.emit(AgentEvent::Stage {
            stage,
            message: message.into(),
        })
        .await;
    }

    pub async fn progress(&mut self, message: impl Into<String>) {
        self.emit(AgentEvent::Progress {
            message: message.into(),
        })
        .await;
    }

    pub async fn result(&mut self, stage: StageId, message: impl Into<String>, data: StageOutput) {
        self.emit(AgentEvent::Result {
            stage,
            message: message.into(),
            data,
        })
        .await;
    }

    pub async fn complete(&mut self, message: impl Into<String>, posts: Vec<ParsedPost>) {
        self.emit(AgentEvent::Complete {
            message: message.into(),
            data: StageOutput::Posts { posts },
        })
        .await;
    }

    pub async fn error(&mut self, message: impl Into<String>, stage: Option<StageId>) {
        self.emit(AgentEvent::Error {
            message: message.into(),
            stage,
        })
        .await;
    }

    async fn emit(&mut self, event: AgentEvent) {
        let Some(next) = self.phase.after(&event) else {
            warn!(phase = ?self.phase, event = ?event, "dropping out-of-order event");
            return;
        };
        self.phase = next;

        if self.closed {
            return;
        }
        if self.tx.send(event).await.is_err() {
            debug!("event receiver dropped");
            self.closed = true;
        }
    }
}
