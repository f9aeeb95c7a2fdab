//! Event types for the MFO event system
//!
//! The resolution session publishes everything a view needs through
//! `SessionEvent`s on an `EventBus`. Views never read session state directly.

mod session_types;

pub use session_types::{Candidate, EnrichedMetadata, EpisodeOption, MediaKind, SeasonOption, Stage};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Resolution session events
///
/// Serialized with a `type` tag so they can be forwarded verbatim to a
/// browser (SSE/WebSocket) view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// Stage transition
    StageChanged {
        session_id: Uuid,
        old_stage: Stage,
        new_stage: Stage,
        timestamp: DateTime<Utc>,
    },

    /// Text appended to the session's raw buffer (backend output, echo
    /// lines, error lines)
    OutputAppended { session_id: Uuid, text: String },

    /// Displayed candidate set replaced wholesale
    CandidatesReplaced {
        session_id: Uuid,
        generation: u64,
        candidates: Vec<Candidate>,
    },

    /// Displayed candidate set emptied
    CandidatesCleared { session_id: Uuid, generation: u64 },

    /// Poster/metadata merged into one candidate of the current generation
    CandidateEnriched {
        session_id: Uuid,
        generation: u64,
        candidate: Candidate,
    },

    /// Season sub-dialog options
    SeasonOptions {
        session_id: Uuid,
        external_id: String,
        seasons: Vec<SeasonOption>,
    },

    /// Episode sub-dialog options
    EpisodeOptions {
        session_id: Uuid,
        external_id: String,
        season_number: u32,
        episodes: Vec<EpisodeOption>,
    },

    /// Free-form input became available (fallback or explicit prompt)
    ManualInputEnabled { session_id: Uuid },

    /// Opaque structured payload from the backend, forwarded untouched
    StructuredData {
        session_id: Uuid,
        data: serde_json::Value,
    },

    /// Error surfaced to the user (also appended to the raw buffer)
    SessionError { session_id: Uuid, message: String },

    /// Session closed (explicitly, by auto-close, or by termination)
    SessionClosed {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            SessionEvent::StageChanged { session_id, .. }
            | SessionEvent::OutputAppended { session_id, .. }
            | SessionEvent::CandidatesReplaced { session_id, .. }
            | SessionEvent::CandidatesCleared { session_id, .. }
            | SessionEvent::CandidateEnriched { session_id, .. }
            | SessionEvent::SeasonOptions { session_id, .. }
            | SessionEvent::EpisodeOptions { session_id, .. }
            | SessionEvent::ManualInputEnabled { session_id }
            | SessionEvent::StructuredData { session_id, .. }
            | SessionEvent::SessionError { session_id, .. }
            | SessionEvent::SessionClosed { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast bus for session events
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow receivers lag
    ///
    /// # Examples
    ///
    /// ```
    /// use mfo_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
