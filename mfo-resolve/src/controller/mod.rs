//! Session controller
//!
//! Owns one `Session` and is the only place its state changes. Everything
//! that can change it (decoded backend messages, timer firings, enrichment
//! results, user commands) is funnelled onto the single task running
//! [`SessionController::run`], so no locking is needed beyond the
//! per-session selection lock.
//!
//! **Architecture:**
//! - `extraction` - debounced candidate parsing, lock release, enrichment
//! - `selection` - user selections and manual search input
//! - `season_flow` - season/episode sub-dialog
//! - `completion` - `done` reconciliation, timers, stream end, close

mod completion;
mod extraction;
mod season_flow;
mod selection;

use crate::config::SessionSettings;
use crate::enrichment::{EnrichmentFetcher, EnrichmentReport, EnrichmentUpdate};
use crate::error::ResolveResult;
use crate::models::{BackendMessage, ResolveRequest, Session, SessionProjection, Stage};
use crate::prompt_detector::{PromptDetector, PromptKind};
use crate::services::{BackendChannel, MetadataLookup};
use crate::stream_reader::{decode_stream, StreamEvent};
use crate::timers::{PendingTimers, TimerFired, TimerKind};
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use mfo_common::config::TimingConfig;
use mfo_common::events::{EventBus, SessionEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// User action forwarded by the view layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Menu choice, usually an ordinal
    Select(String),
    /// Free-form search term
    ManualSearch(String),
    SelectSeason(u32),
    SelectEpisode(u32),
    Close,
}

/// Results reported back by tasks the controller spawned
#[derive(Debug, Clone)]
pub enum InternalEvent {
    Enrichment(EnrichmentUpdate),
    EnrichmentFinished {
        generation: u64,
        report: EnrichmentReport,
    },
}

pub struct SessionController {
    session: Session,
    backend: Arc<dyn BackendChannel>,
    metadata: Arc<dyn MetadataLookup>,
    enrichment: Arc<EnrichmentFetcher>,
    detector: PromptDetector,
    timings: TimingConfig,
    timers: PendingTimers,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
    enrichment_cancel: Option<CancellationToken>,
    events: EventBus,
    stream: Option<BoxStream<'static, Vec<StreamEvent>>>,
}

impl SessionController {
    /// Create a controller for one resolution request
    ///
    /// # Arguments
    /// * `request` - What to resolve and how
    /// * `backend` - Backend process channel
    /// * `metadata` - Metadata lookup used for enrichment and the season flow
    /// * `settings` - Timings, enrichment batch size and prompt phrases
    /// * `events` - Bus the view layer subscribes to
    pub fn new(
        request: ResolveRequest,
        backend: Arc<dyn BackendChannel>,
        metadata: Arc<dyn MetadataLookup>,
        settings: &SessionSettings,
        events: EventBus,
    ) -> Self {
        let (timers, timer_rx) = PendingTimers::new();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let enrichment = Arc::new(EnrichmentFetcher::new(
            Arc::clone(&metadata),
            &settings.enrichment,
        ));

        Self {
            session: Session::new(request),
            backend,
            metadata,
            enrichment,
            detector: PromptDetector::new(&settings.prompts),
            timings: settings.timings.clone(),
            timers,
            timer_rx,
            internal_tx,
            internal_rx,
            enrichment_cancel: None,
            events,
            stream: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn projection(&self) -> SessionProjection {
        self.session.projection()
    }

    pub fn timers(&self) -> &PendingTimers {
        &self.timers
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ========================================================================
    // Opening
    // ========================================================================

    /// Start the backend process for this session's request
    ///
    /// On failure the error is appended to the buffer and the session stays
    /// in `Idle` until it is closed.
    pub async fn open(&mut self) -> ResolveResult<()> {
        if let Err(e) = self.session.request().validate() {
            self.report_error(&e.to_string());
            return Err(e);
        }

        info!(
            session_id = %self.session.session_id(),
            path = %self.session.request().display_path(),
            action = %self.session.request().action,
            "Opening resolution session"
        );
        self.set_stage(Stage::AwaitingBackendOutput);
        self.timers
            .schedule(TimerKind::InputFallback, self.timings.input_fallback());

        let backend = Arc::clone(&self.backend);
        match backend.open(self.session.request()).await {
            Ok(bytes) => {
                self.stream = Some(decode_stream(bytes).boxed());
                Ok(())
            }
            Err(e) => {
                self.report_error(&format!("Failed to start backend process: {}", e));
                self.timers.cancel(TimerKind::InputFallback);
                self.set_stage(Stage::Idle);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Drive the session until it is closed
    ///
    /// Returns the final session state. Dropping every command sender
    /// closes the session.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) -> Session {
        let mut commands_open = true;

        while self.session.stage() != Stage::Closed {
            tokio::select! {
                batch = next_backend_batch(&mut self.stream) => {
                    self.handle_stream_batch(batch).await;
                }
                Some(fired) = self.timer_rx.recv() => {
                    if self.timers.accept(fired) {
                        self.on_timer(fired.kind).await;
                    }
                }
                Some(event) = self.internal_rx.recv() => {
                    self.handle_internal(event);
                }
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        commands_open = false;
                        debug!(session_id = %self.session.session_id(), "Command channel closed");
                        self.close().await;
                    }
                },
            }
        }

        info!(session_id = %self.session.session_id(), "Session loop finished");
        self.session
    }

    /// Handle everything already queued on the timer and internal channels
    ///
    /// For callers that drive the controller by hand instead of `run`.
    pub async fn process_pending(&mut self) {
        while let Ok(event) = self.internal_rx.try_recv() {
            self.handle_internal(event);
        }
        while let Ok(fired) = self.timer_rx.try_recv() {
            if self.timers.accept(fired) {
                self.on_timer(fired.kind).await;
            }
        }
    }

    pub async fn handle_command(&mut self, command: SessionCommand) {
        let result = match command {
            SessionCommand::Select(token) => self.select(&token).await,
            SessionCommand::ManualSearch(term) => self.submit_manual_search(&term).await,
            SessionCommand::SelectSeason(season) => self.select_season(season).await,
            SessionCommand::SelectEpisode(episode) => self.select_episode(episode).await,
            SessionCommand::Close => {
                self.close().await;
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!(session_id = %self.session.session_id(), error = %e, "Command rejected");
        }
    }

    /// Apply every event decoded from one chunk; `None` is end of stream
    ///
    /// The whole batch is handled before the loop looks at timers or
    /// commands again.
    pub async fn handle_stream_batch(&mut self, batch: Option<Vec<StreamEvent>>) {
        match batch {
            Some(events) => {
                for event in events {
                    self.handle_stream_event(Some(event)).await;
                }
            }
            None => self.handle_stream_event(None).await,
        }
    }

    /// Handle one item from the decoded backend stream; `None` is end of stream
    pub async fn handle_stream_event(&mut self, event: Option<StreamEvent>) {
        match event {
            Some(StreamEvent::Message(message)) => self.handle_message(message).await,
            Some(StreamEvent::Malformed { line, error }) => {
                self.report_error(&format!("Unreadable backend line ({}): {}", error, line));
            }
            Some(StreamEvent::TransportError(e)) => {
                self.report_error(&format!("Backend stream failed: {}", e));
            }
            None => self.on_stream_end(),
        }
    }

    /// Apply one backend message
    pub async fn handle_message(&mut self, message: BackendMessage) {
        if self.session.stage() == Stage::Closed {
            debug!(session_id = %self.session.session_id(), "Message after close ignored");
            return;
        }

        let output = message.output_text().to_string();
        if !output.is_empty() {
            self.append_output(&output);
        }
        if let Some(error) = message.error.as_deref() {
            self.report_error(error);
        }
        if let Some(data) = message.structured_data.clone() {
            self.emit(SessionEvent::StructuredData {
                session_id: self.session.session_id(),
                data,
            });
        }

        let prompt = self.detector.detect(&output);
        if !self.session.stage().in_season_flow() {
            if self.detector.is_season_prompt(&output) {
                self.start_season_flow().await;
            } else if let Some(kind) = prompt {
                self.on_prompt(kind);
            }
        }

        self.maybe_release_lock();

        if !output.is_empty() && !self.session.stage().in_season_flow() {
            self.timers
                .schedule(TimerKind::ParseDebounce, self.timings.parse_debounce());
        }

        if message.is_done() {
            self.reconcile_done(prompt.is_some()).await;
        }
    }

    fn on_prompt(&mut self, kind: PromptKind) {
        if self.session.stage().is_terminal() {
            return;
        }
        debug!(session_id = %self.session.session_id(), ?kind, "Backend awaits input");

        self.session.mark_prompt_detected();
        self.timers.cancel(TimerKind::InputFallback);
        self.timers.cancel(TimerKind::LoadingFallback);
        self.timers.cancel(TimerKind::AutoClose);

        match kind {
            PromptKind::Selection => self.set_stage(Stage::AwaitingSelection),
            PromptKind::ManualSearch => {
                self.enable_manual_input();
                self.set_stage(Stage::AwaitingManualSearchInput);
            }
        }
    }

    // ========================================================================
    // State helpers
    // ========================================================================

    fn emit(&self, event: SessionEvent) {
        self.events.emit_lossy(event);
    }

    fn set_stage(&mut self, stage: Stage) {
        if let Some(transition) = self.session.transition_to(stage) {
            debug!(
                session_id = %transition.session_id,
                old_stage = ?transition.old_stage,
                new_stage = ?transition.new_stage,
                "Stage changed"
            );
            self.emit(SessionEvent::StageChanged {
                session_id: transition.session_id,
                old_stage: transition.old_stage,
                new_stage: transition.new_stage,
                timestamp: transition.transitioned_at,
            });
        }
    }

    fn append_output(&mut self, text: &str) {
        self.session.append_output(text);
        self.emit(SessionEvent::OutputAppended {
            session_id: self.session.session_id(),
            text: text.to_string(),
        });
    }

    fn append_line(&mut self, line: &str) {
        let text = self.session.append_line(line);
        self.emit(SessionEvent::OutputAppended {
            session_id: self.session.session_id(),
            text,
        });
    }

    /// Append an `ERROR:` line and publish the message
    fn report_error(&mut self, message: &str) {
        warn!(session_id = %self.session.session_id(), error = %message, "Session error");
        self.append_line(&format!("ERROR: {}", message));
        self.emit(SessionEvent::SessionError {
            session_id: self.session.session_id(),
            message: message.to_string(),
        });
    }

    fn enable_manual_input(&mut self) {
        if self.session.manual_search_enabled() {
            return;
        }
        self.session.set_manual_search_enabled(true);
        self.emit(SessionEvent::ManualInputEnabled {
            session_id: self.session.session_id(),
        });
    }

    /// Clear the displayed set (new generation) and stop its enrichment
    fn clear_candidates(&mut self) {
        if let Some(generation) = self.session.candidates_mut().clear() {
            self.cancel_enrichment();
            debug!(session_id = %self.session.session_id(), generation, "Candidates cleared");
            self.emit(SessionEvent::CandidatesCleared {
                session_id: self.session.session_id(),
                generation,
            });
        }
    }

    fn cancel_enrichment(&mut self) {
        if let Some(token) = self.enrichment_cancel.take() {
            token.cancel();
        }
        self.session.set_enrichment_generation(None);
    }

    fn emit_closed(&self) {
        self.emit(SessionEvent::SessionClosed {
            session_id: self.session.session_id(),
            timestamp: Utc::now(),
        });
    }
}

/// Next decoded chunk of backend events; never resolves once the stream is gone
async fn next_backend_batch(
    stream: &mut Option<BoxStream<'static, Vec<StreamEvent>>>,
) -> Option<Vec<StreamEvent>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
