//! Completion, timers and teardown

use super::SessionController;
use crate::models::Stage;
use crate::timers::TimerKind;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl SessionController {
    /// Decide whether a `done` message really ends the session
    ///
    /// The backend sometimes reports `done` while its last prompt is still
    /// open. `done` is accepted only when nothing is displayed or being
    /// enriched, no backend prompt is waiting for input, and the message
    /// itself carried no prompt. A stage entered by the loading fallback
    /// does not block it.
    pub(super) async fn reconcile_done(&mut self, message_had_prompt: bool) {
        if self.session.stage().is_terminal() {
            return;
        }

        // the last output may not have been parsed yet
        if self.timers.cancel(TimerKind::ParseDebounce) {
            self.run_extraction();
        }

        let blocked_by = if !self.session.candidates().is_empty() {
            Some("candidates displayed")
        } else if self.session.enrichment_generation().is_some() {
            Some("enrichment in flight")
        } else if self.session.stage().awaits_input() && !self.session.input_fallback() {
            Some("awaiting input")
        } else if message_had_prompt {
            Some("message carries a prompt")
        } else {
            None
        };

        if let Some(reason) = blocked_by {
            debug!(
                session_id = %self.session.session_id(),
                stage = ?self.session.stage(),
                reason,
                "Ignoring done"
            );
            return;
        }

        self.set_stage(Stage::Reconciling);
        self.timers.cancel_all();
        self.session.release_lock();
        self.set_stage(Stage::Completed);
        info!(session_id = %self.session.session_id(), "Resolution completed");
        self.timers
            .schedule(TimerKind::AutoClose, self.timings.auto_close());
    }

    /// React to an accepted timer firing
    pub async fn on_timer(&mut self, kind: TimerKind) {
        debug!(session_id = %self.session.session_id(), ?kind, "Timer fired");

        match kind {
            TimerKind::InputFallback => {
                if !self.session.prompt_detected() && !self.session.stage().is_terminal() {
                    info!(
                        session_id = %self.session.session_id(),
                        "No prompt seen yet, enabling manual input"
                    );
                    self.enable_manual_input();
                }
            }
            TimerKind::ParseDebounce => self.run_extraction(),
            TimerKind::LoadingFallback => {
                if self.session.stage() == Stage::AwaitingBackendOutput {
                    info!(
                        session_id = %self.session.session_id(),
                        "Backend quiet after input, enabling manual input"
                    );
                    self.enable_manual_input();
                    self.set_stage(Stage::AwaitingSelection);
                    self.session.mark_input_fallback();
                }
            }
            TimerKind::AutoClose => {
                if self.session.stage() == Stage::Completed {
                    self.close().await;
                }
            }
            TimerKind::SelectionUnlock => {
                self.session.release_lock();
                self.run_extraction();
            }
        }
    }

    /// The backend stream ended without the session being closed
    pub(super) fn on_stream_end(&mut self) {
        self.stream = None;
        if self.session.stage().is_terminal() {
            return;
        }

        info!(session_id = %self.session.session_id(), "Backend stream ended");
        self.append_line("INFO: Backend stream ended");
        self.timers.cancel(TimerKind::LoadingFallback);
        self.timers.cancel(TimerKind::InputFallback);
        if self.session.stage() == Stage::AwaitingBackendOutput {
            self.set_stage(Stage::Idle);
        }
    }

    /// Close the session and terminate the backend process
    ///
    /// Terminate is fire-and-forget; the controller waits the configured
    /// grace period before reporting the session closed.
    pub async fn close(&mut self) {
        if self.session.stage() == Stage::Closed {
            return;
        }
        info!(session_id = %self.session.session_id(), "Closing session");

        self.timers.cancel_all();
        self.cancel_enrichment();
        self.stream = None;

        let backend = Arc::clone(&self.backend);
        let session_id = self.session.session_id();
        tokio::spawn(async move {
            if let Err(e) = backend.terminate().await {
                warn!(session_id = %session_id, error = %e, "Terminate request failed");
            }
        });
        tokio::time::sleep(self.timings.terminate_grace()).await;

        self.set_stage(Stage::Closed);
        self.emit_closed();
    }
}
