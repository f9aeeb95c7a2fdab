//! User selections and manual search input

use super::SessionController;
use crate::error::{ResolveError, ResolveResult};
use crate::models::Stage;
use crate::timers::TimerKind;
use std::sync::Arc;
use tracing::info;

impl SessionController {
    /// Send a menu choice to the backend
    ///
    /// Clears the displayed candidates and holds the selection lock until
    /// the backend prints a fresh menu or `SelectionUnlock` fires, so the
    /// stale menu still in the buffer cannot reappear.
    ///
    /// # Errors
    /// Returns error if the session is closed, the token is empty, or the
    /// backend rejects the input. On a send failure the session returns to
    /// `AwaitingSelection` with manual input enabled.
    pub async fn select(&mut self, token: &str) -> ResolveResult<()> {
        self.submit_input(token).await
    }

    /// Send a free-form search term; same path as a menu choice
    pub async fn submit_manual_search(&mut self, term: &str) -> ResolveResult<()> {
        self.submit_input(term).await
    }

    async fn submit_input(&mut self, token: &str) -> ResolveResult<()> {
        if self.session.stage() == Stage::Closed {
            return Err(ResolveError::InvalidRequest("Session is closed".to_string()));
        }
        let token = token.trim();
        if token.is_empty() {
            return Err(ResolveError::InvalidRequest("Empty input".to_string()));
        }

        info!(session_id = %self.session.session_id(), token = %token, "Submitting selection");

        self.timers.cancel(TimerKind::AutoClose);
        self.session.set_last_selected_token(token);
        let selected = self
            .session
            .candidates()
            .items()
            .iter()
            .find(|c| c.ordinal.to_string() == token)
            .map(|c| c.external_id.clone());
        if selected.is_some() {
            self.session.set_selected_external_id(selected);
        }

        self.clear_candidates();
        self.session.engage_lock();
        self.timers
            .schedule(TimerKind::SelectionUnlock, self.timings.selection_unlock());
        self.set_stage(Stage::AwaitingBackendOutput);

        let backend = Arc::clone(&self.backend);
        match backend.send_input(token).await {
            Ok(()) => {
                self.append_line(&format!("> {}", token));
                self.session.record_echo();
                self.timers
                    .schedule(TimerKind::LoadingFallback, self.timings.loading_fallback());
                Ok(())
            }
            Err(e) => {
                self.report_error(&format!("Failed to send input: {}", e));
                self.session.release_lock();
                self.timers.cancel(TimerKind::SelectionUnlock);
                self.enable_manual_input();
                self.set_stage(Stage::AwaitingSelection);
                self.timers
                    .schedule(TimerKind::ParseDebounce, self.timings.parse_debounce());
                Err(e)
            }
        }
    }
}
