//! Season/episode sub-dialog
//!
//! When the backend cannot tell which season a file belongs to it asks for
//! a season and then an episode number. Instead of a numbered menu in the
//! output, the lists come from the metadata service.

use super::SessionController;
use crate::error::{ResolveError, ResolveResult};
use crate::models::{SeasonEpisodeContext, Stage};
use crate::timers::TimerKind;
use mfo_common::events::SessionEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::info;

static TMDB_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\btmdb-(\d+)").expect("tmdb id regex should compile"));

impl SessionController {
    /// Show id for the season lists
    ///
    /// Checked in order: current context, pre-supplied tmdb id, the selected
    /// candidate, the last `tmdb-<id>` in the buffer.
    pub(super) fn resolve_show_id(&self) -> Option<String> {
        if let Some(context) = self.session.season_episode_context() {
            return Some(context.external_id.clone());
        }
        if let Some(id) = self
            .session
            .request()
            .tmdb_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            return Some(id.to_string());
        }
        if let Some(id) = self.session.selected_external_id() {
            return Some(id.to_string());
        }
        TMDB_ID
            .captures_iter(self.session.raw_buffer())
            .last()
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub(super) async fn start_season_flow(&mut self) {
        info!(session_id = %self.session.session_id(), "Backend asks for a season");

        self.session.mark_prompt_detected();
        // whatever menu preceded the season question has been answered
        self.session.mark_menus_consumed();
        self.clear_candidates();
        self.timers.cancel(TimerKind::ParseDebounce);
        self.timers.cancel(TimerKind::InputFallback);
        self.timers.cancel(TimerKind::LoadingFallback);
        self.timers.cancel(TimerKind::AutoClose);

        let Some(external_id) = self.resolve_show_id() else {
            self.season_lookup_failed("No show id available for season selection");
            return;
        };

        self.session.set_season_episode_context(Some(SeasonEpisodeContext {
            external_id: external_id.clone(),
            season: None,
        }));

        let metadata = Arc::clone(&self.metadata);
        match metadata.seasons(&external_id).await {
            Ok(seasons) => {
                self.emit(SessionEvent::SeasonOptions {
                    session_id: self.session.session_id(),
                    external_id,
                    seasons,
                });
                self.set_stage(Stage::AwaitingSeasonSelection);
            }
            Err(e) => {
                self.season_lookup_failed(&format!("Season lookup for {} failed: {}", external_id, e))
            }
        }
    }

    /// Send the chosen season and fetch its episodes
    pub async fn select_season(&mut self, season: u32) -> ResolveResult<()> {
        if self.session.stage() != Stage::AwaitingSeasonSelection {
            return Err(ResolveError::InvalidRequest(
                "No season selection pending".to_string(),
            ));
        }
        let Some(external_id) = self
            .session
            .season_episode_context()
            .map(|c| c.external_id.clone())
        else {
            return Err(ResolveError::InvalidRequest("No show selected".to_string()));
        };

        self.send_number(season).await?;
        self.session.set_season_episode_context(Some(SeasonEpisodeContext {
            external_id: external_id.clone(),
            season: Some(season),
        }));

        let metadata = Arc::clone(&self.metadata);
        match metadata.episodes(&external_id, season).await {
            Ok(episodes) => {
                self.emit(SessionEvent::EpisodeOptions {
                    session_id: self.session.session_id(),
                    external_id,
                    season_number: season,
                    episodes,
                });
                self.set_stage(Stage::AwaitingEpisodeSelection);
            }
            Err(e) => self.season_lookup_failed(&format!(
                "Episode lookup for {} season {} failed: {}",
                external_id, season, e
            )),
        }
        Ok(())
    }

    /// Send the chosen episode and hand control back to the backend
    pub async fn select_episode(&mut self, episode: u32) -> ResolveResult<()> {
        if self.session.stage() != Stage::AwaitingEpisodeSelection {
            return Err(ResolveError::InvalidRequest(
                "No episode selection pending".to_string(),
            ));
        }

        self.send_number(episode).await?;
        self.session.set_season_episode_context(None);
        self.set_stage(Stage::AwaitingBackendOutput);
        self.timers
            .schedule(TimerKind::LoadingFallback, self.timings.loading_fallback());
        Ok(())
    }

    async fn send_number(&mut self, number: u32) -> ResolveResult<()> {
        self.timers.cancel(TimerKind::AutoClose);
        let input = number.to_string();

        let backend = Arc::clone(&self.backend);
        if let Err(e) = backend.send_input(&input).await {
            self.report_error(&format!("Failed to send input: {}", e));
            return Err(e);
        }
        self.append_line(&format!("> {}", input));
        self.session.mark_menus_consumed();
        Ok(())
    }

    /// Leave the sub-dialog and let the user type the answer
    fn season_lookup_failed(&mut self, message: &str) {
        self.report_error(message);
        self.session.set_season_episode_context(None);
        self.enable_manual_input();
        self.set_stage(Stage::AwaitingSelection);
    }
}
