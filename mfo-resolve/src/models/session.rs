//! Resolution session state
//!
//! A `Session` is owned by exactly one `SessionController`. It holds the
//! stage, the append-only raw buffer, the displayed candidate set and the
//! selection lock. Views read a `SessionProjection`, never the session.

use crate::enrichment::EnrichmentUpdate;
use crate::models::{Candidate, ResolveRequest, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub session_id: Uuid,
    pub old_stage: Stage,
    pub new_stage: Stage,
    pub transitioned_at: DateTime<Utc>,
}

/// Displayed candidates plus the generation they belong to
///
/// The set is only ever replaced or cleared as a whole; each replace or
/// clear bumps the generation so late enrichment results can be recognised.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    generation: u64,
    items: Vec<Candidate>,
}

impl CandidateSet {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn items(&self) -> &[Candidate] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when `fresh` differs in count or in the id of ordinal 1
    ///
    /// Re-echoed identical blocks keep the current set (and its enrichment).
    pub fn should_replace(&self, fresh: &[Candidate]) -> bool {
        if self.items.len() != fresh.len() {
            return true;
        }
        let current_first = self.items.first().map(|c| c.external_id.as_str());
        let fresh_first = fresh.first().map(|c| c.external_id.as_str());
        current_first != fresh_first
    }

    /// Replace the whole set, returning the new generation
    pub fn replace(&mut self, fresh: Vec<Candidate>) -> u64 {
        self.generation += 1;
        self.items = fresh;
        self.generation
    }

    /// Empty the set; returns the new generation if anything was displayed
    pub fn clear(&mut self) -> Option<u64> {
        if self.items.is_empty() {
            return None;
        }
        self.generation += 1;
        self.items.clear();
        Some(self.generation)
    }

    pub fn find(&self, ordinal: u32) -> Option<&Candidate> {
        self.items.iter().find(|c| c.ordinal == ordinal)
    }

    /// Merge an enrichment result in place
    ///
    /// Applied only when generation, ordinal and external id all still match.
    pub fn merge(&mut self, update: &EnrichmentUpdate) -> Option<&Candidate> {
        if update.generation != self.generation {
            return None;
        }
        let candidate = self
            .items
            .iter_mut()
            .find(|c| c.ordinal == update.ordinal && c.external_id == update.external_id)?;
        if update.poster_url.is_some() {
            candidate.poster_url = update.poster_url.clone();
        }
        if update.metadata.is_some() {
            candidate.metadata = update.metadata.clone();
        }
        Some(candidate)
    }
}

/// Time-boxed guard against stale candidates reappearing after a selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionLock {
    engaged: bool,
    /// Buffer length right after the echo line was written
    echo_offset: Option<usize>,
}

impl SelectionLock {
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn echo_offset(&self) -> Option<usize> {
        self.echo_offset
    }
}

/// Season/episode sub-dialog state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonEpisodeContext {
    pub external_id: String,
    pub season: Option<u32>,
}

/// Read-only view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProjection {
    pub session_id: Uuid,
    pub stage: Stage,
    pub loading: bool,
    pub awaiting_input: bool,
    pub input_enabled: bool,
    pub enriching: bool,
    pub completed: bool,
    pub selection_locked: bool,
    pub candidate_generation: u64,
    pub candidates: Vec<Candidate>,
    pub last_selected_token: Option<String>,
}

/// One active resolution conversation
#[derive(Debug, Clone)]
pub struct Session {
    session_id: Uuid,
    request: ResolveRequest,
    stage: Stage,
    raw_buffer: String,
    last_selected_token: Option<String>,
    selection_lock: SelectionLock,
    manual_search_enabled: bool,
    prompt_detected: bool,
    /// Stage was entered by the loading fallback, not by a backend prompt
    input_fallback: bool,
    /// Menus starting before this buffer offset have been answered
    consumed_before: usize,
    season_episode_context: Option<SeasonEpisodeContext>,
    candidates: CandidateSet,
    enrichment_generation: Option<u64>,
    selected_external_id: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(request: ResolveRequest) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            request,
            stage: Stage::Idle,
            raw_buffer: String::new(),
            last_selected_token: None,
            selection_lock: SelectionLock::default(),
            manual_search_enabled: false,
            prompt_detected: false,
            input_fallback: false,
            consumed_before: 0,
            season_episode_context: None,
            candidates: CandidateSet::default(),
            enrichment_generation: None,
            selected_external_id: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn request(&self) -> &ResolveRequest {
        &self.request
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn raw_buffer(&self) -> &str {
        &self.raw_buffer
    }

    pub fn last_selected_token(&self) -> Option<&str> {
        self.last_selected_token.as_deref()
    }

    pub fn selection_lock(&self) -> &SelectionLock {
        &self.selection_lock
    }

    pub fn is_selection_locked(&self) -> bool {
        self.selection_lock.engaged
    }

    pub fn manual_search_enabled(&self) -> bool {
        self.manual_search_enabled
    }

    pub fn prompt_detected(&self) -> bool {
        self.prompt_detected
    }

    /// True while an input-awaiting stage stems from the loading fallback
    pub fn input_fallback(&self) -> bool {
        self.input_fallback
    }

    pub fn consumed_before(&self) -> usize {
        self.consumed_before
    }

    pub fn season_episode_context(&self) -> Option<&SeasonEpisodeContext> {
        self.season_episode_context.as_ref()
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn enrichment_generation(&self) -> Option<u64> {
        self.enrichment_generation
    }

    pub fn selected_external_id(&self) -> Option<&str> {
        self.selected_external_id.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn projection(&self) -> SessionProjection {
        SessionProjection {
            session_id: self.session_id,
            stage: self.stage,
            loading: self.stage == Stage::AwaitingBackendOutput,
            awaiting_input: self.stage.awaits_input(),
            input_enabled: self.stage.awaits_input()
                || (self.manual_search_enabled && self.stage != Stage::Closed),
            enriching: self.enrichment_generation.is_some(),
            completed: self.stage == Stage::Completed,
            selection_locked: self.selection_lock.engaged,
            candidate_generation: self.candidates.generation(),
            candidates: self.candidates.items().to_vec(),
            last_selected_token: self.last_selected_token.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Mutations (controller only)
    // ------------------------------------------------------------------

    /// Transition to new stage; `None` if already there
    pub(crate) fn transition_to(&mut self, new_stage: Stage) -> Option<StageTransition> {
        if self.stage == new_stage {
            return None;
        }
        let transition = StageTransition {
            session_id: self.session_id,
            old_stage: self.stage,
            new_stage,
            transitioned_at: Utc::now(),
        };
        self.stage = new_stage;
        self.input_fallback = false;

        match new_stage {
            Stage::Completed | Stage::Closed => self.ended_at = Some(Utc::now()),
            _ => self.ended_at = None,
        }

        Some(transition)
    }

    /// Append raw backend output exactly as received
    pub(crate) fn append_output(&mut self, text: &str) {
        self.raw_buffer.push_str(text);
    }

    /// Append a line of our own, starting it on a fresh line
    pub(crate) fn append_line(&mut self, line: &str) -> String {
        let mut text = String::new();
        if !self.raw_buffer.is_empty() && !self.raw_buffer.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(line);
        text.push('\n');
        self.raw_buffer.push_str(&text);
        text
    }

    pub(crate) fn set_last_selected_token(&mut self, token: &str) {
        self.last_selected_token = Some(token.to_string());
    }

    pub(crate) fn engage_lock(&mut self) {
        self.selection_lock = SelectionLock {
            engaged: true,
            echo_offset: None,
        };
    }

    pub(crate) fn record_echo(&mut self) {
        self.selection_lock.echo_offset = Some(self.raw_buffer.len());
    }

    pub(crate) fn release_lock(&mut self) -> bool {
        let was_engaged = self.selection_lock.engaged;
        self.selection_lock = SelectionLock::default();
        was_engaged
    }

    pub(crate) fn set_manual_search_enabled(&mut self, enabled: bool) {
        self.manual_search_enabled = enabled;
    }

    pub(crate) fn mark_prompt_detected(&mut self) {
        self.prompt_detected = true;
        self.input_fallback = false;
    }

    pub(crate) fn mark_input_fallback(&mut self) {
        self.input_fallback = true;
    }

    /// Treat every menu already in the buffer as answered
    pub(crate) fn mark_menus_consumed(&mut self) {
        self.consumed_before = self.raw_buffer.len();
    }

    pub(crate) fn set_season_episode_context(&mut self, context: Option<SeasonEpisodeContext>) {
        self.season_episode_context = context;
    }

    pub(crate) fn candidates_mut(&mut self) -> &mut CandidateSet {
        &mut self.candidates
    }

    pub(crate) fn set_enrichment_generation(&mut self, generation: Option<u64>) {
        self.enrichment_generation = generation;
    }

    pub(crate) fn set_selected_external_id(&mut self, external_id: Option<String>) {
        self.selected_external_id = external_id;
    }
}
