//! Awaiting-input heuristic
//!
//! The backend gives no structured signal when it blocks on stdin, so we
//! look for known phrases in each message's output. The phrase lists come
//! from `[prompts]` in the config file.

use mfo_common::config::PromptConfig;

/// What the backend is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// A menu ordinal (or other short choice)
    Selection,
    /// A free-form search term
    ManualSearch,
}

#[derive(Debug, Clone)]
pub struct PromptDetector {
    selection_triggers: Vec<String>,
    manual_search_triggers: Vec<String>,
    trailing_markers: Vec<String>,
    season_phrase: String,
}

impl PromptDetector {
    pub fn new(config: &PromptConfig) -> Self {
        let lower = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };

        Self {
            selection_triggers: lower(&config.selection_triggers),
            manual_search_triggers: lower(&config.manual_search_triggers),
            trailing_markers: config
                .trailing_markers
                .iter()
                .filter(|s| !s.trim().is_empty())
                .cloned()
                .collect(),
            season_phrase: config.season_selection_phrase.to_lowercase(),
        }
    }

    /// Classify one message's output
    ///
    /// Manual-search triggers win over selection triggers. An output that
    /// ends in a trailing marker (`": "`, `"? "`) counts as a selection prompt.
    pub fn detect(&self, output: &str) -> Option<PromptKind> {
        if output.trim().is_empty() {
            return None;
        }
        let lower = output.to_lowercase();

        if self.manual_search_triggers.iter().any(|t| lower.contains(t)) {
            return Some(PromptKind::ManualSearch);
        }
        if self.selection_triggers.iter().any(|t| lower.contains(t)) {
            return Some(PromptKind::Selection);
        }

        let tail = output.trim_end_matches(['\r', '\n']);
        if self.trailing_markers.iter().any(|m| tail.ends_with(m.as_str())) {
            return Some(PromptKind::Selection);
        }

        None
    }

    /// True when the output starts the season/episode sub-dialog
    pub fn is_season_prompt(&self, output: &str) -> bool {
        !self.season_phrase.is_empty() && output.to_lowercase().contains(&self.season_phrase)
    }
}

impl Default for PromptDetector {
    fn default() -> Self {
        Self::new(&PromptConfig::default())
    }
}
