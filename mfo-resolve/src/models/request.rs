//! Resolution request sent when a session is opened

use crate::error::{ResolveError, ResolveResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How the backend should treat the file
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ActionVariant {
    /// Normal resolution
    #[default]
    Resolve,
    /// Remove existing links and reprocess
    Force,
    /// Remove existing links and reprocess as a movie
    ForceMovie,
    /// Remove existing links and reprocess as a show
    ForceShow,
    /// Remove existing links and reprocess as an extra
    ForceExtra,
    /// Remove existing links and never process this file again
    Skip,
    /// Let the backend pick the first candidate
    AutoSelect,
    /// Start with a free-form search instead of automatic matching
    ManualSearch,
}

impl ActionVariant {
    /// Variants that delete links the user may want to keep
    pub fn requires_confirmation(self) -> bool {
        matches!(
            self,
            ActionVariant::Force
                | ActionVariant::ForceMovie
                | ActionVariant::ForceShow
                | ActionVariant::ForceExtra
                | ActionVariant::Skip
        )
    }

    /// Question put to the user before a destructive variant runs
    pub fn confirmation_prompt(self, path: &str) -> String {
        match self {
            ActionVariant::Skip => format!(
                "Remove existing links for '{}' and skip it in future scans?",
                path
            ),
            ActionVariant::ForceMovie => {
                format!("Remove existing links for '{}' and reprocess as a movie?", path)
            }
            ActionVariant::ForceShow => {
                format!("Remove existing links for '{}' and reprocess as a show?", path)
            }
            ActionVariant::ForceExtra => {
                format!("Remove existing links for '{}' and reprocess as an extra?", path)
            }
            _ => format!("Remove existing links for '{}' and reprocess it?", path),
        }
    }
}

impl fmt::Display for ActionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionVariant::Resolve => "resolve",
            ActionVariant::Force => "force",
            ActionVariant::ForceMovie => "force-movie",
            ActionVariant::ForceShow => "force-show",
            ActionVariant::ForceExtra => "force-extra",
            ActionVariant::Skip => "skip",
            ActionVariant::AutoSelect => "auto-select",
            ActionVariant::ManualSearch => "manual-search",
        };
        f.write_str(name)
    }
}

/// Season/episode pair written as `S01E02`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonEpisode {
    pub season: u32,
    pub episode: u32,
}

impl FromStr for SeasonEpisode {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ResolveError::InvalidRequest(format!("Expected SxxEyy, got '{}'", s));
        let upper = s.trim().to_ascii_uppercase();
        let rest = upper.strip_prefix('S').ok_or_else(invalid)?;
        let (season, episode) = rest.split_once('E').ok_or_else(invalid)?;
        Ok(Self {
            season: season.parse().map_err(|_| invalid())?,
            episode: episode.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for SeasonEpisode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}E{:02}", self.season, self.episode)
    }
}

/// Body of the backend "open" call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub path: PathBuf,
    pub action: ActionVariant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvdb_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_episode: Option<String>,
    /// Apply the choice to sibling files in the same folder
    pub batch_apply: bool,
    pub auto_select: bool,
}

impl ResolveRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_action(mut self, action: ActionVariant) -> Self {
        self.action = action;
        if action == ActionVariant::AutoSelect {
            self.auto_select = true;
        }
        self
    }

    /// Reject requests the backend cannot act on
    pub fn validate(&self) -> ResolveResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ResolveError::InvalidRequest("File path is empty".to_string()));
        }
        if let Some(se) = &self.season_episode {
            se.parse::<SeasonEpisode>()?;
        }
        Ok(())
    }

    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}
