//! Configuration loading, writing and source resolution
//!
//! Settings come from a single TOML file (`mfo-resolve.toml`). Every section
//! has defaults, so a missing or partial file never prevents startup.
//!
//! Individual values that are commonly overridden (backend URL, metadata API
//! key) are resolved with the priority CLI → environment → TOML → default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MFO_CONFIG";

/// Environment variable overriding the backend base URL
pub const BACKEND_URL_ENV_VAR: &str = "MFO_BACKEND_URL";

/// Environment variable carrying the metadata service API key
pub const TMDB_API_KEY_ENV_VAR: &str = "MFO_TMDB_API_KEY";

/// Backend base URL used when nothing else is configured
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub backend: BackendConfig,
    pub metadata: MetadataConfig,
    pub timings: TimingConfig,
    pub enrichment: EnrichmentConfig,
    pub prompts: PromptConfig,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter (overridden by RUST_LOG)
    pub level: String,
    /// Optional log file; stderr when absent
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

/// `[backend]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend process API
    pub url: Option<String>,
}

/// `[metadata]` section (external metadata lookup service)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub base_url: String,
    /// Prefix joined with poster paths to build poster URLs
    pub image_base_url: String,
    pub api_key: Option<String>,
    pub language: String,
    /// Keep successful lookups in memory for the life of the client
    pub cache_responses: bool,
    pub requests_per_second: u32,
    pub timeout_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            image_base_url: "https://image.tmdb.org/t/p/w342".to_string(),
            api_key: None,
            language: "en-US".to_string(),
            cache_responses: true,
            requests_per_second: 20,
            timeout_secs: 15,
        }
    }
}

/// `[timings]` section, all values in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Force-enable manual input if no prompt was seen after opening
    pub input_fallback_ms: u64,
    /// Debounce window for re-parsing the raw buffer
    pub parse_debounce_ms: u64,
    /// Give up waiting for new options after a selection
    pub loading_fallback_ms: u64,
    /// Delay between completion and automatic close
    pub auto_close_ms: u64,
    /// Upper bound on the selection lock
    pub selection_unlock_ms: u64,
    /// Pause after asking the backend to terminate
    pub terminate_grace_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            input_fallback_ms: 3000,
            parse_debounce_ms: 200,
            loading_fallback_ms: 5000,
            auto_close_ms: 2000,
            selection_unlock_ms: 3000,
            terminate_grace_ms: 500,
        }
    }
}

impl TimingConfig {
    pub fn input_fallback(&self) -> Duration {
        Duration::from_millis(self.input_fallback_ms)
    }

    pub fn parse_debounce(&self) -> Duration {
        Duration::from_millis(self.parse_debounce_ms)
    }

    pub fn loading_fallback(&self) -> Duration {
        Duration::from_millis(self.loading_fallback_ms)
    }

    pub fn auto_close(&self) -> Duration {
        Duration::from_millis(self.auto_close_ms)
    }

    pub fn selection_unlock(&self) -> Duration {
        Duration::from_millis(self.selection_unlock_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

/// `[enrichment]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Lookups in flight at once (1 to 3; larger values are capped)
    pub batch_size: usize,
    pub inter_batch_pause_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            inter_batch_pause_ms: 100,
        }
    }
}

impl EnrichmentConfig {
    pub fn inter_batch_pause(&self) -> Duration {
        Duration::from_millis(self.inter_batch_pause_ms)
    }
}

/// `[prompts]` section
///
/// Phrases the backend prints when it waits for input. Matching is
/// case-insensitive substring matching; see `mfo_resolve::prompt_detector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub selection_triggers: Vec<String>,
    pub manual_search_triggers: Vec<String>,
    /// Output tails that count as a prompt on their own (e.g. `": "`)
    pub trailing_markers: Vec<String>,
    /// Phrase that starts the season/episode sub-dialog
    pub season_selection_phrase: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            selection_triggers: vec![
                "Enter your choice:".to_string(),
                "Select an option:".to_string(),
                "Enter the number".to_string(),
                "Choose an option".to_string(),
                "Please select".to_string(),
            ],
            manual_search_triggers: vec![
                "Enter search term".to_string(),
                "Enter a new search term".to_string(),
                "Enter the title".to_string(),
                "manual search".to_string(),
            ],
            trailing_markers: vec![": ".to_string(), "? ".to_string()],
            season_selection_phrase: "no season number identified".to_string(),
        }
    }
}

// ============================================================================
// Config file location
// ============================================================================

/// Locates the config file following the priority order:
/// 1. Command-line argument (highest priority)
/// 2. `MFO_CONFIG` environment variable
/// 3. Platform config directory (`~/.config/mfo/<name>.toml` on Linux)
///
/// Returns `None` when no file exists; callers fall back to defaults.
pub struct ConfigPathResolver {
    file_stem: String,
}

impl ConfigPathResolver {
    pub fn new(file_stem: impl Into<String>) -> Self {
        Self {
            file_stem: file_stem.into(),
        }
    }

    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        let default_path = self.default_path()?;
        if default_path.exists() {
            Some(default_path)
        } else {
            debug!("No config file at {}", default_path.display());
            None
        }
    }

    /// Platform default location, whether or not it exists
    pub fn default_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mfo").join(format!("{}.toml", self.file_stem)))
    }
}

// ============================================================================
// Load / write
// ============================================================================

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Load config, degrading to defaults when the file is missing or invalid
pub fn load_or_default(path: Option<&Path>) -> TomlConfig {
    let Some(path) = path else {
        info!("No config file found, using defaults");
        return TomlConfig::default();
    };

    match load_toml_config(path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("Config {} unusable ({}), using defaults", path.display(), e);
            TomlConfig::default()
        }
    }
}

/// Write config atomically (temp file + rename)
///
/// The file may hold an API key, so on Unix it is created with mode 0600.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    debug!("Wrote config to {}", path.display());
    Ok(())
}

/// True when group/other have any access to the file
#[cfg(unix)]
pub fn check_toml_permissions_loose(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 != 0)
}

// ============================================================================
// Value resolution
// ============================================================================

/// Resolve backend base URL: CLI → ENV → TOML → default
pub fn resolve_backend_url(cli_arg: Option<&str>, config: &TomlConfig) -> String {
    if let Some(url) = cli_arg.filter(|u| !u.trim().is_empty()) {
        return trim_url(url);
    }

    if let Ok(url) = std::env::var(BACKEND_URL_ENV_VAR) {
        if !url.trim().is_empty() {
            return trim_url(&url);
        }
    }

    if let Some(url) = config.backend.url.as_deref().filter(|u| !u.trim().is_empty()) {
        return trim_url(url);
    }

    DEFAULT_BACKEND_URL.to_string()
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Resolve metadata API key: ENV → TOML
///
/// Returns `None` when no valid key is configured; lookups are then disabled
/// but sessions still run.
pub fn resolve_metadata_api_key(config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(TMDB_API_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = config.metadata.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Metadata API key found in environment and TOML. Using environment.");
    }

    if let Some(key) = env_key {
        info!("Metadata API key loaded from environment variable");
        return Some(key);
    }

    if let Some(key) = toml_key {
        info!("Metadata API key loaded from TOML config");
        return Some(key);
    }

    warn!(
        "Metadata API key not configured (set {} or [metadata] api_key); posters disabled",
        TMDB_API_KEY_ENV_VAR
    );
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// User-Agent sent by every HTTP client
pub fn get_user_agent() -> String {
    format!("mfo-resolve/{}", env!("CARGO_PKG_VERSION"))
}
