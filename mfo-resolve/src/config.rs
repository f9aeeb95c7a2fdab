//! Session configuration derived from the TOML config
//!
//! Value resolution (CLI → ENV → TOML → default) lives in
//! `mfo_common::config`; this module turns the resolved config into the
//! pieces a session controller needs.

use crate::error::ResolveResult;
use crate::services::{MetadataLookup, NullMetadata, TmdbClient};
use mfo_common::config::{
    resolve_metadata_api_key, EnrichmentConfig, PromptConfig, TimingConfig, TomlConfig,
};
use std::sync::Arc;
use tracing::info;

/// Per-session tunables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSettings {
    pub timings: TimingConfig,
    pub enrichment: EnrichmentConfig,
    pub prompts: PromptConfig,
}

impl From<&TomlConfig> for SessionSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            timings: config.timings.clone(),
            enrichment: config.enrichment.clone(),
            prompts: config.prompts.clone(),
        }
    }
}

/// Build the metadata lookup client
///
/// Without an API key lookups are disabled (`NullMetadata`); sessions still
/// run, just without posters and with manual season entry.
pub fn build_metadata_lookup(config: &TomlConfig) -> ResolveResult<Arc<dyn MetadataLookup>> {
    match resolve_metadata_api_key(config) {
        Some(key) => {
            let client = TmdbClient::new(&config.metadata, key)?;
            info!(base_url = %config.metadata.base_url, "Metadata lookups enabled");
            Ok(Arc::new(client))
        }
        None => Ok(Arc::new(NullMetadata)),
    }
}
