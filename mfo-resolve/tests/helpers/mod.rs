//! Test Helper Utilities
//!
//! In-memory backend and metadata fakes plus controller setup.

#![allow(dead_code)]

pub mod fake_backend;
pub mod fake_metadata;

pub use fake_backend::FakeBackend;
pub use fake_metadata::FakeMetadata;

use mfo_common::config::{EnrichmentConfig, TimingConfig};
use mfo_common::events::{EventBus, SessionEvent};
use mfo_resolve::config::SessionSettings;
use mfo_resolve::models::ResolveRequest;
use mfo_resolve::SessionController;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const ALIEN_MENU: &str =
    "1: Alien (1979) [Movie - tmdb-348]\n2: Alien 3 (1992) [Movie - tmdb-9279]\n";

/// Short timings so timer-driven tests finish quickly
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        timings: TimingConfig {
            input_fallback_ms: 50,
            parse_debounce_ms: 10,
            loading_fallback_ms: 100,
            auto_close_ms: 30,
            selection_unlock_ms: 100,
            terminate_grace_ms: 5,
        },
        enrichment: EnrichmentConfig {
            batch_size: 3,
            inter_batch_pause_ms: 0,
        },
        ..Default::default()
    }
}

pub struct Harness {
    pub controller: SessionController,
    pub backend: Arc<FakeBackend>,
    pub metadata: Arc<FakeMetadata>,
    pub events: broadcast::Receiver<SessionEvent>,
}

pub fn harness(request: ResolveRequest) -> Harness {
    harness_with(request, FakeBackend::new(), FakeMetadata::new())
}

pub fn harness_with(
    request: ResolveRequest,
    backend: FakeBackend,
    metadata: FakeMetadata,
) -> Harness {
    let backend = Arc::new(backend);
    let metadata = Arc::new(metadata);
    let bus = EventBus::new(256);
    let events = bus.subscribe();
    let controller = SessionController::new(
        request,
        backend.clone(),
        metadata.clone(),
        &fast_settings(),
        bus,
    );

    Harness {
        controller,
        backend,
        metadata,
        events,
    }
}

/// Everything published so far
pub fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
