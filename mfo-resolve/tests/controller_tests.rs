//! Session controller integration tests
//!
//! Drive the controller by hand (messages, timers, commands) against the
//! in-memory backend and metadata fakes.

mod helpers;

use helpers::{drain_events, harness, harness_with, FakeBackend, FakeMetadata, ALIEN_MENU};
use mfo_common::events::SessionEvent;
use mfo_resolve::enrichment::EnrichmentUpdate;
use mfo_resolve::models::{BackendMessage, ResolveRequest, Stage};
use mfo_resolve::stream_reader::StreamEvent;
use mfo_resolve::timers::TimerKind;
use mfo_resolve::{InternalEvent, SessionCommand};
use std::time::Duration;
use tokio::sync::mpsc;

fn request() -> ResolveRequest {
    ResolveRequest::new("/media/in/Alien.1979.mkv")
}

fn ids(h: &helpers::Harness) -> Vec<String> {
    h.controller
        .session()
        .candidates()
        .items()
        .iter()
        .map(|c| c.external_id.clone())
        .collect()
}

// ============================================================================
// Completion reconciliation
// ============================================================================

#[tokio::test]
async fn test_done_while_awaiting_selection_does_not_complete() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();

    h.controller
        .handle_message(BackendMessage::output(format!("{}Enter your choice: ", ALIEN_MENU)))
        .await;
    assert_eq!(h.controller.session().stage(), Stage::AwaitingSelection);

    h.controller.handle_message(BackendMessage::done()).await;

    assert_eq!(h.controller.session().stage(), Stage::AwaitingSelection);
    // pending parse was flushed by the done check
    assert_eq!(ids(&h), vec!["348", "9279"]);
    assert!(!h.controller.timers().is_pending(TimerKind::AutoClose));
}

#[tokio::test]
async fn test_done_with_displayed_candidates_does_not_complete() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();

    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;
    h.controller.run_extraction();
    assert_eq!(h.controller.session().stage(), Stage::AwaitingSelection);

    let mut done = BackendMessage::done();
    done.output = Some("Waiting...\n".to_string());
    h.controller.handle_message(done).await;
    assert_ne!(h.controller.session().stage(), Stage::Completed);
}

#[tokio::test]
async fn test_presupplied_ids_complete_without_candidate_prompt() {
    let mut req = request();
    req.tmdb_id = Some("348".to_string());
    let mut h = harness(req);
    h.controller.open().await.unwrap();

    h.controller
        .handle_message(BackendMessage::output(
            "Using TMDB id 348\nCreated symlink /media/out/Alien (1979)/Alien (1979).mkv\n",
        ))
        .await;
    h.controller.handle_message(BackendMessage::done()).await;

    assert_eq!(h.controller.session().stage(), Stage::Completed);
    assert!(h.controller.timers().is_pending(TimerKind::AutoClose));

    let events = drain_events(&mut h.events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::CandidatesReplaced { .. })));
    let stages: Vec<Stage> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StageChanged { new_stage, .. } => Some(*new_stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![Stage::AwaitingBackendOutput, Stage::Reconciling, Stage::Completed]
    );
}

#[tokio::test]
async fn test_done_after_loading_fallback_completes() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(format!("{}Enter your choice: ", ALIEN_MENU)))
        .await;
    h.controller.on_timer(TimerKind::ParseDebounce).await;
    h.controller.select("1").await.unwrap();

    // backend slower than the loading fallback
    h.controller.on_timer(TimerKind::LoadingFallback).await;
    assert_eq!(h.controller.session().stage(), Stage::AwaitingSelection);
    assert!(h.controller.session().input_fallback());

    h.controller
        .handle_message(BackendMessage::output(
            "Created symlink /media/out/Alien (1979)/Alien (1979).mkv\n",
        ))
        .await;
    h.controller.handle_message(BackendMessage::done()).await;

    assert_eq!(h.controller.session().stage(), Stage::Completed);
    assert!(h.controller.timers().is_pending(TimerKind::AutoClose));
}

#[tokio::test]
async fn test_prompt_after_loading_fallback_still_blocks_done() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;
    h.controller.run_extraction();
    h.controller.select("1").await.unwrap();
    h.controller.on_timer(TimerKind::LoadingFallback).await;

    h.controller
        .handle_message(BackendMessage::output("Enter search term: "))
        .await;
    assert!(!h.controller.session().input_fallback());

    h.controller.handle_message(BackendMessage::done()).await;
    assert_eq!(
        h.controller.session().stage(),
        Stage::AwaitingManualSearchInput
    );
}

#[tokio::test]
async fn test_chunk_batch_is_applied_in_order() {
    let mut req = request();
    req.tmdb_id = Some("348".to_string());
    let mut h = harness(req);
    h.controller.open().await.unwrap();

    h.controller
        .handle_stream_batch(Some(vec![
            StreamEvent::Message(BackendMessage::output("Using TMDB id 348\n")),
            StreamEvent::Malformed {
                line: "{oops".to_string(),
                error: "expected value".to_string(),
            },
            StreamEvent::Message(BackendMessage::output("Created symlink\n")),
            StreamEvent::Message(BackendMessage::done()),
        ]))
        .await;

    let session = h.controller.session();
    assert_eq!(session.stage(), Stage::Completed);
    let buffer = session.raw_buffer();
    let using = buffer.find("Using TMDB id").unwrap();
    let error = buffer.find("ERROR: Unreadable backend line").unwrap();
    let created = buffer.find("Created symlink").unwrap();
    assert!(using < error && error < created);

    // end of stream after completion leaves the outcome alone
    h.controller.handle_stream_batch(None).await;
    assert_eq!(h.controller.session().stage(), Stage::Completed);
    assert!(!h.controller.session().raw_buffer().contains("Backend stream ended"));
}

// ============================================================================
// Selection and locking
// ============================================================================

#[tokio::test]
async fn test_selection_lock_blocks_stale_reextraction() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;
    h.controller.run_extraction();
    assert_eq!(h.controller.session().candidates().len(), 2);

    h.controller.select("2").await.unwrap();
    assert_eq!(h.backend.inputs(), vec!["2"]);
    assert!(h.controller.session().is_selection_locked());
    assert!(h.controller.session().candidates().is_empty());
    assert!(h.controller.session().raw_buffer().ends_with("> 2\n"));
    assert_eq!(h.controller.session().selected_external_id(), Some("9279"));

    // the stale menu is still the latest block in the buffer
    h.controller
        .handle_message(BackendMessage::output("Processing Alien 3...\n"))
        .await;
    h.controller.run_extraction();
    assert!(h.controller.session().candidates().is_empty());

    // after unlock the echo marks the old menu as answered
    h.controller.on_timer(TimerKind::SelectionUnlock).await;
    assert!(!h.controller.session().is_selection_locked());
    assert!(h.controller.session().candidates().is_empty());
}

#[tokio::test]
async fn test_fresh_menu_after_echo_releases_lock() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;
    h.controller.run_extraction();
    let first_generation = h.controller.session().candidates().generation();

    h.controller.select("1").await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(
            "No exact match\n1: Aliens (1986) [Movie - tmdb-679]\nEnter your choice: ",
        ))
        .await;

    assert!(!h.controller.session().is_selection_locked());
    assert!(!h.controller.timers().is_pending(TimerKind::SelectionUnlock));
    assert_eq!(h.controller.session().stage(), Stage::AwaitingSelection);

    h.controller.on_timer(TimerKind::ParseDebounce).await;
    assert_eq!(ids(&h), vec!["679"]);
    assert!(h.controller.session().candidates().generation() > first_generation);
}

#[tokio::test]
async fn test_input_failure_rolls_back_loading() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;
    h.controller.run_extraction();

    h.backend.set_fail_input(true);
    assert!(h.controller.select("1").await.is_err());

    let session = h.controller.session();
    assert_eq!(session.stage(), Stage::AwaitingSelection);
    assert!(session.manual_search_enabled());
    assert!(!session.is_selection_locked());
    assert!(session.raw_buffer().contains("ERROR: Failed to send input"));
    assert!(!session.raw_buffer().contains("> 1"));
    assert!(!h.controller.timers().is_pending(TimerKind::LoadingFallback));
    assert!(!h.controller.timers().is_pending(TimerKind::AutoClose));

    // no echo was written, so the menu comes back
    h.controller.on_timer(TimerKind::ParseDebounce).await;
    assert_eq!(ids(&h), vec!["348", "9279"]);
}

#[tokio::test]
async fn test_loading_fallback_enables_manual_input() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;
    h.controller.run_extraction();
    h.controller.select("1").await.unwrap();
    assert_eq!(h.controller.session().stage(), Stage::AwaitingBackendOutput);
    assert!(h.controller.projection().loading);

    h.controller.on_timer(TimerKind::LoadingFallback).await;

    let projection = h.controller.projection();
    assert_eq!(projection.stage, Stage::AwaitingSelection);
    assert!(!projection.loading);
    assert!(projection.input_enabled);
}

#[tokio::test]
async fn test_manual_search_prompt() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();

    h.controller
        .handle_message(BackendMessage::output("No results.\nEnter search term: "))
        .await;
    assert_eq!(
        h.controller.session().stage(),
        Stage::AwaitingManualSearchInput
    );
    assert!(h.controller.session().manual_search_enabled());
    assert!(drain_events(&mut h.events)
        .iter()
        .any(|e| matches!(e, SessionEvent::ManualInputEnabled { .. })));

    h.controller.submit_manual_search(" Alien 1979 ").await.unwrap();
    assert_eq!(h.backend.inputs(), vec!["Alien 1979"]);
    assert_eq!(h.controller.session().stage(), Stage::AwaitingBackendOutput);
}

#[tokio::test]
async fn test_input_fallback_without_prompt() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output("Processing file...\n"))
        .await;

    h.controller.on_timer(TimerKind::InputFallback).await;
    assert!(h.controller.session().manual_search_enabled());
    assert_eq!(h.controller.session().stage(), Stage::AwaitingBackendOutput);
}

// ============================================================================
// Enrichment
// ============================================================================

#[tokio::test]
async fn test_enrichment_merges_into_current_generation() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;
    h.controller.run_extraction();
    assert!(h.controller.projection().enriching);

    for _ in 0..100 {
        h.controller.process_pending().await;
        if !h.controller.projection().enriching {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let projection = h.controller.projection();
    assert!(!projection.enriching);
    assert_eq!(projection.candidates.len(), 2);
    assert_eq!(projection.candidates[0].poster_url.as_deref(), Some("poster-348"));
    assert_eq!(projection.candidates[1].poster_url.as_deref(), Some("poster-9279"));
    assert_eq!(projection.candidates[0].ordinal, 1);
}

#[tokio::test]
async fn test_stale_enrichment_is_dropped() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;
    h.controller.run_extraction();
    let stale_generation = h.controller.session().candidates().generation();

    h.controller.select("1").await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(
            "1: Aliens (1986) [Movie - tmdb-679]\n",
        ))
        .await;
    h.controller.run_extraction();
    let current_generation = h.controller.session().candidates().generation();
    assert!(current_generation > stale_generation);
    drain_events(&mut h.events);

    h.controller.handle_internal(InternalEvent::Enrichment(EnrichmentUpdate {
        generation: stale_generation,
        ordinal: 1,
        external_id: "348".to_string(),
        poster_url: Some("stale".to_string()),
        metadata: None,
    }));
    // right generation, wrong identity
    h.controller.handle_internal(InternalEvent::Enrichment(EnrichmentUpdate {
        generation: current_generation,
        ordinal: 1,
        external_id: "348".to_string(),
        poster_url: Some("stale".to_string()),
        metadata: None,
    }));

    let candidate = &h.controller.session().candidates().items()[0];
    assert_eq!(candidate.external_id, "679");
    assert_ne!(candidate.poster_url.as_deref(), Some("stale"));
    assert!(!drain_events(&mut h.events)
        .iter()
        .any(|e| matches!(e, SessionEvent::CandidateEnriched { .. })));
}

// ============================================================================
// Season / episode sub-flow
// ============================================================================

#[tokio::test]
async fn test_season_phrase_starts_season_flow() {
    let mut req = request();
    req.tmdb_id = Some("1396".to_string());
    let mut h = harness(req);
    h.controller.open().await.unwrap();

    h.controller
        .handle_message(BackendMessage::output(
            "No season number identified, proceeding with season selection\n",
        ))
        .await;

    assert_eq!(
        h.controller.session().stage(),
        Stage::AwaitingSeasonSelection
    );
    assert_eq!(h.metadata.season_calls(), vec!["1396"]);
    assert!(drain_events(&mut h.events)
        .iter()
        .any(|e| matches!(e, SessionEvent::SeasonOptions { seasons, .. } if seasons.len() == 2)));

    // candidate lines printed during the sub-flow never become a prompt
    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;
    h.controller.run_extraction();
    assert!(h.controller.session().candidates().is_empty());
    assert!(!h.controller.timers().is_pending(TimerKind::ParseDebounce));

    h.controller.select_season(1).await.unwrap();
    assert_eq!(
        h.controller.session().stage(),
        Stage::AwaitingEpisodeSelection
    );
    assert_eq!(h.metadata.episode_calls(), vec![("1396".to_string(), 1)]);

    h.controller.select_episode(2).await.unwrap();
    assert_eq!(h.backend.inputs(), vec!["1", "2"]);
    assert_eq!(h.controller.session().stage(), Stage::AwaitingBackendOutput);
    assert!(h.controller.session().season_episode_context().is_none());
    assert!(h.controller.timers().is_pending(TimerKind::LoadingFallback));
}

#[tokio::test]
async fn test_menu_answered_before_season_flow_stays_consumed() {
    let mut req = request();
    req.tmdb_id = Some("1396".to_string());
    let mut h = harness(req);
    h.controller.open().await.unwrap();

    // backend picked from its own menu, then asks for the season
    h.controller
        .handle_message(BackendMessage::output(format!(
            "{}No season number identified\n",
            ALIEN_MENU
        )))
        .await;
    h.controller.select_season(1).await.unwrap();
    h.controller.select_episode(2).await.unwrap();

    h.controller
        .handle_message(BackendMessage::output(
            "Created symlink /media/out/Breaking Bad/Season 01/S01E02.mkv\n",
        ))
        .await;
    h.controller.on_timer(TimerKind::ParseDebounce).await;
    assert!(h.controller.session().candidates().is_empty());
    assert_eq!(h.controller.session().stage(), Stage::AwaitingBackendOutput);

    h.controller.handle_message(BackendMessage::done()).await;
    assert_eq!(h.controller.session().stage(), Stage::Completed);
    assert!(!drain_events(&mut h.events)
        .iter()
        .any(|e| matches!(e, SessionEvent::CandidatesReplaced { .. })));
}

#[tokio::test]
async fn test_season_flow_uses_last_id_in_buffer() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(format!(
            "{}No season number identified\n",
            ALIEN_MENU
        )))
        .await;

    assert_eq!(h.metadata.season_calls(), vec!["9279"]);
    assert!(h.controller.session().candidates().is_empty());
}

#[tokio::test]
async fn test_season_lookup_failure_enables_manual_input() {
    let mut req = request();
    req.tmdb_id = Some("1396".to_string());
    let mut h = harness_with(req, FakeBackend::new(), FakeMetadata::failing());
    h.controller.open().await.unwrap();

    h.controller
        .handle_message(BackendMessage::output("No season number identified\n"))
        .await;

    let session = h.controller.session();
    assert_eq!(session.stage(), Stage::AwaitingSelection);
    assert!(session.manual_search_enabled());
    assert!(session.raw_buffer().contains("ERROR: Season lookup"));
    assert!(session.season_episode_context().is_none());
}

#[tokio::test]
async fn test_season_commands_rejected_outside_flow() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    assert!(h.controller.select_season(1).await.is_err());
    assert!(h.controller.select_episode(1).await.is_err());
    assert!(h.backend.inputs().is_empty());
}

// ============================================================================
// Open, stream end, close
// ============================================================================

#[tokio::test]
async fn test_open_failure_leaves_session_idle() {
    let mut h = harness_with(request(), FakeBackend::failing_open(), FakeMetadata::new());

    assert!(h.controller.open().await.is_err());
    assert_eq!(h.controller.session().stage(), Stage::Idle);
    assert!(h
        .controller
        .session()
        .raw_buffer()
        .contains("ERROR: Failed to start backend process"));
    assert!(!h.controller.timers().is_pending(TimerKind::InputFallback));
}

#[tokio::test]
async fn test_stream_end_without_done_stops_loading() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output("Processing file...\n"))
        .await;

    h.controller.handle_stream_event(None).await;

    let session = h.controller.session();
    assert_eq!(session.stage(), Stage::Idle);
    assert!(session.raw_buffer().contains("Backend stream ended"));
    assert!(!h.controller.projection().loading);
}

#[tokio::test]
async fn test_close_terminates_backend() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();
    h.controller
        .handle_message(BackendMessage::output(ALIEN_MENU))
        .await;

    h.controller.close().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(h.controller.session().stage(), Stage::Closed);
    assert_eq!(h.backend.terminate_count(), 1);
    assert!(!h.controller.timers().is_pending(TimerKind::ParseDebounce));
    assert!(h.controller.select("1").await.is_err());
    assert!(drain_events(&mut h.events)
        .iter()
        .any(|e| matches!(e, SessionEvent::SessionClosed { .. })));
}

#[tokio::test]
async fn test_run_completes_and_auto_closes() {
    let backend = FakeBackend::scripted(&[
        BackendMessage::output("Using TMDB id 348\n"),
        BackendMessage::output("Created symlink /media/out/Alien (1979)/Alien (1979).mkv\n"),
        BackendMessage::done(),
    ]);
    let mut req = request();
    req.tmdb_id = Some("348".to_string());
    let mut h = harness_with(req, backend, FakeMetadata::new());
    h.controller.open().await.unwrap();

    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    let session = tokio::time::timeout(Duration::from_secs(2), h.controller.run(cmd_rx))
        .await
        .expect("session should auto-close");
    drop(cmd_tx);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(session.stage(), Stage::Closed);
    assert!(session.raw_buffer().contains("Created symlink"));
    assert_eq!(h.backend.terminate_count(), 1);

    let stages: Vec<Stage> = drain_events(&mut h.events)
        .iter()
        .filter_map(|e| match e {
            SessionEvent::StageChanged { new_stage, .. } => Some(*new_stage),
            _ => None,
        })
        .collect();
    assert!(stages.ends_with(&[Stage::Reconciling, Stage::Completed, Stage::Closed]));
}

#[tokio::test]
async fn test_run_closes_when_commands_close() {
    let mut h = harness(request());
    h.controller.open().await.unwrap();

    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    cmd_tx.send(SessionCommand::Select("1".to_string())).await.unwrap();
    cmd_tx.send(SessionCommand::Close).await.unwrap();

    let session = tokio::time::timeout(Duration::from_secs(2), h.controller.run(cmd_rx))
        .await
        .expect("close command should end the loop");
    assert_eq!(session.stage(), Stage::Closed);
    assert_eq!(h.backend.inputs(), vec!["1"]);
}
