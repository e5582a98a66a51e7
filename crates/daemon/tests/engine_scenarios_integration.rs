use std::time::{Duration, Instant};

use autosave_common::error::{HostError, SaveFailure};
use autosave_common::types::{HostDocument, SaveOutcome};
use autosave_daemon::host::memory::MemoryHost;
use autosave_daemon::host::HostEvent;
use autosave_daemon::runtime::{EngineConfig, Orchestrator, TickReport};
use autosave_daemon::supervisor::{ConnectionState, Health};

fn stored(id: &str) -> HostDocument {
    HostDocument::new(id, format!("{id}.docx")).with_path(format!("/docs/{id}.docx"))
}

fn config() -> EngineConfig {
    EngineConfig {
        debounce: Duration::from_secs(10),
        polling_interval: Duration::from_secs(15),
        fallback_polling_interval: Duration::from_secs(5),
        reconnect_threshold: 20,
        main_loop_sleep: Duration::from_millis(500),
        call_timeout: Duration::from_secs(2),
        inbox_capacity: 64,
    }
}

fn secs(base: Instant, secs: f64) -> Instant {
    base + Duration::from_secs_f64(secs)
}

fn outcomes(report: &TickReport) -> Vec<SaveOutcome> {
    report.saves.iter().map(|save| save.outcome.clone()).collect()
}

async fn started(host: &MemoryHost, config: EngineConfig) -> Orchestrator<MemoryHost> {
    let mut engine = Orchestrator::new(host.clone(), config);
    engine.start().await;
    engine
}

#[tokio::test]
async fn push_change_debounce_timeline() {
    let host = MemoryHost::new();
    host.open(stored("a"), false);
    let mut engine = started(&host, config()).await;
    let t0 = Instant::now();

    host.set_dirty("a", true);
    host.emit(HostEvent::DocumentChanged(stored("a")));
    let report = engine.tick(secs(t0, 1.0)).await;
    assert_eq!(outcomes(&report), vec![SaveOutcome::Saved]);

    host.set_dirty("a", true);
    host.emit(HostEvent::DocumentChanged(stored("a")));
    let report = engine.tick(secs(t0, 6.0)).await;
    assert_eq!(outcomes(&report), vec![SaveOutcome::SkippedNotDue]);

    let report = engine.tick(secs(t0, 11.0)).await;
    assert_eq!(outcomes(&report), vec![SaveOutcome::Saved]);
    assert_eq!(host.save_calls(), vec!["a".to_string(), "a".to_string()]);
}

#[tokio::test]
async fn selection_and_open_events_never_save_a_clean_document() {
    let host = MemoryHost::new();
    host.open(stored("a"), false);
    let mut engine = started(&host, config()).await;
    let t0 = Instant::now();
    engine.tick(t0).await;

    for step in 1..4 {
        host.emit(HostEvent::SelectionChanged(stored("a")));
        host.emit(HostEvent::DocumentOpened(stored("a")));
        let report = engine.tick(secs(t0, 11.0 * step as f64)).await;
        assert_eq!(report.signals, 1, "coalesced per document");
        assert_eq!(outcomes(&report), vec![SaveOutcome::SkippedClean]);
    }
    assert!(host.save_calls().is_empty());
    assert_eq!(host.is_dirty("a"), Some(false));
}

#[tokio::test]
async fn polling_alone_saves_when_push_is_unavailable() {
    let host = MemoryHost::new();
    host.open(stored("a"), false);
    host.fail_subscribe(Some(HostError::rejected("events.subscribe", "automation events off")));
    let cfg = config();
    let deadline = cfg.polling_interval + cfg.debounce;
    let mut engine = started(&host, cfg).await;
    assert!(matches!(engine.supervisor().state(), ConnectionState::Degraded(_)));
    let t0 = Instant::now();

    engine.tick(t0).await;
    host.set_dirty("a", true);

    let mut saved_at = None;
    let mut elapsed = 0.5;
    while Duration::from_secs_f64(elapsed) <= deadline {
        let report = engine.tick(secs(t0, elapsed)).await;
        if report.saved() > 0 {
            saved_at = Some(elapsed);
            break;
        }
        elapsed += 0.5;
    }
    let saved_at = saved_at.expect("dirty document should be saved by polling");
    assert!(saved_at <= 5.0, "fallback cadence applies, saved at {saved_at}s");
}

#[tokio::test]
async fn failed_enumerations_wait_for_reconnect_threshold() {
    let host = MemoryHost::new();
    host.open(stored("a"), true);
    let mut engine = started(&host, config()).await;
    assert_eq!(host.connect_calls(), 1);
    let t0 = Instant::now();

    host.crash();
    for poll in 0..3 {
        let report = engine.tick(secs(t0, 15.0 * poll as f64)).await;
        assert!(report.polled);
        assert!(report.saves.is_empty());
    }
    assert_eq!(engine.supervisor().state(), &ConnectionState::Disconnected);
    assert_eq!(host.connect_calls(), 2, "only the one transparent re-acquire");

    // Quiet ticks between polls keep counting until the threshold.
    let mut elapsed = 30.0;
    loop {
        elapsed += 0.5;
        let report = engine.tick(secs(t0, elapsed)).await;
        assert!(!report.polled);
        match report.health {
            Some(Health::Waiting { failures }) => {
                assert!(failures < 20);
                assert_eq!(host.connect_calls(), 2);
            }
            Some(Health::ReconnectFailed) => break,
            other => panic!("unexpected health: {other:?}"),
        }
    }
    assert_eq!(host.connect_calls(), 3);
}

#[tokio::test]
async fn never_saved_document_is_skipped_every_time() {
    let host = MemoryHost::new();
    host.open(HostDocument::new("u1", "Document1"), true);
    let mut engine = started(&host, config()).await;
    let t0 = Instant::now();

    for poll in 0..3 {
        let report = engine.tick(secs(t0, 15.0 * poll as f64)).await;
        assert_eq!(outcomes(&report), vec![SaveOutcome::SkippedNoPath]);
    }
    assert!(host.save_calls().is_empty());
    assert!(engine.supervisor().is_usable());
}

#[tokio::test]
async fn document_gaining_a_path_is_saved() {
    let host = MemoryHost::new();
    host.open(HostDocument::new("u1", "Document1"), true);
    let mut engine = started(&host, config()).await;
    let t0 = Instant::now();
    engine.tick(t0).await;

    host.assign_path("u1", "/docs/Document1.docx");
    let report = engine.tick(secs(t0, 15.0)).await;
    assert_eq!(outcomes(&report), vec![SaveOutcome::Saved]);
    assert_eq!(engine.ledger().len(), 1, "the unsaved identity was pruned");
}

#[tokio::test]
async fn closed_document_never_reappears_in_passes() {
    let host = MemoryHost::new();
    host.open(stored("a"), true);
    host.open(stored("b"), true);
    let mut engine = started(&host, config()).await;
    let t0 = Instant::now();
    assert_eq!(engine.tick(t0).await.saved(), 2);

    host.set_dirty("a", true);
    host.set_dirty("b", true);
    host.close("b");

    for poll in 1..4 {
        let report = engine.tick(secs(t0, 15.0 * poll as f64)).await;
        assert!(report.saves.iter().all(|save| save.id != stored("b").id()));
    }
    assert!(!engine.ledger().contains(&stored("b").id()));
}

#[tokio::test]
async fn manual_save_in_editor_cancels_pending_autosave() {
    let host = MemoryHost::new();
    host.open(stored("a"), true);
    let mut engine = started(&host, config()).await;
    let t0 = Instant::now();
    assert_eq!(engine.tick(t0).await.saved(), 1);

    host.emit(HostEvent::DocumentChanged(stored("a")));
    host.emit(HostEvent::DocumentSaved(stored("a")));
    let report = engine.tick(secs(t0, 12.0)).await;

    assert_eq!(report.external_saves, 1);
    assert!(report.saves.is_empty());
    assert_eq!(host.save_calls().len(), 1);
}

#[tokio::test]
async fn saves_resume_after_host_restart() {
    let host = MemoryHost::new();
    host.open(stored("a"), false);
    let mut engine = started(&host, config()).await;
    let t0 = Instant::now();
    engine.tick(t0).await;

    host.crash();
    host.set_available(true);
    host.set_dirty("a", true);

    // A quiet tick notices the dead handle through the liveness probe.
    let report = engine.tick(secs(t0, 0.5)).await;
    assert_eq!(report.health, Some(Health::Lost));
    assert!(!engine.is_push_active());

    let report = engine.tick(secs(t0, 15.0)).await;
    assert_eq!(outcomes(&report), vec![SaveOutcome::Saved]);
    assert_eq!(engine.supervisor().generation(), 2);
    assert!(engine.is_push_active());
    assert_eq!(host.subscriber_count(), 1);
}

#[tokio::test]
async fn slow_save_is_never_overlapped() {
    let host = MemoryHost::new();
    host.open(stored("a"), true);
    host.set_save_delay(Some(Duration::from_millis(300)));
    let cfg = EngineConfig { call_timeout: Duration::from_millis(50), ..config() };
    let mut engine = started(&host, cfg).await;
    let t0 = Instant::now();

    let report = engine.tick(t0).await;
    assert_eq!(outcomes(&report), vec![SaveOutcome::Failed(SaveFailure::Timeout)]);

    let report = engine.tick(secs(t0, 0.5)).await;
    assert_eq!(outcomes(&report), vec![SaveOutcome::SkippedInFlight]);

    // The timed-out save finished in the background and left the document
    // clean, so the retry has nothing to write.
    tokio::time::sleep(Duration::from_millis(500)).await;
    host.set_save_delay(None);
    let report = engine.tick(secs(t0, 1.0)).await;
    assert_eq!(outcomes(&report), vec![SaveOutcome::SkippedClean]);
    assert_eq!(host.save_calls().len(), 1);
    assert_eq!(host.max_concurrent_saves(), 1);
    assert!(engine.ledger().pending().is_empty());
}

#[tokio::test]
async fn one_failing_document_does_not_block_others() {
    let host = MemoryHost::new();
    for id in ["a", "b", "c"] {
        host.open(stored(id), true);
    }
    host.fail_saves("a", HostError::rejected("document.save", "file is read-only"));
    let mut engine = started(&host, config()).await;

    let report = engine.tick(Instant::now()).await;
    assert_eq!(report.saved(), 2);
    assert_eq!(report.failed(), 1);
    let state = engine.ledger().state(&stored("a").id()).expect("a is tracked");
    assert_eq!(state.consecutive_failures(), 1);
    assert_eq!(
        state.last_failure(),
        Some(&SaveFailure::HostRejected("file is read-only".into()))
    );
}
