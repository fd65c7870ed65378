//! End-to-end runs of the orchestrator against scripted sources.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bizscout_collector::error::SourceError;
use bizscout_collector::{
    dedup_key, run_collection, start_run, DirectoryStager, RemediationHint, RunError, RunEvent,
    RunHandle, TerminationReason,
};
use bizscout_core::{is_known, SourceKind};
use common::{
    deps, element, prepared, prepared_batch, records_and_skips, run_config, worker_config,
    ScriptedSource,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

async fn collect(handle: &mut RunHandle) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn quota_is_met_exactly_without_overprocessing() {
    let source = Arc::new(ScriptedSource::new(
        SourceKind::PlacesApi,
        vec![prepared_batch(12)],
    ));
    let mut handle = start_run(run_config(10), deps(source, worker_config(false)));
    let events = collect(&mut handle).await;
    let summary = handle.wait().await.expect("run succeeds");

    let (records, skips) = records_and_skips(&events);
    assert_eq!(records.len(), 10);
    assert!(skips.is_empty());
    assert_eq!(summary.accepted, 10);
    assert_eq!(summary.processed, 10);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.reason, TerminationReason::QuotaMet);
    assert!(summary.shortfall_hint.is_none());
    assert!(matches!(events.last(), Some(RunEvent::Finished(s)) if *s == summary));
}

#[tokio::test]
async fn incomplete_entries_are_skipped_until_the_source_runs_dry() {
    let mut payloads = Vec::new();
    for i in 0..10 {
        let online = !matches!(i, 1 | 4 | 6 | 9);
        payloads.push(prepared(
            &format!("Shop {i}"),
            &format!("{i} Main Street, Springfield"),
            online,
        ));
    }
    let source = Arc::new(ScriptedSource::new(SourceKind::PlacesApi, vec![payloads]));
    let mut handle = start_run(run_config(10), deps(source, worker_config(true)));
    let events = collect(&mut handle).await;
    let summary = handle.wait().await.expect("run succeeds");

    let (records, skips) = records_and_skips(&events);
    assert_eq!(summary.processed, 10);
    assert_eq!(summary.accepted, 6);
    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.reason, TerminationReason::SourceExhausted);
    assert!(records.iter().all(|r| is_known(&r.website) || is_known(&r.instagram)));
    assert!(skips.iter().all(|s| s.ends_with("- No website or Instagram")));
    assert!(skips.contains(
        &"Skipped entry 2 (Shop 1) - Address: 1 Main Street, Springfield - No website or Instagram"
            .to_owned()
    ));
    let hint = summary.shortfall_hint.expect("shortfall hint");
    assert!(hint.contains("Consider disabling"), "{hint}");
}

#[tokio::test(start_paused = true)]
async fn three_consecutive_batch_failures_abort_the_run() {
    let source = Arc::new(
        ScriptedSource::new(SourceKind::Listing, vec![prepared_batch(5)]).failing_list_calls(3),
    );
    let (tx, mut rx) = mpsc::channel(64);
    let result = run_collection(
        run_config(5),
        deps(source, worker_config(false)),
        tx,
        CancellationToken::new(),
    )
    .await;

    let (failures, hint) = match result {
        Err(RunError::ConsecutiveBatchFailures { failures, hint, .. }) => (failures, hint),
        other => panic!("expected a fatal batch failure, got {other:?}"),
    };
    assert_eq!(failures, 3);
    assert_eq!(hint, RemediationHint::Connectivity);

    let mut failed_summary = None;
    while let Ok(event) = rx.try_recv() {
        if let RunEvent::Failed { summary, .. } = event {
            failed_summary = Some(summary);
        }
    }
    let summary = failed_summary.expect("failure event");
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.reason, TerminationReason::Fatal);
}

#[tokio::test(start_paused = true)]
async fn batch_failures_below_the_limit_are_recovered() {
    let source = Arc::new(
        ScriptedSource::new(SourceKind::Listing, vec![prepared_batch(5)]).failing_list_calls(2),
    );
    let handle = start_run(run_config(5), deps(source, worker_config(false)));
    let summary = handle.wait().await.expect("run recovers");
    assert_eq!(summary.accepted, 5);
}

#[tokio::test(start_paused = true)]
async fn unreachable_detail_view_fails_one_candidate_and_the_run_continues() {
    let source = Arc::new(
        ScriptedSource::new(
            SourceKind::Listing,
            vec![(0..4).map(element).collect()],
        )
        .broken(&[0]),
    );
    let mut handle = start_run(run_config(3), deps(source, worker_config(false)));
    let events = collect(&mut handle).await;
    let summary = handle.wait().await.expect("run succeeds");

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.accepted, 3);
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.reason, TerminationReason::QuotaMet);
    assert!(events.iter().any(
        |e| matches!(e, RunEvent::Status(s) if s.starts_with("Entry failed: detail view for entry 0"))
    ));
    let (records, _) = records_and_skips(&events);
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert!(!names.contains(&"Shop 0"));
}

#[tokio::test]
async fn duplicates_are_never_emitted() {
    let payloads = vec![
        prepared("Acme Bakery", "12 Main Street, Springfield", true),
        prepared("ACME  bakery", "12 main street,  Springfield", true),
        prepared("Acme Bakery", "99 Elm Road, Springfield", true),
        prepared("Blue Fern", "4 Oak Avenue, Springfield", true),
    ];
    let source = Arc::new(ScriptedSource::new(SourceKind::PlacesApi, vec![payloads]));
    let mut handle = start_run(run_config(10), deps(source, worker_config(true)));
    let events = collect(&mut handle).await;
    let summary = handle.wait().await.expect("run succeeds");

    let (records, skips) = records_and_skips(&events);
    assert_eq!(records.len(), 3);
    assert_eq!(skips.len(), 1);
    let keys: HashSet<String> = records.iter().map(dedup_key).collect();
    assert_eq!(keys.len(), records.len());
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn later_pages_are_loaded_on_demand() {
    let source = Arc::new(ScriptedSource::new(
        SourceKind::PlacesApi,
        vec![
            prepared_batch(3),
            vec![
                prepared("Shop 10", "10 Pine Street, Springfield", true),
                prepared("Shop 11", "11 Pine Street, Springfield", true),
            ],
        ],
    ));
    let summary = start_run(run_config(10), deps(source, worker_config(false)))
        .wait()
        .await
        .expect("run succeeds");
    assert_eq!(summary.accepted, 5);
    assert_eq!(summary.reason, TerminationReason::SourceExhausted);
}

#[tokio::test]
async fn attempt_budget_bounds_processing() {
    let payloads: Vec<_> = (0..20)
        .map(|i| prepared(&format!("Shop {i}"), &format!("{i} Main Street, Springfield"), false))
        .collect();
    let source = Arc::new(ScriptedSource::new(SourceKind::PlacesApi, vec![payloads]));
    let mut config = run_config(2);
    config.max_attempt_multiplier = 3;
    let summary = start_run(config, deps(source, worker_config(true)))
        .wait()
        .await
        .expect("run succeeds");
    assert_eq!(summary.processed, 6);
    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.reason, TerminationReason::AttemptsExhausted);
}

#[tokio::test(start_paused = true)]
async fn connectivity_loss_pauses_dispatch_until_restored() {
    let (tx, rx) = watch::channel(true);
    let tx = Arc::new(tx);
    let source = Arc::new(
        ScriptedSource::new(SourceKind::PlacesApi, vec![prepared_batch(12)])
            .dropping_connectivity_at(4, Arc::clone(&tx)),
    );
    let mut run_deps = deps(source, worker_config(false));
    run_deps.connectivity = Some(rx);
    let mut handle = start_run(run_config(12), run_deps);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let mut paused_events = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(1), handle.next_event()).await
    {
        paused_events.push(event);
    }
    let (records, _) = records_and_skips(&paused_events);
    assert_eq!(records.len(), 8, "the in-flight batch finishes, no new one starts");
    assert!(paused_events
        .iter()
        .any(|e| matches!(e, RunEvent::Status(s) if s.starts_with("Connection lost"))));

    tx.send_replace(true);
    let rest = collect(&mut handle).await;
    let summary = handle.wait().await.expect("run succeeds");
    let (more, _) = records_and_skips(&rest);
    assert_eq!(more.len(), 4);
    assert_eq!(summary.accepted, 12);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_a_stuck_batch() {
    let source = Arc::new(
        ScriptedSource::new(SourceKind::Listing, vec![(0..4).map(element).collect()])
            .hanging(&[0, 1, 2, 3]),
    );
    let mut config = run_config(4);
    config.batch_timeout = Duration::from_secs(3600);
    let handle = start_run(config, deps(source, worker_config(false)));
    let cancel = handle.cancellation_token();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();
    });
    let summary = handle.wait().await.expect("cancelled runs still report");
    assert_eq!(summary.reason, TerminationReason::Cancelled);
    assert_eq!(summary.accepted, 0);
    assert!(summary.shortfall_hint.is_none());
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_not_blocked_by_a_stalled_event_consumer() {
    let source = Arc::new(ScriptedSource::new(
        SourceKind::PlacesApi,
        vec![prepared_batch(10)],
    ));
    // Capacity one and never drained: the second event would wait forever.
    let (tx, _rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(60),
        run_collection(run_config(10), deps(source, worker_config(false)), tx, cancel),
    )
    .await
    .expect("run returns once cancelled");
    let summary = result.expect("cancelled runs still report");
    assert_eq!(summary.reason, TerminationReason::Cancelled);
    assert!(summary.accepted < 10);
}

#[tokio::test(start_paused = true)]
async fn stuck_batches_are_abandoned_at_the_deadline() {
    let source = Arc::new(
        ScriptedSource::new(SourceKind::Listing, vec![(0..6).map(element).collect()])
            .hanging(&[1]),
    );
    let mut config = run_config(5);
    config.batch_timeout = Duration::from_secs(10);
    let mut handle = start_run(config, deps(source, worker_config(false)));
    let events = collect(&mut handle).await;
    let summary = handle.wait().await.expect("run succeeds");

    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::Status(s) if s == "Batch timed out, 1 entries abandoned")));
    assert_eq!(summary.accepted, 5);
    assert_eq!(summary.processed, 6);
}

#[tokio::test]
async fn fallback_source_is_used_when_the_first_has_nothing() {
    let empty = Arc::new(ScriptedSource::new(SourceKind::PlacesApi, vec![Vec::new()]));
    let listing = Arc::new(ScriptedSource::new(
        SourceKind::Listing,
        vec![prepared_batch(2)],
    ));
    let mut run_deps = deps(empty, worker_config(false));
    run_deps.sources.push(listing);
    let summary = start_run(run_config(2), run_deps)
        .wait()
        .await
        .expect("fallback succeeds");
    assert_eq!(summary.accepted, 2);
}

#[tokio::test]
async fn unreachable_source_is_fatal_with_a_staged_snapshot() {
    let dir = std::env::temp_dir().join(format!("bizscout-engine-{}", std::process::id()));
    let source = Arc::new(
        ScriptedSource::new(SourceKind::Listing, vec![prepared_batch(2)]).failing_init(
            SourceError::Unreachable {
                detail: "no result container matched".to_owned(),
                page_source: None,
            },
        ),
    );
    let mut run_deps = deps(source, worker_config(false));
    run_deps.stager = Some(Arc::new(DirectoryStager::new(dir.clone())));

    let err = start_run(run_config(2), run_deps)
        .wait()
        .await
        .expect_err("run must fail");
    let (hint, snapshot) = match err {
        RunError::SourceUnreachable { hint, snapshot, .. } => (hint, snapshot),
        other => panic!("expected SourceUnreachable, got {other:?}"),
    };
    assert_eq!(hint, RemediationHint::AutomationTooling);
    let snapshot = snapshot.expect("snapshot staged");
    assert!(snapshot.ends_with("debug_page.html"));
    assert!(std::fs::read_to_string(&snapshot).unwrap().contains("captcha"));
    std::fs::remove_dir_all(&dir).unwrap();
}
