mod common;

use common::*;
use record_rag::ask::answer_trip_question;
use record_rag::builder::build;
use record_rag::config::{EvalQuery, UpdatePolicy, WatcherConfig};
use record_rag::core::embedding::is_unit;
use record_rag::core::{LogRecord, TripRecord, VectorIndex};
use record_rag::evaluate::{load_report, run_evaluation};
use record_rag::generation::{generate_answer, Answer, PromptKind, NO_CONTEXT};
use record_rag::instance::Instance;
use record_rag::search::{is_empty_index, semantic_search};
use record_rag::snapshot::read_snapshot;
use record_rag::sources::RecordSource;
use record_rag::watcher::{Watcher, WatcherState};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::watch;

async fn open_logs(dir: &std::path::Path) -> Instance<LogRecord> {
    Instance::open("logs", &source_config(dir), &[], hashed_embedder())
        .await
        .unwrap()
}

fn watcher_config(policy: UpdatePolicy) -> WatcherConfig {
    WatcherConfig {
        interval_secs: 1,
        policy,
    }
}

#[tokio::test]
async fn test_build_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs());
    let source = RecordSource::new(&source_config(tmp.path()), &[]).unwrap();
    let embedder = hashed_embedder();

    let (first, _) = build::<LogRecord>(&embedder, &source).await.unwrap();
    let (second, _) = build::<LogRecord>(&embedder, &source).await.unwrap();

    assert_eq!(first.rows(), second.rows());
    assert_eq!(first.index(), second.index());
    for pos in 0..first.len() {
        assert!(is_unit(first.index().vector(pos).unwrap()));
    }
}

#[tokio::test]
async fn test_search_returns_ranked_rows() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs());
    let logs = open_logs(tmp.path()).await;

    let hits = semantic_search(&logs, "packet loss on node_1", 10).await.unwrap();
    assert_eq!(hits.len(), 4);
    assert_eq!(hits[0].record.alarm_code, "PKT_LOSS");
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_blank_query_rejected() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs());
    let logs = open_logs(tmp.path()).await;
    assert!(semantic_search(&logs, "   ", 3).await.is_err());
}

#[tokio::test]
async fn test_empty_corpus_is_empty_index() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &[]);
    let logs = open_logs(tmp.path()).await;
    let err = semantic_search(&logs, "cpu", 3).await.unwrap_err();
    assert!(is_empty_index(&err));
}

#[tokio::test]
async fn test_watcher_appends_only_changed_file() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs()[..2]);
    write_logs(tmp.path(), "b.csv", &sample_logs()[2..3]);
    let logs = open_logs(tmp.path()).await;
    let mut watcher = Watcher::new(&logs, &watcher_config(UpdatePolicy::Append));

    let quiet = watcher.poll_once().await;
    assert!(quiet.is_quiet());
    assert_eq!(watcher.state(), WatcherState::Idle);

    let a_before = watcher.known().get("a.csv").unwrap().to_string();
    let b_before = watcher.known().get("b.csv").unwrap().to_string();

    write_logs(tmp.path(), "b.csv", &sample_logs()[1..4]);
    let report = watcher.poll_once().await;

    assert_eq!(report.changed, vec!["b.csv"]);
    assert_eq!(report.updated, vec!["b.csv"]);
    assert_eq!(report.rows_appended, 3);
    let corpus = logs.corpus().load();
    assert_eq!(corpus.len(), 3 + 3);
    assert_eq!(corpus.index().count(), corpus.len());
    assert_eq!(watcher.known().get("a.csv").unwrap(), a_before);
    assert_ne!(watcher.known().get("b.csv").unwrap(), b_before);
    assert_eq!(watcher.state(), WatcherState::Idle);
}

#[tokio::test]
async fn test_watcher_retries_failed_file() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs()[..2]);
    let logs = open_logs(tmp.path()).await;
    let mut watcher = Watcher::new(&logs, &watcher_config(UpdatePolicy::Append));
    let before = watcher.known().get("a.csv").unwrap().to_string();

    fs::write(tmp.path().join("a.csv"), "node_id\nnode_1\n").unwrap();
    for _ in 0..2 {
        let report = watcher.poll_once().await;
        assert_eq!(report.failed, vec!["a.csv"]);
        assert_eq!(report.rows_appended, 0);
        assert_eq!(watcher.known().get("a.csv").unwrap(), before);
        assert_eq!(logs.corpus().load().len(), 2);
    }

    write_logs(tmp.path(), "a.csv", &sample_logs());
    let report = watcher.poll_once().await;
    assert_eq!(report.updated, vec!["a.csv"]);
    assert_eq!(logs.corpus().load().len(), 2 + 4);
}

#[tokio::test]
async fn test_watcher_forgets_removed_file() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs()[..1]);
    write_logs(tmp.path(), "b.csv", &sample_logs()[1..2]);
    let logs = open_logs(tmp.path()).await;
    let mut watcher = Watcher::new(&logs, &watcher_config(UpdatePolicy::Append));

    fs::remove_file(tmp.path().join("a.csv")).unwrap();
    let report = watcher.poll_once().await;
    assert_eq!(report.removed, vec!["a.csv"]);
    assert!(report.changed.is_empty());
    assert!(watcher.known().get("a.csv").is_none());
    assert_eq!(logs.corpus().load().len(), 2);
}

#[tokio::test]
async fn test_watcher_parks_file_with_dimension_mismatch() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs()[..2]);
    let (embedder, dims) = resizable_embedder(64);
    let logs: Instance<LogRecord> = Instance::open("logs", &source_config(tmp.path()), &[], embedder)
        .await
        .unwrap();
    let mut watcher = Watcher::new(&logs, &watcher_config(UpdatePolicy::Append));
    let before = watcher.known().get("a.csv").unwrap().to_string();

    dims.store(32, Ordering::SeqCst);
    write_logs(tmp.path(), "a.csv", &sample_logs()[..3]);
    let report = watcher.poll_once().await;
    assert_eq!(report.rejected, vec!["a.csv"]);
    assert!(report.failed.is_empty());
    assert_eq!(watcher.known().get("a.csv").unwrap(), before);

    let report = watcher.poll_once().await;
    assert!(report.is_quiet());
    assert_eq!(logs.corpus().load().len(), 2);

    dims.store(64, Ordering::SeqCst);
    write_logs(tmp.path(), "a.csv", &sample_logs());
    let report = watcher.poll_once().await;
    assert_eq!(report.updated, vec!["a.csv"]);
    assert!(report.rejected.is_empty());
    assert_eq!(logs.corpus().load().len(), 2 + 4);
}

#[tokio::test]
async fn test_watcher_writes_snapshot_after_update() {
    for policy in [UpdatePolicy::Append, UpdatePolicy::Rebuild] {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir(&data).unwrap();
        let snapshot = tmp.path().join("state").join("logs.idx");
        write_logs(&data, "a.csv", &sample_logs()[..2]);

        let mut config = source_config(&data);
        config.snapshot_path = Some(snapshot.clone());
        let logs: Instance<LogRecord> = Instance::open("logs", &config, &[], hashed_embedder())
            .await
            .unwrap();
        let mut watcher = Watcher::new(&logs, &watcher_config(policy));
        assert_eq!(read_snapshot(&snapshot).unwrap().unwrap().index.count(), 2);

        write_logs(&data, "b.csv", &sample_logs()[2..]);
        let report = watcher.poll_once().await;
        assert_eq!(report.updated, vec!["b.csv"]);

        let corpus = logs.corpus().load();
        let saved = read_snapshot(&snapshot).unwrap().unwrap();
        assert_eq!(saved.index.count(), corpus.len());
        assert_eq!(&saved.index, corpus.index());
        assert_eq!(saved.source_fingerprint, watcher.known().fingerprint());
    }
}

#[tokio::test]
async fn test_watcher_run_updates_then_stops_on_shutdown() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs()[..2]);
    let logs = open_logs(tmp.path()).await;
    let watcher = Watcher::new(&logs, &watcher_config(UpdatePolicy::Append));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(watcher.run(shutdown_rx));

    write_logs(tmp.path(), "a.csv", &sample_logs());
    let deadline = Instant::now() + Duration::from_secs(10);
    while logs.corpus().load().len() < 2 + 4 {
        assert!(Instant::now() < deadline, "watcher never applied the change");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("watcher did not stop")
        .unwrap();
    assert_eq!(logs.corpus().load().len(), 2 + 4);
}

#[tokio::test]
async fn test_watcher_run_stops_when_sender_dropped() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs()[..1]);
    let logs = open_logs(tmp.path()).await;
    let watcher = Watcher::new(&logs, &watcher_config(UpdatePolicy::Append));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(watcher.run(shutdown_rx));

    drop(shutdown_tx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("watcher did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_rebuild_policy_replaces_rows() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs()[..2]);
    let logs = open_logs(tmp.path()).await;
    let mut watcher = Watcher::new(&logs, &watcher_config(UpdatePolicy::Rebuild));
    let version = logs.corpus().load().version();

    write_logs(tmp.path(), "a.csv", &sample_logs()[..3]);
    let report = watcher.poll_once().await;
    assert_eq!(report.updated, vec!["a.csv"]);
    let corpus = logs.corpus().load();
    assert_eq!(corpus.len(), 3);
    assert!(corpus.version() > version);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_never_see_misaligned_corpus() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "a.csv", &sample_logs());
    let logs = open_logs(tmp.path()).await;
    let mut watcher = Watcher::new(&logs, &watcher_config(UpdatePolicy::Append));

    let start_version = logs.corpus().load().version();
    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let corpus = Arc::clone(logs.corpus());
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut seen = 0;
                while !stop.load(Ordering::Relaxed) {
                    let snap = corpus.load();
                    assert_eq!(snap.len(), snap.index().count());
                    seen += 1;
                }
                seen
            })
        })
        .collect();

    for round in 1..=5 {
        let mut lines = sample_logs();
        lines.truncate(round % 4 + 1);
        write_logs(tmp.path(), "a.csv", &lines);
        watcher.poll_once().await;
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(logs.corpus().load().version(), start_version + 5);
}

#[tokio::test]
async fn test_evaluator_precision_bounds() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    write_logs(&data, "a.csv", &sample_logs()[..1]);
    let logs = open_logs(&data).await;
    let report_path = tmp.path().join("eval_results.csv");

    let queries = vec![
        EvalQuery {
            query: "packet loss in node 1".into(),
            keywords: vec!["packet loss".into(), "node_1".into()],
        },
        EvalQuery {
            query: "power issue node 5".into(),
            keywords: vec!["power".into(), "node_5".into()],
        },
    ];
    let records = run_evaluation(&logs, &queries, 3, &report_path).await.unwrap();

    assert_eq!(records[0].precision_at_k, 1.0);
    assert_eq!(records[1].precision_at_k, 0.0);
    let saved = load_report(&report_path).unwrap().unwrap();
    assert_eq!(saved, records);
}

#[tokio::test]
async fn test_blank_context_never_calls_generator() {
    let generator = CountingGenerator::new();
    let answer = generate_answer(&generator, "", "why is node_1 down?", PromptKind::RootCause).await;
    assert_eq!(answer, Answer::Warning(NO_CONTEXT.to_string()));
    assert_eq!(generator.calls(), 0);

    let answer = generate_answer(&generator, "packet loss", "why?", PromptKind::RootCause).await;
    assert!(matches!(answer, Answer::Summary(_)));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_trip_answer_reads_published_corpus() {
    let tmp = TempDir::new().unwrap();
    let trips_csv = |rows: &str| format!("{TRIP_HEADER}{rows}");
    fs::write(
        tmp.path().join("trips.csv"),
        trips_csv("Istanbul,Ankara,6.0,550,Metro,12\nAnkara,Antalya,7.0,600,Metro,10\n"),
    )
    .unwrap();
    let trips: Instance<TripRecord> =
        Instance::open("trips", &source_config(tmp.path()), &[], hashed_embedder())
            .await
            .unwrap();
    let mut watcher = Watcher::new(&trips, &watcher_config(UpdatePolicy::Append));

    let answer = answer_trip_question(&trips, "cheapest trip to Antalya", 3)
        .await
        .unwrap();
    assert_eq!(answer.matched, 1);
    assert_eq!(answer.related.len(), 2);
    assert!(answer.related[0].score >= answer.related[1].score);

    fs::write(
        tmp.path().join("trips.csv"),
        trips_csv("Istanbul,Antalya,10.0,850,Ulusoy,6\n"),
    )
    .unwrap();
    watcher.poll_once().await;

    let answer = answer_trip_question(&trips, "cheapest trip to Antalya", 3)
        .await
        .unwrap();
    assert_eq!(answer.matched, 2);
    assert_eq!(answer.rows[0].from_city, "Ankara");
    assert_eq!(answer.related.len(), 3);

    let blank = answer_trip_question(&trips, "  ", 3).await.unwrap();
    assert_eq!(blank.matched, 3);
    assert!(blank.related.is_empty());
}
