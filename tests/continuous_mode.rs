//! Continuous mode: the pipeline loops over discovery cycles and honors
//! the stop flag at file boundaries, using the same claim/commit protocol
//! as batch mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rowvault::quarantine::MemoryQuarantineSink;
use rowvault::{
    generate_protection_key, IngestLedger, IngestionPipeline, Policy, PolicyConfig,
    PipelineConfig, ProtectedStore, StaticKeyProvider,
};

#[test]
fn test_run_until_stopped_picks_up_late_files() {
    let dir = tempfile::tempdir().unwrap();
    let landing = dir.path().join("landing");
    std::fs::create_dir_all(&landing).unwrap();
    std::fs::write(landing.join("first.csv"), "id,email\n1,a@x.com\n").unwrap();

    let provider = Arc::new(StaticKeyProvider::new(generate_protection_key().unwrap()));
    let ledger = Arc::new(IngestLedger::open(dir.path().join("ledger.jsonl")).unwrap());
    let store = Arc::new(ProtectedStore::open(dir.path().join("store")).unwrap());
    let policy = Policy::validate(PolicyConfig {
        encrypt: vec!["email".into()],
        hash: vec![],
        drop: vec![],
        mask_rules: HashMap::new(),
    })
    .unwrap();

    let pipeline = Arc::new(IngestionPipeline::new(
        PipelineConfig {
            landing_dir: landing.clone(),
            delimiter: ',',
            commit_timeout: Duration::from_secs(30),
        },
        policy,
        provider,
        ledger,
        Arc::clone(&store),
        Box::new(MemoryQuarantineSink::new()),
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let worker = {
        let pipeline = Arc::clone(&pipeline);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || pipeline.run(Duration::from_millis(10), &stop))
    };

    // A file that arrives while the loop is running gets committed too.
    // Staged outside the landing area and renamed in, so discovery never
    // sees a half-written file.
    let staged = dir.path().join("second.csv");
    std::fs::write(&staged, "id,email\n2,b@x.com\n").unwrap();
    std::fs::rename(&staged, landing.join("second.csv")).unwrap();

    // Wait until both batches are visible, then stop.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while store.records().unwrap().len() < 2 {
        assert!(
            std::time::Instant::now() < deadline,
            "continuous mode never committed both files"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    stop.store(true, Ordering::Relaxed);
    worker.join().unwrap();

    assert_eq!(store.records().unwrap().len(), 2);
    // Nothing was double-committed while the loop polled repeatedly.
    assert_eq!(store.scan().unwrap().len(), 2);
}

#[test]
fn test_transient_discovery_failure_does_not_end_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    // The landing area does not exist yet: every early cycle fails.
    let landing = dir.path().join("landing");

    let provider = Arc::new(StaticKeyProvider::new(generate_protection_key().unwrap()));
    let ledger = Arc::new(IngestLedger::open(dir.path().join("ledger.jsonl")).unwrap());
    let store = Arc::new(ProtectedStore::open(dir.path().join("store")).unwrap());
    let policy = Policy::validate(PolicyConfig {
        encrypt: vec!["email".into()],
        hash: vec![],
        drop: vec![],
        mask_rules: HashMap::new(),
    })
    .unwrap();

    let pipeline = Arc::new(IngestionPipeline::new(
        PipelineConfig {
            landing_dir: landing.clone(),
            delimiter: ',',
            commit_timeout: Duration::from_secs(30),
        },
        policy,
        provider,
        ledger,
        Arc::clone(&store),
        Box::new(MemoryQuarantineSink::new()),
    ));

    let stop = Arc::new(AtomicBool::new(false));
    let worker = {
        let pipeline = Arc::clone(&pipeline);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || pipeline.run(Duration::from_millis(10), &stop))
    };

    // Let a few failing cycles elapse, then bring the landing area up.
    std::thread::sleep(Duration::from_millis(50));
    std::fs::create_dir_all(&landing).unwrap();
    let staged = dir.path().join("late.csv");
    std::fs::write(&staged, "id,email\n1,a@x.com\n").unwrap();
    std::fs::rename(&staged, landing.join("late.csv")).unwrap();

    // The loop must still be alive to pick the file up.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while store.records().unwrap().is_empty() {
        assert!(
            std::time::Instant::now() < deadline,
            "loop died on the transient discovery failure"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    stop.store(true, Ordering::Relaxed);
    worker.join().unwrap();

    assert_eq!(store.records().unwrap().len(), 1);
}
