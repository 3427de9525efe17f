//! Exactly-once admission under restarts and the crash-between-write-and-
//! commit window — the most important correctness property of the pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rowvault::quarantine::{QuarantineRecord, QuarantineSink};
use rowvault::{
    generate_protection_key, IngestLedger, IngestionPipeline, KeyProvider, Policy, PolicyConfig,
    PipelineConfig, ProtectedStore, StaticKeyProvider,
};

/// A test sink that collects records into a shared Vec.
struct SharedVecSink {
    records: Arc<Mutex<Vec<QuarantineRecord>>>,
}

impl QuarantineSink for SharedVecSink {
    fn record(&mut self, record: QuarantineRecord) {
        self.records.lock().unwrap().push(record);
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    quarantined: Arc<Mutex<Vec<QuarantineRecord>>>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("landing")).unwrap();
        Self {
            dir,
            quarantined: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn drop_file(&self, name: &str, content: &str) {
        std::fs::write(self.dir.path().join("landing").join(name), content).unwrap();
    }

    fn policy(&self) -> Policy {
        Policy::validate(PolicyConfig {
            encrypt: vec!["email".into()],
            hash: vec!["national_id".into()],
            drop: vec![],
            mask_rules: HashMap::new(),
        })
        .unwrap()
    }

    /// Build a pipeline the way a fresh process would: reopening the
    /// ledger and store from disk.
    fn pipeline(&self, provider: Arc<StaticKeyProvider>) -> IngestionPipeline {
        self.pipeline_with_timeout(provider, Duration::from_secs(30))
    }

    fn pipeline_with_timeout(
        &self,
        provider: Arc<StaticKeyProvider>,
        commit_timeout: Duration,
    ) -> IngestionPipeline {
        let ledger = Arc::new(IngestLedger::open(self.dir.path().join("ledger.jsonl")).unwrap());
        let store = Arc::new(ProtectedStore::open(self.dir.path().join("store")).unwrap());
        let config = PipelineConfig {
            landing_dir: self.dir.path().join("landing"),
            delimiter: ',',
            commit_timeout,
        };
        IngestionPipeline::new(
            config,
            self.policy(),
            provider,
            ledger,
            store,
            Box::new(SharedVecSink {
                records: Arc::clone(&self.quarantined),
            }),
        )
    }

    fn store(&self) -> ProtectedStore {
        ProtectedStore::open(self.dir.path().join("store")).unwrap()
    }
}

#[test]
fn test_file_is_admitted_exactly_once_across_cycles() {
    let fixture = Fixture::new();
    fixture.drop_file("customers.csv", "id,email,national_id\n1,a@x.com,111\n2,b@x.com,222\n");

    let provider = Arc::new(StaticKeyProvider::new(generate_protection_key().unwrap()));
    let pipeline = fixture.pipeline(Arc::clone(&provider));

    let first = pipeline.run_cycle().unwrap();
    assert_eq!(first.committed, 1);

    let second = pipeline.run_cycle().unwrap();
    assert_eq!(second.committed, 0);
    assert_eq!(second.skipped, 1);

    assert_eq!(fixture.store().records().unwrap().len(), 2);
}

#[test]
fn test_restarted_pipeline_does_not_readmit() {
    let fixture = Fixture::new();
    fixture.drop_file("customers.csv", "id,email\n1,a@x.com\n");

    let provider = Arc::new(StaticKeyProvider::new(generate_protection_key().unwrap()));
    fixture.pipeline(Arc::clone(&provider)).run_cycle().unwrap();

    // "Restart": a brand-new pipeline over the same durable state.
    let report = fixture.pipeline(Arc::clone(&provider)).run_cycle().unwrap();
    assert_eq!(report.committed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(fixture.store().records().unwrap().len(), 1);
}

#[test]
fn test_crash_between_store_write_and_ledger_commit() {
    let fixture = Fixture::new();
    let content = "id,email,national_id\n1,a@x.com,111\n";
    fixture.drop_file("customers.csv", content);

    let provider = Arc::new(StaticKeyProvider::new(generate_protection_key().unwrap()));

    // Simulate the doomed first run by hand: claim the file and write the
    // protected batch, then "crash" before the ledger commit.
    {
        let ledger = IngestLedger::open(fixture.dir.path().join("ledger.jsonl")).unwrap();
        let store = ProtectedStore::open(fixture.dir.path().join("store")).unwrap();

        let files = rowvault::source::discover(&fixture.dir.path().join("landing")).unwrap();
        let file = &files[0];
        assert_eq!(
            ledger.claim(&file.file_id, &file.fingerprint).unwrap(),
            rowvault::ClaimOutcome::Claimed
        );

        let mut sink = rowvault::quarantine::MemoryQuarantineSink::new();
        let parsed = rowvault::source::read_batch(file, ',', &mut sink).unwrap();
        let (version, key) = provider.active().unwrap();
        let protected = fixture.policy().apply(&parsed.records, version, &key).unwrap();
        store
            .append_batch(&file.file_id, &file.fingerprint, &protected)
            .unwrap();
        // Crash: no ledger.commit. The entry stays `claimed`.
    }

    // Recovery run: the file is re-claimed, re-written, and committed.
    let report = fixture.pipeline(Arc::clone(&provider)).run_cycle().unwrap();
    assert_eq!(report.committed, 1);

    // Exactly one logical copy after both attempts.
    let store = fixture.store();
    let batches = store.scan().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].records.len(), 1);

    // And it stays that way on further cycles.
    let report = fixture.pipeline(Arc::clone(&provider)).run_cycle().unwrap();
    assert_eq!(report.committed, 0);
    assert_eq!(store.scan().unwrap().len(), 1);
}

#[test]
fn test_commit_timeout_leaves_claimed_and_retry_converges() {
    let fixture = Fixture::new();
    fixture.drop_file("slow.csv", "id,email\n1,a@x.com\n");

    let provider = Arc::new(StaticKeyProvider::new(generate_protection_key().unwrap()));

    // A zero deadline always expires: the batch may have landed in the
    // store, but the ledger entry must stay `claimed`, not committed.
    let timed_out = fixture
        .pipeline_with_timeout(Arc::clone(&provider), Duration::ZERO)
        .run_cycle()
        .unwrap();
    assert_eq!(timed_out.committed, 0);
    assert_eq!(timed_out.retried, 1);

    let ledger = IngestLedger::open(fixture.dir.path().join("ledger.jsonl")).unwrap();
    let files = rowvault::source::discover(&fixture.dir.path().join("landing")).unwrap();
    let file = &files[0];
    assert!(!ledger.is_committed(&file.file_id, &file.fingerprint));
    assert_eq!(
        ledger.status(&file.file_id, &file.fingerprint),
        Some(rowvault::LedgerStatus::Claimed)
    );
    drop(ledger);

    // A sane deadline retries the whole file; the identity-addressed
    // store write converges to exactly one committed copy.
    let retried = fixture.pipeline(Arc::clone(&provider)).run_cycle().unwrap();
    assert_eq!(retried.committed, 1);

    let store = fixture.store();
    assert_eq!(store.scan().unwrap().len(), 1);
    assert_eq!(store.records().unwrap().len(), 1);

    // And nothing is re-admitted afterwards.
    let settled = fixture.pipeline(Arc::clone(&provider)).run_cycle().unwrap();
    assert_eq!(settled.committed, 0);
    assert_eq!(settled.skipped, 1);
}

#[test]
fn test_replaced_file_content_is_a_new_logical_file() {
    let fixture = Fixture::new();
    fixture.drop_file("daily.csv", "id,email\n1,a@x.com\n");

    let provider = Arc::new(StaticKeyProvider::new(generate_protection_key().unwrap()));
    let pipeline = fixture.pipeline(Arc::clone(&provider));
    assert_eq!(pipeline.run_cycle().unwrap().committed, 1);

    // Same name, new content: admitted again.
    fixture.drop_file("daily.csv", "id,email\n2,b@x.com\n");
    assert_eq!(pipeline.run_cycle().unwrap().committed, 1);

    assert_eq!(fixture.store().scan().unwrap().len(), 2);
}

#[test]
fn test_structural_failure_abandons_only_the_bad_file() {
    let fixture = Fixture::new();
    fixture.drop_file("good.csv", "id,email\n1,a@x.com\n");
    std::fs::write(
        fixture.dir.path().join("landing").join("bad.csv"),
        [0xff, 0xfe, 0x41],
    )
    .unwrap();

    let provider = Arc::new(StaticKeyProvider::new(generate_protection_key().unwrap()));
    let report = fixture.pipeline(Arc::clone(&provider)).run_cycle().unwrap();

    assert_eq!(report.committed, 1);
    assert_eq!(report.abandoned, 1);

    // The abandoned file is never retried.
    let report = fixture.pipeline(Arc::clone(&provider)).run_cycle().unwrap();
    assert_eq!(report.abandoned, 0);
    assert_eq!(report.committed, 0);
}

#[test]
fn test_quarantined_rows_are_recorded_and_rest_commits() {
    let fixture = Fixture::new();
    fixture.drop_file(
        "mixed.csv",
        "id,email\n1,a@x.com\n2,b@x.com,EXTRA_FIELD\n3,c@x.com\n",
    );

    let provider = Arc::new(StaticKeyProvider::new(generate_protection_key().unwrap()));
    let report = fixture.pipeline(Arc::clone(&provider)).run_cycle().unwrap();

    assert_eq!(report.committed, 1);
    assert_eq!(report.quarantined_rows, 1);
    assert_eq!(fixture.store().records().unwrap().len(), 2);

    let quarantined = fixture.quarantined.lock().unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].file_id, "mixed.csv");
    assert_eq!(quarantined[0].line, 3);
}
