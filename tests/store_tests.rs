//! Store backend tests.
//!
//! Every test runs against both backends through the `JobStore` trait; the
//! backends must be indistinguishable to callers, including error cases.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use multiarch_harness_lib::db::DbPool;
use multiarch_harness_lib::error::AppError;
use multiarch_harness_lib::models::{FailureReason, Job, JobStatus, TargetStatus};
use multiarch_harness_lib::store::{DatabaseStore, JobStore, MemoryStore, TargetUpdate};

/// Backends under test. The TempDir keeps the SQLite file alive.
async fn backends() -> Vec<(&'static str, Arc<dyn JobStore>, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!(
        "sqlite://{}/store_tests.db?mode=rwc",
        dir.path().to_str().expect("utf-8 tempdir path")
    );
    let pool = DbPool::connect(&url).await.expect("connect");
    pool.run_migrations().await.expect("migrate");

    vec![
        ("memory", Arc::new(MemoryStore::new()) as Arc<dyn JobStore>, None),
        (
            "database",
            Arc::new(DatabaseStore::new(pool)) as Arc<dyn JobStore>,
            Some(dir),
        ),
    ]
}

fn ts(s: &str) -> DateTime<Utc> {
    s.parse().expect("timestamp")
}

/// A job with every field populated, using second-precision timestamps so
/// equality survives the database round-trip.
fn full_job() -> Job {
    let mut job = Job::new(
        Uuid::now_v7(),
        "https://github.com/example/widget.git",
        "7f3a2b1",
        "cargo test --all",
        vec!["amd64".to_string(), "arm64".to_string()],
        Some("5m".to_string()),
        HashMap::from([("CI".to_string(), "true".to_string())]),
    );
    job.created_at = ts("2025-06-01T10:00:00Z");
    job.updated_at = ts("2025-06-01T10:02:00Z");
    job.started_at = Some(ts("2025-06-01T10:00:10Z"));
    job.ended_at = Some(ts("2025-06-01T10:01:50Z"));
    job.status = JobStatus::Failed;

    job.targets[0].status = TargetStatus::Passed;
    job.targets[0].exit_code = 0;
    job.targets[0].log = "STDOUT:\nall tests passed\nSTDERR:\n".to_string();
    job.targets[0].started_at = Some(ts("2025-06-01T10:00:10Z"));
    job.targets[0].ended_at = Some(ts("2025-06-01T10:01:00Z"));

    job.targets[1].status = TargetStatus::Failed;
    job.targets[1].reason = Some(FailureReason::TestsFailed);
    job.targets[1].exit_code = 2;
    job.targets[1].log = "STDOUT:\n1 failure\nSTDERR:\nassertion failed\n".to_string();
    job.targets[1].started_at = Some(ts("2025-06-01T10:00:15Z"));
    job.targets[1].ended_at = Some(ts("2025-06-01T10:01:50Z"));
    job.targets[1].timeout = Some("30s".to_string());
    job.targets[1].env = HashMap::from([("RUST_LOG".to_string(), "debug".to_string())]);

    job
}

#[tokio::test]
async fn save_then_get_round_trips_every_field() {
    for (name, store, _guard) in backends().await {
        let job = full_job();
        store.save_job(&job).await.expect("save");

        let fetched = store.get_job(job.id).await.expect("get");
        assert_eq!(fetched, job, "backend {name} altered the job");
    }
}

#[tokio::test]
async fn save_is_an_idempotent_upsert() {
    for (name, store, _guard) in backends().await {
        let mut job = full_job();
        store.save_job(&job).await.expect("save");

        job.status = JobStatus::Passed;
        job.targets[1].status = TargetStatus::Passed;
        job.targets[1].reason = None;
        store.save_job(&job).await.expect("re-save");

        let fetched = store.get_job(job.id).await.expect("get");
        assert_eq!(fetched, job, "backend {name} did not overwrite");
        assert_eq!(fetched.targets.len(), 2);
    }
}

#[tokio::test]
async fn get_unknown_job_is_not_found() {
    for (name, store, _guard) in backends().await {
        let err = store.get_job(Uuid::now_v7()).await.expect_err("must fail");
        assert!(
            matches!(err, AppError::NotFound(_)),
            "backend {name} returned {err:?}"
        );
    }
}

#[tokio::test]
async fn list_returns_newest_first() {
    for (name, store, _guard) in backends().await {
        let mut older = full_job();
        older.created_at = ts("2025-06-01T09:00:00Z");
        let mut newer = full_job();
        newer.id = Uuid::now_v7();
        newer.created_at = ts("2025-06-01T11:00:00Z");

        store.save_job(&older).await.expect("save older");
        store.save_job(&newer).await.expect("save newer");

        let jobs = store.list_jobs().await.expect("list");
        assert_eq!(jobs.len(), 2, "backend {name}");
        assert_eq!(jobs[0].id, newer.id, "backend {name} order");
        assert_eq!(jobs[1].id, older.id, "backend {name} order");
    }
}

#[tokio::test]
async fn update_target_applies_commands_in_place() {
    for (name, store, _guard) in backends().await {
        let job = Job::new(
            Uuid::now_v7(),
            "https://github.com/example/widget.git",
            "",
            "make test",
            vec!["amd64".to_string(), "arm64".to_string()],
            None,
            HashMap::new(),
        );
        store.save_job(&job).await.expect("save");

        let started = ts("2025-06-01T10:00:00Z");
        store
            .update_target(job.id, "amd64", TargetUpdate::MarkRunning { started_at: started })
            .await
            .expect("mark running");

        let fetched = store.get_job(job.id).await.expect("get");
        let amd64 = fetched.target("amd64").expect("target");
        assert_eq!(amd64.status, TargetStatus::Running, "backend {name}");
        assert_eq!(amd64.started_at, Some(started));
        // Sibling untouched
        let arm64 = fetched.target("arm64").expect("target");
        assert_eq!(arm64.status, TargetStatus::Pending, "backend {name}");

        let ended = ts("2025-06-01T10:01:00Z");
        store
            .update_target(
                job.id,
                "amd64",
                TargetUpdate::MarkFinished {
                    status: TargetStatus::Failed,
                    reason: Some(FailureReason::Timeout),
                    exit_code: -2,
                    log: "STDOUT:\npartial\nSTDERR:\n".to_string(),
                    ended_at: ended,
                },
            )
            .await
            .expect("mark finished");

        let fetched = store.get_job(job.id).await.expect("get");
        let amd64 = fetched.target("amd64").expect("target");
        assert_eq!(amd64.status, TargetStatus::Failed, "backend {name}");
        assert_eq!(amd64.reason, Some(FailureReason::Timeout));
        assert_eq!(amd64.exit_code, -2);
        assert_eq!(amd64.log, "STDOUT:\npartial\nSTDERR:\n");
        assert_eq!(amd64.started_at, Some(started), "start survives finish");
        assert_eq!(amd64.ended_at, Some(ended));
    }
}

#[tokio::test]
async fn update_target_unknown_job_or_arch_is_not_found_and_changes_nothing() {
    for (name, store, _guard) in backends().await {
        let job = full_job();
        store.save_job(&job).await.expect("save");
        let update = TargetUpdate::MarkRunning {
            started_at: ts("2025-06-01T12:00:00Z"),
        };

        let err = store
            .update_target(Uuid::now_v7(), "amd64", update.clone())
            .await
            .expect_err("unknown job");
        assert!(matches!(err, AppError::NotFound(_)), "backend {name}");

        let err = store
            .update_target(job.id, "riscv64", update)
            .await
            .expect_err("unknown arch");
        assert!(matches!(err, AppError::NotFound(_)), "backend {name}");

        let fetched = store.get_job(job.id).await.expect("get");
        assert_eq!(fetched, job, "backend {name} mutated state on NotFound");
    }
}

#[tokio::test]
async fn recalculate_unknown_job_is_not_found() {
    for (name, store, _guard) in backends().await {
        let err = store
            .recalculate_status(Uuid::now_v7())
            .await
            .expect_err("must fail");
        assert!(matches!(err, AppError::NotFound(_)), "backend {name}");
    }
}

#[tokio::test]
async fn recalculate_derives_aggregate_from_targets() {
    for (name, store, _guard) in backends().await {
        let job = Job::new(
            Uuid::now_v7(),
            "https://github.com/example/widget.git",
            "",
            "make test",
            vec!["amd64".to_string(), "arm64".to_string()],
            None,
            HashMap::new(),
        );
        store.save_job(&job).await.expect("save");

        // One target finishes while the other is still pending: job runs.
        store
            .update_target(
                job.id,
                "amd64",
                TargetUpdate::MarkFinished {
                    status: TargetStatus::Passed,
                    reason: None,
                    exit_code: 0,
                    log: String::new(),
                    ended_at: ts("2025-06-01T10:01:00Z"),
                },
            )
            .await
            .expect("finish amd64");
        store.recalculate_status(job.id).await.expect("recalc");
        let fetched = store.get_job(job.id).await.expect("get");
        assert_eq!(fetched.status, JobStatus::Running, "backend {name}");

        // The second target fails: job fails.
        store
            .update_target(
                job.id,
                "arm64",
                TargetUpdate::MarkFinished {
                    status: TargetStatus::Failed,
                    reason: Some(FailureReason::TestsFailed),
                    exit_code: 1,
                    log: String::new(),
                    ended_at: ts("2025-06-01T10:02:00Z"),
                },
            )
            .await
            .expect("finish arm64");
        store.recalculate_status(job.id).await.expect("recalc");
        let fetched = store.get_job(job.id).await.expect("get");
        assert_eq!(fetched.status, JobStatus::Failed, "backend {name}");
        assert_eq!(fetched.ended_at, Some(ts("2025-06-01T10:02:00Z")));
    }
}

#[tokio::test]
async fn concurrent_updates_on_distinct_architectures_all_land() {
    const N: usize = 8;

    for (name, store, _guard) in backends().await {
        let archs: Vec<String> = (0..N).map(|i| format!("arch{i}")).collect();
        let job = Job::new(
            Uuid::now_v7(),
            "https://github.com/example/widget.git",
            "",
            "make test",
            archs.clone(),
            None,
            HashMap::new(),
        );
        store.save_job(&job).await.expect("save");

        let mut handles = Vec::new();
        for arch in archs.clone() {
            let store = Arc::clone(&store);
            let job_id = job.id;
            handles.push(tokio::spawn(async move {
                store
                    .update_target(
                        job_id,
                        &arch,
                        TargetUpdate::MarkFinished {
                            status: TargetStatus::Passed,
                            reason: None,
                            exit_code: 0,
                            log: format!("STDOUT:\nok from {arch}\nSTDERR:\n"),
                            ended_at: ts("2025-06-01T10:01:00Z"),
                        },
                    )
                    .await
                    .expect("update");
                store.recalculate_status(job_id).await.expect("recalc");
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        let fetched = store.get_job(job.id).await.expect("get");
        for arch in &archs {
            let target = fetched.target(arch).expect("target");
            assert_eq!(
                target.status,
                TargetStatus::Passed,
                "backend {name} lost the update for {arch}"
            );
            assert_eq!(target.log, format!("STDOUT:\nok from {arch}\nSTDERR:\n"));
        }
        assert_eq!(fetched.status, JobStatus::Passed, "backend {name}");
    }
}
