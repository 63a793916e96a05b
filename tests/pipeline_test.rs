//! Report intake integration tests
//!
//! Drives the pipeline end to end against in-memory collaborators and the
//! in-memory queue.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use dropline::queue::{MemoryQueue, MemoryQueueMode, QueueCommitter, SUBJECT_BATCH, SUBJECT_SINGLE};
use dropline::report::mitigation::ACT18D3_CUTOFF_MILLIS;
use dropline::report::{
    ArkDrop, BatchDropElement, BatchReportRequest, DropType, RecallOutcome, ReportCommon,
    ReportPipeline, ReportServices, ReportTask, RequestContext, Server, SingleReportRequest,
};
use dropline::services::memory::CatalogStage;
use dropline::services::{
    AccountService, Catalog, Item, MemoryAccounts, MemoryCatalog, MemoryReportStore,
    EXTRA_PROCESS_TYPE_GACHABOX,
};
use dropline::DroplineError;
use tokio_util::sync::CancellationToken;

struct Harness {
    pipeline: ReportPipeline,
    queue: Arc<MemoryQueue>,
    accounts: Arc<MemoryAccounts>,
    store: Arc<MemoryReportStore>,
}

fn harness() -> Harness {
    let catalog = Arc::new(MemoryCatalog::new(Catalog {
        items: vec![
            Item { item_id: 1, ark_item_id: "30012".into() },
            Item { item_id: 2, ark_item_id: "30013".into() },
            Item { item_id: 3, ark_item_id: "4001".into() },
        ],
        stages: vec![
            CatalogStage { ark_stage_id: "main_01-07".into(), extra_process_type: None },
            CatalogStage {
                ark_stage_id: "gacha_box".into(),
                extra_process_type: Some(EXTRA_PROCESS_TYPE_GACHABOX.into()),
            },
            CatalogStage { ark_stage_id: "act18d3_01_perm".into(), extra_process_type: None },
        ],
    }));
    let queue = Arc::new(MemoryQueue::new(MemoryQueueMode::Ack));
    let accounts = Arc::new(MemoryAccounts::new());
    let store = Arc::new(MemoryReportStore::new());

    let services = ReportServices {
        accounts: accounts.clone(),
        items: catalog.clone(),
        stages: catalog,
        reports: store.clone(),
        hashes: store.clone(),
    };
    let pipeline = ReportPipeline::new(services, QueueCommitter::new(queue.clone()));

    Harness { pipeline, queue, accounts, store }
}

fn common() -> ReportCommon {
    ReportCommon {
        server: Server::CN,
        source: "penguin-stats.io".into(),
        version: "v3.4.0".into(),
    }
}

fn single(stage_id: &str, drops: Vec<ArkDrop>) -> SingleReportRequest {
    SingleReportRequest {
        common: common(),
        stage_id: stage_id.into(),
        drops,
        metadata: None,
    }
}

fn element(stage_id: &str, drops: Vec<ArkDrop>) -> BatchDropElement {
    BatchDropElement {
        stage_id: stage_id.into(),
        drops,
        metadata: None,
    }
}

fn before_act18d3_cutoff() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ACT18D3_CUTOFF_MILLIS - 60_000).unwrap()
}

fn published_task(queue: &MemoryQueue, index: usize) -> (String, ReportTask) {
    let (subject, payload) = queue.published()[index].clone();
    (subject, ReportTask::from_bytes(&payload).unwrap())
}

// =============================================================================
// Single submission
// =============================================================================

#[tokio::test]
async fn test_single_report_is_queued() {
    let h = harness();
    h.accounts.insert("12345678");
    let ctx = RequestContext::new("req-1", "203.0.113.7").with_penguin_id("12345678");

    let req = single(
        "main_01-07",
        vec![
            ArkDrop::new("NORMAL_DROP", "30012", 1),
            ArkDrop::new("REGULAR_DROP", "30012", 2),
            ArkDrop::new("EXTRA_DROP", "4001", 5),
        ],
    );
    let task_id = h.pipeline.submit_single(&ctx, &req).await.unwrap();

    assert!(task_id.starts_with("req-1-"));
    assert!(ctx.issued_penguin_id().is_none());

    let (subject, task) = published_task(&h.queue, 0);
    assert_eq!(subject, SUBJECT_SINGLE);
    assert_eq!(task.task_id, task_id);
    assert_eq!(task.ip, "203.0.113.7");
    assert_eq!(task.reports.len(), 1);

    let report = &task.reports[0];
    assert_eq!(report.times, 1);
    assert_eq!(report.drops.len(), 2);
    assert_eq!(report.drops[0].drop_type, DropType::Regular);
    assert_eq!(report.drops[0].item_id, 1);
    assert_eq!(report.drops[0].quantity, 3);
    assert_eq!(report.drops[1].drop_type, DropType::Extra);
}

#[tokio::test]
async fn test_unknown_drop_type_queues_nothing() {
    let h = harness();
    let ctx = RequestContext::new("req-2", "127.0.0.1");

    let req = single("main_01-07", vec![ArkDrop::new("LUCKY_DROP", "30012", 1)]);
    let err = h.pipeline.submit_single(&ctx, &req).await.unwrap_err();

    match err {
        DroplineError::Validation(msg) => {
            assert!(msg.contains("LUCKY_DROP"));
            assert!(msg.contains("SPECIAL_DROP"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(h.queue.published().is_empty());
}

#[tokio::test]
async fn test_unknown_items_are_skipped() {
    let h = harness();
    let ctx = RequestContext::new("req-3", "127.0.0.1");

    let req = single(
        "main_01-07",
        vec![
            ArkDrop::new("NORMAL_DROP", "not_an_item", 1),
            ArkDrop::new("NORMAL_DROP", "30013", 1),
        ],
    );
    h.pipeline.submit_single(&ctx, &req).await.unwrap();

    let (_, task) = published_task(&h.queue, 0);
    assert_eq!(task.reports[0].drops.len(), 1);
    assert_eq!(task.reports[0].drops[0].item_id, 2);
}

#[tokio::test]
async fn test_gachabox_submission_counts_pulls() {
    let h = harness();
    let ctx = RequestContext::new("req-4", "127.0.0.1");

    let req = single(
        "gacha_box",
        vec![
            ArkDrop::new("NORMAL_DROP", "30012", 4),
            ArkDrop::new("NORMAL_DROP", "30013", 0),
            ArkDrop::new("NORMAL_DROP", "4001", 6),
        ],
    );
    h.pipeline.submit_single(&ctx, &req).await.unwrap();

    let (_, task) = published_task(&h.queue, 0);
    assert_eq!(task.reports[0].times, 10);
    assert_eq!(task.reports[0].drops.len(), 2);
}

#[tokio::test]
async fn test_legacy_stage_fix_expired() {
    let h = harness();
    let ctx = RequestContext::new("req-5", "127.0.0.1");

    let mut req = single("act18d3_01_perm", vec![]);
    req.common.source = "MeoAssistant".into();
    h.pipeline.submit_single(&ctx, &req).await.unwrap();

    // The rewrite window closed in 2022
    let (_, task) = published_task(&h.queue, 0);
    assert_eq!(task.reports[0].stage_id, "act18d3_01_perm");
}

#[tokio::test]
async fn test_legacy_stage_fix_inside_window() {
    let h = harness();
    let pipeline = h.pipeline.with_clock(before_act18d3_cutoff);
    let ctx = RequestContext::new("req-5b", "127.0.0.1");

    let mut req = single("act18d3_01_perm", vec![]);
    req.common.source = "MeoAssistant".into();
    pipeline.submit_single(&ctx, &req).await.unwrap();

    let (_, task) = published_task(&h.queue, 0);
    assert_eq!(task.reports[0].stage_id, "act18d3_01_rep");
}

#[tokio::test]
async fn test_anonymous_submitter_gets_identity() {
    let h = harness();
    let ctx = RequestContext::new("req-6", "127.0.0.1");

    let req = single("main_01-07", vec![]);
    h.pipeline.submit_single(&ctx, &req).await.unwrap();

    let issued = ctx.issued_penguin_id().unwrap();
    assert_eq!(issued.len(), 8);

    // The next request carrying that identity reuses the account
    let again = RequestContext::new("req-7", "127.0.0.1").with_penguin_id(issued);
    let account = h
        .accounts
        .find_account_for_request(&again)
        .await
        .unwrap()
        .expect("issued identity has an account");
    h.pipeline.submit_single(&again, &req).await.unwrap();
    assert!(again.issued_penguin_id().is_none());

    let (_, first) = published_task(&h.queue, 0);
    let (_, second) = published_task(&h.queue, 1);
    assert_eq!(first.account_id, account.account_id);
    assert_eq!(second.account_id, account.account_id);
}

#[tokio::test]
async fn test_identity_issued_even_when_queue_fails() {
    let h = harness();
    h.queue.set_mode(MemoryQueueMode::Refuse("stream offline".into()));
    let ctx = RequestContext::new("req-8", "127.0.0.1");

    let req = single("main_01-07", vec![ArkDrop::new("NORMAL_DROP", "30012", 1)]);
    let err = h.pipeline.submit_single(&ctx, &req).await.unwrap_err();

    assert!(matches!(err, DroplineError::QueuePublish(_)));
    assert!(ctx.issued_penguin_id().is_some());
}

#[tokio::test]
async fn test_unknown_stage_is_rejected() {
    let h = harness();
    let ctx = RequestContext::new("req-9", "127.0.0.1");

    let req = single("nowhere", vec![]);
    let err = h.pipeline.submit_single(&ctx, &req).await.unwrap_err();
    assert!(matches!(err, DroplineError::NotFound(_)));
    assert!(h.queue.published().is_empty());
}

// =============================================================================
// Queue outcomes
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_commit_times_out() {
    let h = harness();
    h.queue.set_mode(MemoryQueueMode::Hang);
    let ctx = RequestContext::new("req-10", "127.0.0.1");

    let started = tokio::time::Instant::now();
    let req = single("main_01-07", vec![]);
    let err = h.pipeline.submit_single(&ctx, &req).await.unwrap_err();

    assert!(matches!(err, DroplineError::QueueTimeout));
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test]
async fn test_cancelled_request_stops_waiting() {
    let h = harness();
    h.queue.set_mode(MemoryQueueMode::Hang);
    let cancel = CancellationToken::new();
    let ctx = RequestContext::new("req-11", "127.0.0.1").with_cancel(cancel.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let req = single("main_01-07", vec![]);
    let err = h.pipeline.submit_single(&ctx, &req).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, DroplineError::Cancelled));
}

#[tokio::test]
async fn test_rejected_ack_is_publish_error() {
    let h = harness();
    h.queue.set_mode(MemoryQueueMode::Reject("no responders".into()));
    let ctx = RequestContext::new("req-12", "127.0.0.1");

    let req = single("main_01-07", vec![]);
    let err = h.pipeline.submit_single(&ctx, &req).await.unwrap_err();
    assert!(matches!(err, DroplineError::QueuePublish(_)));
}

// =============================================================================
// Batch submission
// =============================================================================

#[tokio::test]
async fn test_batch_is_one_task() {
    let h = harness();
    let ctx = RequestContext::new("req-20", "127.0.0.1");

    let req = BatchReportRequest {
        common: common(),
        batch_drops: vec![
            element("main_01-07", vec![ArkDrop::new("NORMAL_DROP", "30012", 2)]),
            element("gacha_box", vec![ArkDrop::new("NORMAL_DROP", "30013", 3)]),
        ],
    };
    let task_id = h.pipeline.submit_batch(&ctx, &req).await.unwrap();

    let published = h.queue.published();
    assert_eq!(published.len(), 1);

    let (subject, task) = published_task(&h.queue, 0);
    assert_eq!(subject, SUBJECT_BATCH);
    assert_eq!(task.task_id, task_id);
    assert!(task.created_at > 0);
    assert_eq!(task.reports.len(), 2);
    assert_eq!(task.reports[0].times, 1);
    assert_eq!(task.reports[1].times, 3);
}

#[tokio::test]
async fn test_batch_elements_skip_legacy_stage_fix() {
    let h = harness();
    let pipeline = h.pipeline.with_clock(before_act18d3_cutoff);
    let ctx = RequestContext::new("req-20b", "127.0.0.1");

    let mut req = BatchReportRequest {
        common: common(),
        batch_drops: vec![element("act18d3_01_perm", vec![])],
    };
    req.common.source = "MeoAssistant".into();
    pipeline.submit_batch(&ctx, &req).await.unwrap();

    let (_, task) = published_task(&h.queue, 0);
    assert_eq!(task.reports[0].stage_id, "act18d3_01_perm");
}

#[tokio::test]
async fn test_batch_is_all_or_nothing() {
    let h = harness();
    let ctx = RequestContext::new("req-21", "127.0.0.1");

    let req = BatchReportRequest {
        common: common(),
        batch_drops: vec![
            element("main_01-07", vec![ArkDrop::new("NORMAL_DROP", "30012", 2)]),
            element("main_01-07", vec![ArkDrop::new("NORMAL_DROP", "30012", 1)]),
            element("main_01-07", vec![ArkDrop::new("BONUS_DROP", "30012", 1)]),
        ],
    };
    let err = h.pipeline.submit_batch(&ctx, &req).await.unwrap_err();

    match err {
        DroplineError::Validation(msg) => assert!(msg.starts_with("batchDrops[2]")),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(h.queue.published().is_empty());
}

#[tokio::test]
async fn test_empty_batch_rejected() {
    let h = harness();
    let ctx = RequestContext::new("req-22", "127.0.0.1");

    let req = BatchReportRequest { common: common(), batch_drops: vec![] };
    let err = h.pipeline.submit_batch(&ctx, &req).await.unwrap_err();
    assert!(matches!(err, DroplineError::Validation(_)));
    assert!(ctx.issued_penguin_id().is_none());
}

// =============================================================================
// Recall
// =============================================================================

#[tokio::test]
async fn test_recall_is_idempotent() {
    let h = harness();
    h.store.insert(42, "hash-42");

    assert_eq!(h.pipeline.recall("hash-42").await.unwrap(), RecallOutcome::Recalled);
    assert!(!h.store.contains_report(42));
    assert!(!h.store.contains_hash("hash-42"));

    assert_eq!(h.pipeline.recall("hash-42").await.unwrap(), RecallOutcome::NotFound);
}

#[tokio::test]
async fn test_recall_unknown_hash() {
    let h = harness();
    assert_eq!(h.pipeline.recall("never-seen").await.unwrap(), RecallOutcome::NotFound);
}

#[tokio::test]
async fn test_recall_removes_stale_mapping() {
    let h = harness();
    h.store.insert(7, "hash-7");
    h.store.remove_report_only(7);

    assert_eq!(h.pipeline.recall("hash-7").await.unwrap(), RecallOutcome::NotFound);
    assert!(!h.store.contains_hash("hash-7"));
}

#[tokio::test]
async fn test_failed_delete_keeps_mapping() {
    let h = harness();
    h.store.insert(9, "hash-9");
    h.store.set_fail_deletes(true);

    let err = h.pipeline.recall("hash-9").await.unwrap_err();
    assert!(matches!(err, DroplineError::Repository(_)));
    assert!(h.store.contains_hash("hash-9"));

    h.store.set_fail_deletes(false);
    assert_eq!(h.pipeline.recall("hash-9").await.unwrap(), RecallOutcome::Recalled);
}
