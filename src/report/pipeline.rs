//! Report pipeline
//!
//! account → normalize → gachabox → mitigation → task → queue for single
//! submissions, the same minus mitigation per batch element, plus recall of
//! stored reports.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::context::RequestContext;
use super::gachabox::aggregate_gachabox_drops;
use super::mitigation::mitigate_act18d3;
use super::normalize::normalize_drops;
use super::request::{ArkDrop, BatchReportRequest, ReportMetadata, SingleReportRequest};
use super::task::{generate_task_id, ReportTask, SingleReport};
use crate::queue::{QueueCommitter, SUBJECT_BATCH, SUBJECT_SINGLE};
use crate::services::{AccountService, DropReportRepo, ItemLookup, ReportHashStore, StageLookup};
use crate::types::{DroplineError, Result};

/// Collaborators the pipeline depends on
#[derive(Clone)]
pub struct ReportServices {
    pub accounts: Arc<dyn AccountService>,
    pub items: Arc<dyn ItemLookup>,
    pub stages: Arc<dyn StageLookup>,
    pub reports: Arc<dyn DropReportRepo>,
    pub hashes: Arc<dyn ReportHashStore>,
}

/// Result of a recall request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallOutcome {
    Recalled,
    /// Unknown hash, or already recalled
    NotFound,
}

/// Intake pipeline for drop reports
pub struct ReportPipeline {
    services: ReportServices,
    committer: QueueCommitter,
    clock: fn() -> DateTime<Utc>,
}

impl ReportPipeline {
    pub fn new(services: ReportServices, committer: QueueCommitter) -> Self {
        Self {
            services,
            committer,
            clock: Utc::now,
        }
    }

    /// Replace the wall clock used by time-boxed rewrites
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// Queue a single report, returning its task id
    pub async fn submit_single(
        &self,
        ctx: &RequestContext,
        req: &SingleReportRequest,
    ) -> Result<String> {
        let account_id = self.resolve_account(ctx).await?;

        let mut report = self
            .prepare_report(&req.stage_id, &req.drops, req.metadata.clone())
            .await?;
        report.stage_id =
            mitigate_act18d3(&report.stage_id, &req.common.source, (self.clock)()).into_owned();

        let task = ReportTask::assemble(
            generate_task_id(&ctx.request_id),
            req.common.clone(),
            vec![report],
            account_id,
            ctx.ip.clone(),
        );

        self.committer
            .commit(SUBJECT_SINGLE, &task, &ctx.cancel)
            .await
    }

    /// Queue a batch as one task. Every element must pass before anything
    /// is published.
    pub async fn submit_batch(
        &self,
        ctx: &RequestContext,
        req: &BatchReportRequest,
    ) -> Result<String> {
        if req.batch_drops.is_empty() {
            return Err(DroplineError::Validation("batchDrops must not be empty".into()));
        }

        let account_id = self.resolve_account(ctx).await?;

        // Sequential so a failure at element i stops before any commit.
        // Batch elements never get the act18d3 rewrite.
        let mut reports = Vec::with_capacity(req.batch_drops.len());
        for (index, element) in req.batch_drops.iter().enumerate() {
            let report = self
                .prepare_report(&element.stage_id, &element.drops, element.metadata.clone())
                .await
                .map_err(|e| match e {
                    DroplineError::Validation(msg) => {
                        DroplineError::Validation(format!("batchDrops[{}]: {}", index, msg))
                    }
                    other => other,
                })?;
            reports.push(report);
        }

        let task = ReportTask::assemble(
            generate_task_id(&ctx.request_id),
            req.common.clone(),
            reports,
            account_id,
            ctx.ip.clone(),
        );

        self.committer.commit(SUBJECT_BATCH, &task, &ctx.cancel).await
    }

    /// Recall a stored report by its hash
    ///
    /// The hash mapping is only removed after the report itself is gone, so
    /// a failed delete leaves the report recallable.
    pub async fn recall(&self, report_hash: &str) -> Result<RecallOutcome> {
        let Some(report_id) = self.services.hashes.get(report_hash).await? else {
            debug!("Recall of unknown hash {}", report_hash);
            return Ok(RecallOutcome::NotFound);
        };

        let existed = self.services.reports.delete_drop_report(report_id).await?;
        self.services.hashes.del(report_hash).await?;

        if !existed {
            warn!(
                "Hash {} pointed at missing report {}, removed stale mapping",
                report_hash, report_id
            );
            return Ok(RecallOutcome::NotFound);
        }

        info!("Recalled report {} ({})", report_id, report_hash);
        Ok(RecallOutcome::Recalled)
    }

    /// Find the submitting account, creating one on a miss
    async fn resolve_account(&self, ctx: &RequestContext) -> Result<i64> {
        if let Some(account) = self.services.accounts.find_account_for_request(ctx).await? {
            return Ok(account.account_id);
        }

        let created = self
            .services
            .accounts
            .create_account_with_random_identity()
            .await?;
        ctx.issue_penguin_id(created.penguin_id);
        Ok(created.account_id)
    }

    async fn prepare_report(
        &self,
        stage_id: &str,
        drops: &[ArkDrop],
        metadata: Option<ReportMetadata>,
    ) -> Result<SingleReport> {
        let drops = normalize_drops(self.services.items.as_ref(), drops).await?;

        let mut report = SingleReport::new(stage_id.to_string(), drops, metadata);
        aggregate_gachabox_drops(self.services.stages.as_ref(), &mut report).await?;
        Ok(report)
    }
}
