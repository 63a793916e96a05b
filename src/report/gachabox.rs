//! Gachabox aggregation
//!
//! A gachabox submission lists what came out of N pulls. Each pull yields
//! one item, so the report stands for `sum(quantity)` runs rather than one.

use super::task::SingleReport;
use crate::services::{StageLookup, EXTRA_PROCESS_TYPE_GACHABOX};
use crate::types::{DroplineError, Result};

/// Rewrite `report` in place when its stage is a gachabox stage
pub async fn aggregate_gachabox_drops(
    stages: &dyn StageLookup,
    report: &mut SingleReport,
) -> Result<()> {
    let category = stages.get_extra_process_type(&report.stage_id).await?;
    if category.as_deref() == Some(EXTRA_PROCESS_TYPE_GACHABOX) {
        aggregate(report)?;
    }
    Ok(())
}

fn aggregate(report: &mut SingleReport) -> Result<()> {
    report.drops.retain(|d| d.quantity > 0);
    let pulls = report
        .drops
        .iter()
        .try_fold(0i64, |total, d| total.checked_add(d.quantity))
        .ok_or_else(|| {
            DroplineError::Validation(format!(
                "gachabox pull count overflows on stage '{}'",
                report.stage_id
            ))
        })?;
    report.times = pulls.max(1);
    Ok(())
}
