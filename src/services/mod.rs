//! External collaborators
//!
//! The pipeline only talks to accounts, the item/stage catalog, report
//! storage and the recall hash store through these traits. Production
//! deployments back them with their own databases; `memory` provides
//! process-local implementations used by the standalone server and tests.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::report::RequestContext;
use crate::types::Result;

pub use memory::{Catalog, MemoryAccounts, MemoryCatalog, MemoryReportStore};

/// Stage extra-process category for randomized multi-pull stages
pub const EXTRA_PROCESS_TYPE_GACHABOX: &str = "GACHABOX";

/// A submitting account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: i64,
    /// Client-visible identity, carried back on later submissions
    pub penguin_id: String,
}

/// Catalog item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub item_id: i64,
    pub ark_item_id: String,
}

#[async_trait]
pub trait AccountService: Send + Sync {
    /// Account identified by the request, `None` when absent or unknown
    async fn find_account_for_request(&self, ctx: &RequestContext) -> Result<Option<Account>>;

    /// Create a fresh account with a random client-visible identity
    async fn create_account_with_random_identity(&self) -> Result<Account>;
}

#[async_trait]
pub trait ItemLookup: Send + Sync {
    async fn get_item_by_ark_id(&self, ark_item_id: &str) -> Result<Option<Item>>;
}

#[async_trait]
pub trait StageLookup: Send + Sync {
    /// Extra-process category of a stage, `None` for ordinary stages
    async fn get_extra_process_type(&self, ark_stage_id: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait DropReportRepo: Send + Sync {
    /// Delete a persisted report. Returns `false` when no such report exists.
    async fn delete_drop_report(&self, report_id: i64) -> Result<bool>;
}

/// Fast key-value mapping from report hash to internal report id
#[async_trait]
pub trait ReportHashStore: Send + Sync {
    async fn get(&self, report_hash: &str) -> Result<Option<i64>>;

    async fn del(&self, report_hash: &str) -> Result<()>;
}
