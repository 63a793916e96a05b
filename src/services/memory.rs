//! In-process collaborator implementations
//!
//! Backed by `DashMap`, safe for concurrent use. The catalog can be seeded
//! from a JSON file so the server runs without a database.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{debug, info};

use super::{
    Account, AccountService, DropReportRepo, Item, ItemLookup, ReportHashStore, StageLookup,
};
use crate::report::RequestContext;
use crate::types::{DroplineError, Result};

/// Stage entry in a catalog file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStage {
    pub ark_stage_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_process_type: Option<String>,
}

/// Catalog file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub stages: Vec<CatalogStage>,
}

impl Catalog {
    /// Load a catalog from a JSON file
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DroplineError::Config(format!("failed to read catalog {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            DroplineError::Config(format!("invalid catalog {}: {}", path.display(), e))
        })
    }
}

/// Item and stage lookup over a fixed catalog
pub struct MemoryCatalog {
    items: HashMap<String, Item>,
    stages: HashMap<String, Option<String>>,
}

impl MemoryCatalog {
    pub fn new(catalog: Catalog) -> Self {
        let items = catalog
            .items
            .into_iter()
            .map(|item| (item.ark_item_id.clone(), item))
            .collect();
        let stages = catalog
            .stages
            .into_iter()
            .map(|stage| (stage.ark_stage_id, stage.extra_process_type))
            .collect();
        Self { items, stages }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

#[async_trait]
impl ItemLookup for MemoryCatalog {
    async fn get_item_by_ark_id(&self, ark_item_id: &str) -> Result<Option<Item>> {
        Ok(self.items.get(ark_item_id).cloned())
    }
}

#[async_trait]
impl StageLookup for MemoryCatalog {
    async fn get_extra_process_type(&self, ark_stage_id: &str) -> Result<Option<String>> {
        match self.stages.get(ark_stage_id) {
            Some(category) => Ok(category.clone()),
            None => Err(DroplineError::NotFound(format!(
                "stage '{}' not found",
                ark_stage_id
            ))),
        }
    }
}

/// Accounts keyed by penguin id
pub struct MemoryAccounts {
    by_penguin_id: DashMap<String, Account>,
    next_id: AtomicI64,
}

impl Default for MemoryAccounts {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self {
            by_penguin_id: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Register an account with a known penguin id
    pub fn insert(&self, penguin_id: &str) -> Account {
        let account = Account {
            account_id: self.next_id.fetch_add(1, Ordering::Relaxed),
            penguin_id: penguin_id.to_string(),
        };
        self.by_penguin_id
            .insert(penguin_id.to_string(), account.clone());
        account
    }
}

#[async_trait]
impl AccountService for MemoryAccounts {
    async fn find_account_for_request(&self, ctx: &RequestContext) -> Result<Option<Account>> {
        let Some(penguin_id) = ctx.penguin_id.as_deref() else {
            return Ok(None);
        };
        Ok(self.by_penguin_id.get(penguin_id).map(|a| a.clone()))
    }

    async fn create_account_with_random_identity(&self) -> Result<Account> {
        let mut rng = rand::thread_rng();
        loop {
            let penguin_id = format!("{:08}", rng.gen_range(10_000_000u32..100_000_000));
            if self.by_penguin_id.contains_key(&penguin_id) {
                continue;
            }
            let account = self.insert(&penguin_id);
            info!("Created account {} with penguin id {}", account.account_id, penguin_id);
            return Ok(account);
        }
    }
}

/// Persisted reports plus the recall hash mapping
pub struct MemoryReportStore {
    reports: DashMap<i64, String>,
    hashes: DashMap<String, i64>,
    fail_deletes: AtomicBool,
}

impl Default for MemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self {
            reports: DashMap::new(),
            hashes: DashMap::new(),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Record a stored report and its recall hash
    pub fn insert(&self, report_id: i64, report_hash: &str) {
        self.reports.insert(report_id, report_hash.to_string());
        self.hashes.insert(report_hash.to_string(), report_id);
    }

    /// Simulate a report row vanishing while its hash mapping survives
    pub fn remove_report_only(&self, report_id: i64) {
        self.reports.remove(&report_id);
    }

    /// Make every subsequent delete fail with a repository error
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::Relaxed);
    }

    pub fn contains_report(&self, report_id: i64) -> bool {
        self.reports.contains_key(&report_id)
    }

    pub fn contains_hash(&self, report_hash: &str) -> bool {
        self.hashes.contains_key(report_hash)
    }
}

#[async_trait]
impl DropReportRepo for MemoryReportStore {
    async fn delete_drop_report(&self, report_id: i64) -> Result<bool> {
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(DroplineError::Repository(format!(
                "failed to delete report {}",
                report_id
            )));
        }
        let removed = self.reports.remove(&report_id).is_some();
        debug!("Deleted report {} (existed: {})", report_id, removed);
        Ok(removed)
    }
}

#[async_trait]
impl ReportHashStore for MemoryReportStore {
    async fn get(&self, report_hash: &str) -> Result<Option<i64>> {
        Ok(self.hashes.get(report_hash).map(|id| *id))
    }

    async fn del(&self, report_hash: &str) -> Result<()> {
        self.hashes.remove(report_hash);
        Ok(())
    }
}
