//! Report task records
//!
//! The unit of work handed to the durable queue. Serialized as camelCase
//! JSON so downstream consumers can decode it without this crate.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::request::{Drop, ReportCommon, ReportMetadata};

/// Length of the random suffix appended to the request trace id
pub const TASK_ID_SUFFIX_LEN: usize = 16;

/// One stage run within a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleReport {
    pub stage_id: String,
    pub drops: Vec<Drop>,
    /// Number of runs this report stands for
    pub times: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ReportMetadata>,
}

impl SingleReport {
    pub fn new(stage_id: String, drops: Vec<Drop>, metadata: Option<ReportMetadata>) -> Self {
        Self {
            stage_id,
            drops,
            times: 1,
            metadata,
        }
    }
}

/// A queued submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTask {
    pub task_id: String,
    /// Unix microseconds
    pub created_at: i64,
    #[serde(flatten)]
    pub common: ReportCommon,
    pub reports: Vec<SingleReport>,
    pub account_id: i64,
    pub ip: String,
}

impl ReportTask {
    /// Assemble a task stamped with the current time
    pub fn assemble(
        task_id: String,
        common: ReportCommon,
        reports: Vec<SingleReport>,
        account_id: i64,
        ip: String,
    ) -> Self {
        Self {
            task_id,
            created_at: chrono::Utc::now().timestamp_micros(),
            common,
            reports,
            account_id,
            ip,
        }
    }

    pub fn to_bytes(&self) -> Result<bytes::Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

/// `<request-trace-id>-<16 random alphanumerics>`
pub fn generate_task_id(request_id: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TASK_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}", request_id, suffix)
}
