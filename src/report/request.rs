//! Report submission payloads
//!
//! Shapes accepted on the HTTP surface and the normalized records that
//! flow through the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::drop_type::DropType;

/// Game server region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Server {
    CN,
    US,
    JP,
    KR,
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CN => "CN",
            Self::US => "US",
            Self::JP => "JP",
            Self::KR => "KR",
        };
        f.write_str(s)
    }
}

/// Free-form client metadata attached to a report (file name, md5, ...)
pub type ReportMetadata = BTreeMap<String, serde_json::Value>;

/// A drop as reported by the client, keyed by the game's own item id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArkDrop {
    pub drop_type: String,
    pub item_id: String,
    pub quantity: i64,
}

impl ArkDrop {
    pub fn new(drop_type: &str, item_id: &str, quantity: i64) -> Self {
        Self {
            drop_type: drop_type.to_string(),
            item_id: item_id.to_string(),
            quantity,
        }
    }
}

/// A drop after vocabulary mapping and item resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drop {
    pub drop_type: DropType,
    pub item_id: i64,
    pub quantity: i64,
}

/// Client, server and version shared by every report in a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCommon {
    pub server: Server,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub version: String,
}

/// `POST /report`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleReportRequest {
    #[serde(flatten)]
    pub common: ReportCommon,
    pub stage_id: String,
    #[serde(default)]
    pub drops: Vec<ArkDrop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ReportMetadata>,
}

/// One stage run inside a batch submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDropElement {
    pub stage_id: String,
    #[serde(default)]
    pub drops: Vec<ArkDrop>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ReportMetadata>,
}

/// `POST /report/batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReportRequest {
    #[serde(flatten)]
    pub common: ReportCommon,
    pub batch_drops: Vec<BatchDropElement>,
}

/// `POST /report/recall`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallRequest {
    pub report_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_request_decodes_camel_case() {
        let json = r#"{
            "server": "CN",
            "stageId": "main_01-07",
            "source": "MeoAssistant",
            "version": "v4.0.0",
            "drops": [{"dropType": "NORMAL_DROP", "itemId": "30012", "quantity": 2}],
            "metadata": {"md5": "abc"}
        }"#;
        let req: SingleReportRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.common.server, Server::CN);
        assert_eq!(req.stage_id, "main_01-07");
        assert_eq!(req.drops, vec![ArkDrop::new("NORMAL_DROP", "30012", 2)]);
        assert_eq!(req.metadata.unwrap()["md5"], "abc");
    }

    #[test]
    fn test_unknown_server_rejected() {
        let json = r#"{"server": "TW", "stageId": "main_01-07", "drops": []}"#;
        assert!(serde_json::from_str::<SingleReportRequest>(json).is_err());
    }

    #[test]
    fn test_batch_request_decodes() {
        let json = r#"{
            "server": "US",
            "source": "frontend-v2",
            "version": "v3.4.0",
            "batchDrops": [
                {"stageId": "a", "drops": []},
                {"stageId": "b", "drops": [{"dropType": "EXTRA_DROP", "itemId": "x", "quantity": 1}]}
            ]
        }"#;
        let req: BatchReportRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.batch_drops.len(), 2);
        assert_eq!(req.batch_drops[1].drops[0].drop_type, "EXTRA_DROP");
    }
}
