//! Bucket keys and matrix delta segments
//!
//! A bucket key names either a stage or an item, never both. The same type
//! names the coordinate an element changes.

use std::fmt;

use crate::types::{DroplineError, Result};

/// Stage id or item id, exactly one
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BucketKey {
    StageId(String),
    ItemId(String),
}

impl BucketKey {
    pub fn stage(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DroplineError::Protocol("empty stage id".into()));
        }
        Ok(Self::StageId(id))
    }

    pub fn item(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(DroplineError::Protocol("empty item id".into()));
        }
        Ok(Self::ItemId(id))
    }

    /// Build from the two optional selector fields used on the wire
    pub fn from_selector(stage_id: Option<String>, item_id: Option<String>) -> Result<Self> {
        match (stage_id, item_id) {
            (Some(stage), None) => Self::stage(stage),
            (None, Some(item)) => Self::item(item),
            (Some(_), Some(_)) => Err(DroplineError::Protocol(
                "selector sets both stage id and item id".into(),
            )),
            (None, None) => Err(DroplineError::Protocol(
                "selector sets neither stage id nor item id".into(),
            )),
        }
    }

    /// Split into `(stage_id, item_id)` selector fields
    pub fn to_selector(&self) -> (Option<String>, Option<String>) {
        match self {
            Self::StageId(id) => (Some(id.clone()), None),
            Self::ItemId(id) => (None, Some(id.clone())),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::StageId(id) | Self::ItemId(id) => id,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageId(id) => write!(f, "stage:{}", id),
            Self::ItemId(id) => write!(f, "item:{}", id),
        }
    }
}

/// "This coordinate changed by `amount` since the last update"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixElement {
    pub coordinate: BucketKey,
    pub amount: i64,
}

impl MatrixElement {
    pub fn new(coordinate: BucketKey, amount: i64) -> Self {
        Self { coordinate, amount }
    }
}

/// Deltas for one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixSegment {
    pub bucket: BucketKey,
    pub elements: Vec<MatrixElement>,
}

impl MatrixSegment {
    pub fn new(bucket: BucketKey, elements: Vec<MatrixElement>) -> Self {
        Self { bucket, elements }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_exactly_one() {
        assert_eq!(
            BucketKey::from_selector(Some("main_01-07".into()), None).unwrap(),
            BucketKey::StageId("main_01-07".into())
        );
        assert_eq!(
            BucketKey::from_selector(None, Some("30012".into())).unwrap(),
            BucketKey::ItemId("30012".into())
        );
        assert!(BucketKey::from_selector(Some("a".into()), Some("b".into())).is_err());
        assert!(BucketKey::from_selector(None, None).is_err());
    }

    #[test]
    fn test_empty_ids_rejected() {
        assert!(BucketKey::stage("").is_err());
        assert!(BucketKey::item("").is_err());
        assert!(BucketKey::from_selector(Some(String::new()), None).is_err());
    }

    #[test]
    fn test_selector_split() {
        let key = BucketKey::item("30012").unwrap();
        assert_eq!(key.to_selector(), (None, Some("30012".into())));
        assert_eq!(key.id(), "30012");
        assert_eq!(key.to_string(), "item:30012");
    }
}
