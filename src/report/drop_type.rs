//! Drop type vocabulary
//!
//! Clients report drops with an external drop type string. Storage only
//! knows three internal categories. The table is fixed at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal drop category as stored downstream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropType {
    Regular,
    Special,
    Extra,
}

impl DropType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "REGULAR",
            Self::Special => "SPECIAL",
            Self::Extra => "EXTRA",
        }
    }
}

impl fmt::Display for DropType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External drop type -> internal category. Must not be modified at runtime.
const DROP_TYPE_MAP: &[(&str, DropType)] = &[
    ("REGULAR_DROP", DropType::Regular),
    ("NORMAL_DROP", DropType::Regular),
    ("SPECIAL_DROP", DropType::Special),
    ("EXTRA_DROP", DropType::Extra),
];

/// Keys listed in validation error messages, in display order
pub const DROP_TYPE_KEYS: &[&str] = &["REGULAR_DROP", "NORMAL_DROP", "SPECIAL_DROP", "EXTRA_DROP"];

/// Map an external drop type to its internal category
pub fn map_drop_type(external: &str) -> Option<DropType> {
    DROP_TYPE_MAP
        .iter()
        .find(|(key, _)| *key == external)
        .map(|(_, internal)| *internal)
}

/// Error message fragment naming the accepted drop types
pub fn valid_drop_types() -> String {
    DROP_TYPE_KEYS.join(", ")
}
