//! act18d3 stage id compensation for MeoAssistant
//!
//! Until the cutoff, MeoAssistant reported the rerun stages of act18d3 with
//! the `_perm` suffix. Rewrites `act18d3_0<digit>_perm` to `_rep` for that
//! client only. Expires on its own once the cutoff passes.

use chrono::{DateTime, Utc};
use std::borrow::Cow;

/// 2022-06-08T20:00:00Z
pub const ACT18D3_CUTOFF_MILLIS: i64 = 1_654_718_400_000;

/// The only client this applies to
pub const ACT18D3_SOURCE: &str = "MeoAssistant";

const STAGE_PREFIX: &str = "act18d3_0";
const PERM_SUFFIX: &str = "_perm";
const REP_SUFFIX: &str = "_rep";

/// Return the corrected stage id, or the input unchanged
pub fn mitigate_act18d3<'a>(stage_id: &'a str, source: &str, now: DateTime<Utc>) -> Cow<'a, str> {
    if now.timestamp_millis() >= ACT18D3_CUTOFF_MILLIS || source != ACT18D3_SOURCE {
        return Cow::Borrowed(stage_id);
    }

    match stage_id
        .strip_prefix(STAGE_PREFIX)
        .and_then(|rest| rest.strip_suffix(PERM_SUFFIX))
    {
        Some(digit) if digit.len() == 1 && digit.as_bytes()[0].is_ascii_digit() => {
            Cow::Owned(format!("{}{}{}", STAGE_PREFIX, digit, REP_SUFFIX))
        }
        _ => Cow::Borrowed(stage_id),
    }
}
