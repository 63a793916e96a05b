//! Drop report intake
//!
//! Turns client submissions into queued report tasks:
//!
//! - `normalize`: drop type validation, merging, item resolution
//! - `gachabox`: pull counting for gachabox stages
//! - `mitigation`: time-boxed stage id fix for one legacy client
//! - `task`: the queued record and its id
//! - `pipeline`: orchestration and recall

pub mod context;
pub mod drop_type;
pub mod gachabox;
pub mod mitigation;
pub mod normalize;
pub mod pipeline;
pub mod request;
pub mod task;

pub use context::RequestContext;
pub use drop_type::DropType;
pub use pipeline::{RecallOutcome, ReportPipeline, ReportServices};
pub use request::{
    ArkDrop, BatchDropElement, BatchReportRequest, Drop, RecallRequest, ReportCommon,
    SingleReportRequest, Server,
};
pub use task::{ReportTask, SingleReport};
