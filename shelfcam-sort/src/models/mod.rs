//! Data models for the sorting workflow

pub mod classification;
pub mod parameters;
pub mod run_report;

pub use classification::{BoxClassification, JunkReason};
pub use parameters::{RemainderPolicy, SortParameters};
pub use run_report::{
    BatchDisposition, BatchRecord, JanitorReport, Promotion, PromotionReport, ReconcileReport,
    RunReport,
};
