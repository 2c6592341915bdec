//! PROMOTION phase
//!
//! Lifecycle decisions run against a snapshot taken before the run merged
//! anything, so an experiment that received images this run is never
//! finished in the same run.

use super::SortPipeline;
use crate::error::SortResult;
use crate::models::PromotionReport;
use crate::services::ExperimentSnapshot;

impl SortPipeline {
    /// Image count per current experiment
    pub fn snapshot(&self) -> SortResult<ExperimentSnapshot> {
        self.lifecycle.snapshot()
    }

    /// Finish experiments that did not grow since `snapshot`
    pub fn merge_and_promote(
        &self,
        snapshot: &ExperimentSnapshot,
        stabilize: bool,
    ) -> SortResult<PromotionReport> {
        self.lifecycle.promote(snapshot, stabilize)
    }

    /// Finish every current experiment
    pub fn transfer_all(&self, stabilize: bool) -> SortResult<PromotionReport> {
        self.lifecycle.transfer_all(stabilize)
    }
}
