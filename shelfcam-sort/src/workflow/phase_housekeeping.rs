//! HOUSEKEEPING phase
//!
//! Store setup, re-merge reconciliation and junk purging.

use super::SortPipeline;
use crate::error::SortResult;
use crate::models::{JanitorReport, ReconcileReport};

impl SortPipeline {
    /// Create any missing store directories
    pub fn prepare(&self) -> SortResult<()> {
        self.ctx.layout.ensure(self.store.as_ref())?;
        Ok(())
    }

    /// Merge operator corrections from `junk_review/re_merge/`
    ///
    /// Must run before [`SortPipeline::clear_junk`], which empties the
    /// holding area.
    pub fn reconcile(&self) -> SortResult<ReconcileReport> {
        self.merger.reconcile()
    }

    pub fn clear_junk(&self) -> SortResult<JanitorReport> {
        self.janitor.clear()
    }

    /// Junk-review batches waiting for an operator
    pub fn review_pending(&self) -> SortResult<usize> {
        self.janitor.review_pending()
    }
}
