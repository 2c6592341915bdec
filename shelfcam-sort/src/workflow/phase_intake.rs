//! INTAKE phase

use super::SortPipeline;
use crate::error::SortResult;
use crate::services::StagedRun;

impl SortPipeline {
    /// Earliest staged run archive, if any
    pub fn next_staged_run(&self) -> SortResult<Option<StagedRun>> {
        let mut runs = self.intake.staged_runs()?;
        if runs.len() > 1 {
            tracing::info!(
                waiting = runs.len() - 1,
                "More run archives staged, processing the earliest"
            );
        }
        Ok(if runs.is_empty() {
            None
        } else {
            Some(runs.remove(0))
        })
    }
}
