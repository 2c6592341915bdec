//! SORTING phase
//!
//! Batches an extracted run, classifies every batch and sends it to its
//! destination:
//! - Identified → merged into `current_exp/<id>`
//! - Unreadable → `junk_review/<batch>_<run>_<crop sum>`
//! - NotFound → `junk_exp/<batch>_<run>_0`
//!
//! Trailing images that do not fill a batch are handled by the configured
//! remainder policy, then the drained run directories are removed. Batches
//! already present from an interrupted attempt are classified along with the
//! new ones.

use super::SortPipeline;
use crate::error::{SortError, SortResult};
use crate::models::{
    BatchDisposition, BatchRecord, BoxClassification, JunkReason, RemainderPolicy, RunReport,
};
use crate::services::MergeOutcome;
use shelfcam_common::Error as StoreError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl SortPipeline {
    /// Batch, identify and route the extracted run `run_name`
    ///
    /// Every numbered batch under `sorted_unlabeled/<run>/` is classified,
    /// including batches left there by an interrupted attempt. The unsorted
    /// run directory may already be gone when only such batches remain.
    pub fn batch_and_identify(&mut self, run_name: &str, shelf_count: u32) -> SortResult<RunReport> {
        let run_dir = self.ctx.layout.unsorted_run(run_name);
        let sorted_dir = self.ctx.layout.sorted_run(run_name);
        let has_run = self.store.is_dir(&run_dir);
        if !has_run && !self.store.is_dir(&sorted_dir) {
            return Err(StoreError::NotFound(run_dir).into());
        }

        let mut report = RunReport::new(run_name);
        report.batch_size = self.ctx.params.boxes_per_shelf as usize * shelf_count as usize;
        let mut created = 0;
        let mut remainder = Vec::new();

        if has_run {
            report.carried_in = self.pull_carried(run_name, &run_dir)?;
            let outcome = self.batcher.batch(&run_dir, &sorted_dir, shelf_count)?;
            report.batch_size = outcome.batch_size;
            report.remainder = outcome.remainder.len();
            report.skipped = outcome.skipped.len();
            created = outcome.batches.len();
            remainder = outcome.remainder;
        }

        let pending = self.batcher.pending_batches(&sorted_dir)?;
        report.resumed = pending.len().saturating_sub(created);
        if report.resumed > 0 {
            warn!(
                run = run_name,
                resumed = report.resumed,
                "Classifying batches left by an interrupted run"
            );
        }

        for batch_dir in &pending {
            let batch = batch_label(batch_dir)?;
            let classification = self.identifier.identify(batch_dir)?;

            let disposition = match &classification {
                BoxClassification::Identified { experiment_id } => {
                    let experiment = experiment_id.to_string();
                    match self.merger.merge(batch_dir, *experiment_id)? {
                        MergeOutcome::Created { images } => {
                            BatchDisposition::CreatedExperiment { experiment, images }
                        }
                        MergeOutcome::Appended {
                            first_sequence,
                            last_sequence,
                            ..
                        } => BatchDisposition::AppendedExperiment {
                            experiment,
                            first_sequence,
                            last_sequence,
                        },
                    }
                }
                failed => {
                    let path = self.route_junk(batch_dir, &batch, run_name, failed)?;
                    BatchDisposition::Junk { path }
                }
            };

            report.batches.push(BatchRecord {
                batch,
                classification,
                disposition,
            });
        }

        if has_run {
            self.apply_remainder_policy(run_name, &run_dir, &remainder)?;
        }
        self.remove_if_empty(&sorted_dir)?;

        report.finish();
        info!(
            run = run_name,
            batches = report.batches.len(),
            identified = report.identified(),
            unreadable = report.unreadable(),
            not_found = report.not_found(),
            remainder = report.remainder,
            "Run sorted"
        );
        match serde_json::to_string(&report) {
            Ok(json) => debug!(report = %json, "Run report"),
            Err(e) => warn!(error = %e, "Run report not serializable"),
        }

        Ok(report)
    }

    /// Move a failed batch into junk or junk review
    fn route_junk(
        &self,
        batch_dir: &Path,
        batch: &str,
        run_name: &str,
        classification: &BoxClassification,
    ) -> SortResult<PathBuf> {
        let reason = classification.junk_reason().ok_or_else(|| {
            SortError::InvalidParameter("identified batch routed to junk".to_string())
        })?;
        let root = match reason {
            JunkReason::Unreadable => &self.ctx.layout.junk_review,
            JunkReason::NotFound => &self.ctx.layout.junk,
        };

        let target = root.join(format!(
            "{}_{}_{}",
            batch,
            run_name,
            classification.diagnostic()
        ));
        self.store.create_dir_all(root)?;
        self.store.rename(batch_dir, &target)?;

        match reason {
            JunkReason::Unreadable => warn!(
                batch,
                review = %target.display(),
                "QR code exists but could not be read, see junk review"
            ),
            JunkReason::NotFound => info!(
                batch,
                junk = %target.display(),
                "QR code not found, box may be a placeholder or missing"
            ),
        }
        Ok(target)
    }

    fn apply_remainder_policy(
        &self,
        run_name: &str,
        run_dir: &Path,
        remainder: &[PathBuf],
    ) -> SortResult<()> {
        match self.ctx.params.remainder_policy {
            RemainderPolicy::Drop => {
                if !remainder.is_empty() {
                    warn!(
                        run = run_name,
                        dropped = remainder.len(),
                        "Dropping images that do not fill a batch"
                    );
                }
                self.store.remove_all(run_dir)?;
            }
            RemainderPolicy::Carry => {
                if !remainder.is_empty() {
                    let carried = &self.ctx.layout.carried;
                    self.store.create_dir_all(carried)?;
                    for image in remainder {
                        let name = image
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default();
                        self.store
                            .rename(image, &carried.join(format!("{}-{}", run_name, name)))?;
                    }
                    warn!(
                        run = run_name,
                        carried = remainder.len(),
                        "Carrying images that do not fill a batch into the next run"
                    );
                }
                self.remove_if_empty(run_dir)?;
            }
            RemainderPolicy::Quarantine => {
                if !remainder.is_empty() {
                    let partial = self.ctx.layout.partial.join(run_name);
                    self.store.create_dir_all(&partial)?;
                    for image in remainder {
                        self.store.move_into(image, &partial)?;
                    }
                    warn!(
                        run = run_name,
                        quarantined = remainder.len(),
                        dir = %partial.display(),
                        "Quarantined images that do not fill a batch"
                    );
                }
                self.store.remove_all(run_dir)?;
            }
        }
        Ok(())
    }

    /// Move captures carried over from earlier runs into `run_dir`
    ///
    /// They keep their modification times, so they batch ahead of this run's
    /// own captures.
    fn pull_carried(&self, run_name: &str, run_dir: &Path) -> SortResult<usize> {
        let carried = &self.ctx.layout.carried;
        let mut pulled = 0;
        for entry in self.store.list_or_empty(carried)? {
            if !entry.is_file() {
                continue;
            }
            self.store.move_into(&carried.join(&entry.name), run_dir)?;
            pulled += 1;
        }
        if pulled > 0 {
            info!(run = run_name, images = pulled, "Carried-over images added to run");
        }
        Ok(pulled)
    }

    fn remove_if_empty(&self, dir: &Path) -> SortResult<()> {
        if !self.store.is_dir(dir) {
            return Ok(());
        }
        if self.store.list(dir)?.is_empty() {
            self.store.remove_all(dir)?;
        } else {
            warn!(dir = %dir.display(), "Directory not empty after sorting, leaving it");
        }
        Ok(())
    }
}

/// Batch directory name (its 1-based index)
fn batch_label(batch_dir: &Path) -> SortResult<String> {
    batch_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            SortError::InvalidParameter(format!("batch path has no name: {}", batch_dir.display()))
        })
}
