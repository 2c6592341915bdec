//! Experiment merger
//!
//! Folds identified batches into the per-experiment image stores.
//!
//! An experiment directory holds images prefixed `00000001..N` with no gaps.
//! New images are appended after the highest existing prefix, keeping their
//! timestamp suffix, and nothing already in the experiment is ever replaced.
//! The same renumbering reconciles operator corrections dropped into the
//! `junk_review/re_merge/<experiment id>/` holding area.

use crate::error::SortResult;
use crate::models::ReconcileReport;
use shelfcam_common::naming::ImageName;
use shelfcam_common::{ContentStore, Error as StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a merge did to the target experiment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The batch became a new experiment
    Created { images: usize },
    /// Images appended with prefixes `first_sequence..=last_sequence`
    Appended {
        images: usize,
        first_sequence: u64,
        last_sequence: u64,
    },
}

/// Appends batches into experiment accumulators
pub struct ExperimentMerger {
    store: Arc<dyn ContentStore>,
    experiments: PathBuf,
    re_merge: PathBuf,
}

impl ExperimentMerger {
    /// `experiments` is the current-experiment store, `re_merge` the holding area
    pub fn new(store: Arc<dyn ContentStore>, experiments: PathBuf, re_merge: PathBuf) -> Self {
        Self {
            store,
            experiments,
            re_merge,
        }
    }

    /// Merge the batch in `batch_dir` into experiment `experiment_id`
    pub fn merge(&self, batch_dir: &Path, experiment_id: u64) -> SortResult<MergeOutcome> {
        self.merge_named(batch_dir, &experiment_id.to_string())
    }

    /// Merge `source_dir` into the experiment directory called `name`
    pub fn merge_named(&self, source_dir: &Path, name: &str) -> SortResult<MergeOutcome> {
        let target = self.experiments.join(name);

        if !self.store.exists(&target) {
            self.store.create_dir_all(&self.experiments)?;
            self.store.rename(source_dir, &target)?;
            let images = self.store.count_files(&target)?;
            info!(experiment = name, images, "New experiment created");
            return Ok(MergeOutcome::Created { images });
        }

        let base = self.highest_sequence(&target)?;
        let incoming = self.incoming_images(source_dir)?;

        let moves: Vec<(PathBuf, PathBuf)> = incoming
            .iter()
            .enumerate()
            .map(|(rank, (path, image))| {
                let renamed = image.with_sequence(base + rank as u64 + 1);
                (path.clone(), target.join(renamed.file_name()))
            })
            .collect();

        // Refuse the whole merge before touching anything if a target is taken
        if let Some((_, taken)) = moves.iter().find(|(_, to)| self.store.exists(to)) {
            return Err(StoreError::AlreadyExists(taken.clone()).into());
        }

        for (from, to) in &moves {
            self.store.rename(from, to)?;
        }

        if self.store.list(source_dir)?.is_empty() {
            self.store.remove_all(source_dir)?;
        } else {
            warn!(
                source = %source_dir.display(),
                "Source left with unmergeable files after merge"
            );
        }

        let images = moves.len();
        info!(
            experiment = name,
            appended = images,
            total = base as usize + images,
            "Batch appended to experiment"
        );

        Ok(MergeOutcome::Appended {
            images,
            first_sequence: base + 1,
            last_sequence: base + images as u64,
        })
    }

    /// Merge every entry of the re-merge holding area
    ///
    /// A missing or empty holding area is a no-op.
    pub fn reconcile(&self) -> SortResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        if !self.store.is_dir(&self.re_merge) {
            debug!(dir = %self.re_merge.display(), "No re-merge area");
            return Ok(report);
        }

        for entry in self.store.list(&self.re_merge)? {
            if !entry.is_dir() {
                warn!(entry = %entry.name, "Ignoring non-directory in re-merge area");
                continue;
            }

            let source = self.re_merge.join(&entry.name);
            match self.merge_named(&source, &entry.name)? {
                MergeOutcome::Created { .. } => report.created.push(entry.name),
                MergeOutcome::Appended { images, .. } => report.appended.push((entry.name, images)),
            }
        }

        if !report.is_empty() {
            info!(
                created = report.created.len(),
                appended = report.appended.len(),
                "Re-merge area reconciled"
            );
        }

        Ok(report)
    }

    /// Highest sequence prefix in an experiment (0 when empty)
    fn highest_sequence(&self, experiment: &Path) -> SortResult<u64> {
        let mut highest = 0;
        for entry in self.store.list(experiment)? {
            if !entry.is_file() {
                continue;
            }
            match ImageName::parse(&entry.name) {
                Ok(image) => highest = highest.max(image.sequence),
                Err(e) => warn!(
                    experiment = %experiment.display(),
                    error = %e,
                    "Unexpected file in experiment"
                ),
            }
        }
        Ok(highest)
    }

    /// Sequenced images of `source`, ordered by their current prefix
    fn incoming_images(&self, source: &Path) -> SortResult<Vec<(PathBuf, ImageName)>> {
        let mut images = Vec::new();
        for entry in self.store.list(source)? {
            if !entry.is_file() {
                continue;
            }
            match ImageName::parse(&entry.name) {
                Ok(image) => images.push((source.join(&entry.name), image)),
                Err(e) => warn!(source = %source.display(), error = %e, "Skipping file"),
            }
        }
        images.sort_by(|(a_path, a), (b_path, b)| {
            a.sequence.cmp(&b.sequence).then_with(|| a_path.cmp(b_path))
        });
        Ok(images)
    }
}
