//! Lifecycle tracker
//!
//! Decides when an experiment is finished. Image counts are snapshotted
//! before a run merges anything; an experiment whose count did not change
//! during the run has stalled. After `grace_runs` consecutive stalled runs it
//! is moved to the finished store and rendered to video.
//!
//! With a grace period of one run the decision needs only the snapshot. Longer
//! grace periods keep per-experiment stall counters in a JSON ledger.

use crate::error::SortResult;
use crate::models::{Promotion, PromotionReport};
use crate::services::video_renderer::VideoRenderer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelfcam_common::{ContentStore, Error as StoreError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Image count per current experiment at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExperimentSnapshot {
    pub counts: BTreeMap<String, usize>,
}

impl ExperimentSnapshot {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Stall bookkeeping for one experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub last_count: usize,
    pub stalled_runs: u32,
    pub updated_at: DateTime<Utc>,
}

/// Persistent stall counters (`lifecycle.json`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleLedger {
    #[serde(default)]
    pub experiments: BTreeMap<String, LedgerEntry>,
}

/// Lifecycle store locations
#[derive(Debug, Clone)]
pub struct LifecyclePaths {
    pub current: PathBuf,
    pub finished: PathBuf,
    pub ledger: PathBuf,
}

/// Promotes stalled experiments to the finished store
pub struct LifecycleTracker {
    store: Arc<dyn ContentStore>,
    renderer: Arc<dyn VideoRenderer>,
    paths: LifecyclePaths,
    grace_runs: u32,
}

impl LifecycleTracker {
    pub fn new(
        store: Arc<dyn ContentStore>,
        renderer: Arc<dyn VideoRenderer>,
        paths: LifecyclePaths,
        grace_runs: u32,
    ) -> Self {
        Self {
            store,
            renderer,
            paths,
            grace_runs: grace_runs.max(1),
        }
    }

    /// Count the images of every current experiment
    pub fn snapshot(&self) -> SortResult<ExperimentSnapshot> {
        let mut snapshot = ExperimentSnapshot::default();
        for entry in self.store.list_or_empty(&self.paths.current)? {
            if !entry.is_dir() {
                continue;
            }
            let count = self.store.count_files(&self.paths.current.join(&entry.name))?;
            snapshot.counts.insert(entry.name, count);
        }
        debug!(experiments = snapshot.len(), "Experiment snapshot taken");
        Ok(snapshot)
    }

    /// Promote snapshotted experiments that have stalled long enough
    pub fn promote(
        &self,
        snapshot: &ExperimentSnapshot,
        stabilize: bool,
    ) -> SortResult<PromotionReport> {
        let mut report = PromotionReport::default();
        let mut ledger = if self.grace_runs > 1 {
            self.load_ledger()?
        } else {
            LifecycleLedger::default()
        };

        for (name, &before) in &snapshot.counts {
            let dir = self.paths.current.join(name);
            if !self.store.is_dir(&dir) {
                debug!(experiment = %name, "Experiment left the current store since snapshot");
                ledger.experiments.remove(name);
                continue;
            }

            let now = self.store.count_files(&dir)?;
            if now != before {
                debug!(experiment = %name, before, now, "Experiment still growing");
                ledger.experiments.insert(
                    name.clone(),
                    LedgerEntry {
                        last_count: now,
                        stalled_runs: 0,
                        updated_at: Utc::now(),
                    },
                );
                report.growing.push(name.clone());
                continue;
            }

            let stalled_runs = ledger
                .experiments
                .get(name)
                .filter(|entry| entry.last_count == now)
                .map(|entry| entry.stalled_runs)
                .unwrap_or(0)
                + 1;

            if stalled_runs < self.grace_runs {
                info!(
                    experiment = %name,
                    stalled_runs,
                    grace_runs = self.grace_runs,
                    "Experiment stalled, waiting for grace period"
                );
                ledger.experiments.insert(
                    name.clone(),
                    LedgerEntry {
                        last_count: now,
                        stalled_runs,
                        updated_at: Utc::now(),
                    },
                );
                report.waiting.push((name.clone(), stalled_runs));
                continue;
            }

            match self.finish(name, now, stabilize)? {
                Some(promotion) => {
                    ledger.experiments.remove(name);
                    report.promoted.push(promotion);
                }
                None => report.conflicts.push(name.clone()),
            }
        }

        if self.grace_runs > 1 {
            self.save_ledger(&ledger)?;
        }

        info!(
            promoted = report.promoted.len(),
            growing = report.growing.len(),
            waiting = report.waiting.len(),
            conflicts = report.conflicts.len(),
            "Lifecycle promotion finished"
        );
        Ok(report)
    }

    /// Promote every current experiment regardless of growth
    pub fn transfer_all(&self, stabilize: bool) -> SortResult<PromotionReport> {
        let snapshot = self.snapshot()?;
        let mut report = PromotionReport::default();
        let mut ledger = self.load_ledger()?;

        for (name, &images) in &snapshot.counts {
            match self.finish(name, images, stabilize)? {
                Some(promotion) => {
                    ledger.experiments.remove(name);
                    report.promoted.push(promotion);
                }
                None => report.conflicts.push(name.clone()),
            }
        }

        if self.store.exists(&self.paths.ledger) {
            self.save_ledger(&ledger)?;
        }

        info!(promoted = report.promoted.len(), "All current experiments transferred");
        Ok(report)
    }

    /// Move one experiment to the finished store and render it
    ///
    /// `None` when a finished experiment of the same name already exists.
    fn finish(&self, name: &str, images: usize, stabilize: bool) -> SortResult<Option<Promotion>> {
        let finished = self.paths.finished.join(name);
        if self.store.exists(&finished) {
            warn!(
                experiment = name,
                finished = %finished.display(),
                "Finished experiment already exists, leaving current copy in place"
            );
            return Ok(None);
        }

        self.store.create_dir_all(&self.paths.finished)?;
        self.store.rename(&self.paths.current.join(name), &finished)?;
        info!(experiment = name, images, "Experiment finished");

        let (videos, render_error) = match self.renderer.render(&finished, name, stabilize) {
            Ok(videos) => (Some(videos), None),
            Err(e) => {
                error!(experiment = name, error = %e, "Video rendering failed");
                (None, Some(e.to_string()))
            }
        };

        Ok(Some(Promotion {
            experiment: name.to_string(),
            images,
            videos,
            render_error,
        }))
    }

    /// Read the ledger; a missing file is an empty ledger
    pub fn load_ledger(&self) -> SortResult<LifecycleLedger> {
        load_ledger(self.store.as_ref(), &self.paths.ledger)
    }

    fn save_ledger(&self, ledger: &LifecycleLedger) -> SortResult<()> {
        if let Some(parent) = self.paths.ledger.parent() {
            self.store.create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(ledger).map_err(StoreError::from)?;
        self.store.write(&self.paths.ledger, &json)?;
        Ok(())
    }
}

fn load_ledger(store: &dyn ContentStore, path: &Path) -> SortResult<LifecycleLedger> {
    if !store.exists(path) {
        return Ok(LifecycleLedger::default());
    }
    let bytes = store.read(path)?;
    match serde_json::from_slice(&bytes) {
        Ok(ledger) => Ok(ledger),
        Err(e) => {
            warn!(ledger = %path.display(), error = %e, "Corrupt lifecycle ledger, starting fresh");
            Ok(LifecycleLedger::default())
        }
    }
}
