//! Store layout for one robot
//!
//! Resolves every named directory the pipeline uses from the install root and
//! the robot identifier. Staging, archive and video stores are shared by all
//! robots; everything under `master_data` is per robot.
//!
//! ```text
//! <root>/data/unsorted_unlabeled_zipped/        staging (uploaded run zips)
//! <root>/data/unsorted_unlabeled_processed/     archive (extracted run zips)
//! <root>/data/<robot>/master_data/unsorted_unlabeled/<run>/
//! <root>/data/<robot>/master_data/sorted_unlabeled/<run>/<batch>/
//! <root>/data/<robot>/master_data/current_exp/<experiment>/
//! <root>/data/<robot>/master_data/finished_exp/<experiment>/
//! <root>/data/<robot>/master_data/junk_exp/
//! <root>/data/<robot>/master_data/junk_review/re_merge/
//! <root>/data/<robot>/master_data/partial_batches/<run>/
//! <root>/data/<robot>/master_data/carried_over/
//! <root>/data/<robot>/lifecycle.json
//! <root>/data/videos/{unstabilized,stabilized}/
//! ```

use crate::store::ContentStore;
use crate::Result;
use std::path::{Path, PathBuf};

/// Name of the operator-approved corrections folder inside junk review
pub const RE_MERGE_DIR: &str = "re_merge";

/// Resolved directory set for one robot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    pub install_root: PathBuf,
    pub robot: String,
    pub staging: PathBuf,
    pub archive: PathBuf,
    pub unsorted: PathBuf,
    pub sorted: PathBuf,
    pub current_exp: PathBuf,
    pub finished_exp: PathBuf,
    pub junk: PathBuf,
    pub junk_review: PathBuf,
    pub re_merge: PathBuf,
    pub partial: PathBuf,
    /// Leftover captures waiting for the next run's batching
    pub carried: PathBuf,
    pub lifecycle_ledger: PathBuf,
    pub unstabilized_videos: PathBuf,
    pub stabilized_videos: PathBuf,
}

impl StoreLayout {
    /// Build the layout for `robot_number` (`None` or empty → `robot`)
    pub fn new(install_root: impl Into<PathBuf>, robot_number: Option<&str>) -> Self {
        let install_root = install_root.into();
        let robot = Self::robot_dir_name(robot_number);

        let data = install_root.join("data");
        let robot_data = data.join(&robot);
        let master = robot_data.join("master_data");
        let junk_review = master.join("junk_review");

        Self {
            staging: data.join("unsorted_unlabeled_zipped"),
            archive: data.join("unsorted_unlabeled_processed"),
            unsorted: master.join("unsorted_unlabeled"),
            sorted: master.join("sorted_unlabeled"),
            current_exp: master.join("current_exp"),
            finished_exp: master.join("finished_exp"),
            junk: master.join("junk_exp"),
            re_merge: junk_review.join(RE_MERGE_DIR),
            junk_review,
            partial: master.join("partial_batches"),
            carried: master.join("carried_over"),
            lifecycle_ledger: robot_data.join("lifecycle.json"),
            unstabilized_videos: data.join("videos").join("unstabilized"),
            stabilized_videos: data.join("videos").join("stabilized"),
            install_root,
            robot,
        }
    }

    /// `robot` when no index is given, otherwise `robot<N>`
    pub fn robot_dir_name(robot_number: Option<&str>) -> String {
        match robot_number.map(str::trim) {
            Some(n) if !n.is_empty() => format!("robot{}", n),
            _ => "robot".to_string(),
        }
    }

    pub fn unsorted_run(&self, run_name: &str) -> PathBuf {
        self.unsorted.join(run_name)
    }

    pub fn sorted_run(&self, run_name: &str) -> PathBuf {
        self.sorted.join(run_name)
    }

    pub fn experiment(&self, name: &str) -> PathBuf {
        self.current_exp.join(name)
    }

    pub fn finished(&self, name: &str) -> PathBuf {
        self.finished_exp.join(name)
    }

    /// Every directory that must exist before a run starts
    pub fn directories(&self) -> Vec<&Path> {
        vec![
            &self.staging,
            &self.archive,
            &self.unsorted,
            &self.sorted,
            &self.current_exp,
            &self.finished_exp,
            &self.junk,
            &self.junk_review,
            &self.re_merge,
            &self.partial,
            &self.carried,
            &self.unstabilized_videos,
            &self.stabilized_videos,
        ]
    }

    /// Create any missing store directories
    pub fn ensure(&self, store: &dyn ContentStore) -> Result<()> {
        for dir in self.directories() {
            if !store.is_dir(dir) {
                tracing::debug!(dir = %dir.display(), "Creating store directory");
                store.create_dir_all(dir)?;
            }
        }
        Ok(())
    }
}
