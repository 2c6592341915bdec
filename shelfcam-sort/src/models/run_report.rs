//! Reports produced by the workflow phases

use crate::models::classification::BoxClassification;
use crate::services::video_renderer::RenderedVideos;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Where one batch went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", rename_all = "snake_case")]
pub enum BatchDisposition {
    /// Became a new experiment
    CreatedExperiment { experiment: String, images: usize },
    /// Appended to an existing experiment
    AppendedExperiment {
        experiment: String,
        first_sequence: u64,
        last_sequence: u64,
    },
    /// Routed to junk or junk review
    Junk { path: PathBuf },
}

/// One classified batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub batch: String,
    pub classification: BoxClassification,
    pub disposition: BatchDisposition,
}

/// Summary of sorting one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub run_name: String,
    pub batch_size: usize,
    pub batches: Vec<BatchRecord>,
    /// Images that did not fill a whole batch
    pub remainder: usize,
    /// Files without a parseable capture sequence (left in place)
    pub skipped: usize,
    /// Batches left by an interrupted attempt and classified this time
    pub resumed: usize,
    /// Leftover captures pulled in from the previous run
    pub carried_in: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(run_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            run_name: run_name.into(),
            batch_size: 0,
            batches: Vec::new(),
            remainder: 0,
            skipped: 0,
            resumed: 0,
            carried_in: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn identified(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b.classification, BoxClassification::Identified { .. }))
            .count()
    }

    pub fn unreadable(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b.classification, BoxClassification::Unreadable { .. }))
            .count()
    }

    pub fn not_found(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b.classification, BoxClassification::NotFound))
            .count()
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

/// One experiment moved to the finished store
#[derive(Debug, Clone, Serialize)]
pub struct Promotion {
    pub experiment: String,
    pub images: usize,
    pub videos: Option<RenderedVideos>,
    pub render_error: Option<String>,
}

/// Outcome of a lifecycle promotion pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromotionReport {
    pub promoted: Vec<Promotion>,
    /// Experiments that grew since the snapshot
    pub growing: Vec<String>,
    /// Stalled experiments still inside their grace period (name, stalled runs)
    pub waiting: Vec<(String, u32)>,
    /// Experiments whose finished folder already exists
    pub conflicts: Vec<String>,
}

/// Outcome of reconciling the re-merge holding area
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Moved in wholesale as new experiments
    pub created: Vec<String>,
    /// Appended to existing experiments (name, images added)
    pub appended: Vec<(String, usize)>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.appended.is_empty()
    }
}

/// Entries deleted by the janitor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JanitorReport {
    pub junk_removed: usize,
    pub review_removed: usize,
    pub re_merge_removed: usize,
}
