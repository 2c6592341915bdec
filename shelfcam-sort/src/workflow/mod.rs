//! Sort workflow orchestrator
//!
//! Coordinates one sorter invocation through all phases.
//!
//! # Phase Progression
//! HOUSEKEEPING → INTAKE → SORTING → ARCHIVING → REVIEW GATE → PROMOTION
//!
//! - **HOUSEKEEPING**: reconcile operator corrections from `re_merge`, purge junk
//! - **INTAKE**: pick the earliest staged run archive and extract it
//! - **SORTING**: batch the run, identify each batch, merge or route to junk
//! - **ARCHIVING**: move the processed archive out of staging
//! - **REVIEW GATE**: stop before promotion while junk review has items
//! - **PROMOTION**: finish experiments that stopped growing and render videos
//!
//! Transfer mode (`--transfer`) runs HOUSEKEEPING and then promotes every
//! current experiment without processing a run.

use crate::context::SortContext;
use crate::error::SortResult;
use crate::models::{PromotionReport, RunReport};
use crate::services::{
    BarcodeDecoder, Batcher, BoxIdentifier, ExperimentMerger, FfmpegRenderer, Janitor,
    LifecyclePaths, LifecycleTracker, QrLocator, RqrrDecoder, RunIntake, VideoRenderer,
};
use shelfcam_common::{ContentStore, FsStore};
use std::sync::Arc;
use tracing::{info, warn};

mod phase_housekeeping;
mod phase_intake;
mod phase_promotion;
mod phase_sorting;

/// Options for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip run processing and promote every current experiment
    pub transfer_only: bool,
    /// Apply vid.stab stabilization when rendering
    pub stabilize: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            transfer_only: false,
            stabilize: true,
        }
    }
}

/// How an invocation ended
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Run sorted (if any) and promotion performed
    Completed {
        run: Option<RunReport>,
        promotion: PromotionReport,
    },
    /// Run sorted but junk review needs an operator; promotion skipped
    ReviewRequired { run: RunReport, pending: usize },
    /// Staging held no run archive
    NothingStaged,
}

impl RunOutcome {
    pub fn needs_review(&self) -> bool {
        matches!(self, RunOutcome::ReviewRequired { .. })
    }
}

/// Sort pipeline for one robot
pub struct SortPipeline {
    ctx: SortContext,
    store: Arc<dyn ContentStore>,
    intake: RunIntake,
    batcher: Batcher,
    identifier: BoxIdentifier,
    merger: ExperimentMerger,
    lifecycle: LifecycleTracker,
    janitor: Janitor,
}

impl SortPipeline {
    pub fn new(
        ctx: SortContext,
        store: Arc<dyn ContentStore>,
        locator: Arc<dyn QrLocator>,
        decoder: Arc<dyn BarcodeDecoder>,
        renderer: Arc<dyn VideoRenderer>,
    ) -> Self {
        let layout = &ctx.layout;

        let intake = RunIntake::new(
            store.clone(),
            layout.staging.clone(),
            layout.archive.clone(),
            layout.unsorted.clone(),
        );
        let batcher = Batcher::new(store.clone(), ctx.params.boxes_per_shelf);
        let identifier = BoxIdentifier::new(store.clone(), locator, decoder, &ctx.params);
        let merger = ExperimentMerger::new(
            store.clone(),
            layout.current_exp.clone(),
            layout.re_merge.clone(),
        );
        let lifecycle = LifecycleTracker::new(
            store.clone(),
            renderer,
            LifecyclePaths {
                current: layout.current_exp.clone(),
                finished: layout.finished_exp.clone(),
                ledger: layout.lifecycle_ledger.clone(),
            },
            ctx.params.grace_runs,
        );
        let janitor = Janitor::new(
            store.clone(),
            layout.junk.clone(),
            layout.junk_review.clone(),
        );

        Self {
            ctx,
            store,
            intake,
            batcher,
            identifier,
            merger,
            lifecycle,
            janitor,
        }
    }

    /// Pipeline over the real filesystem with the configured locator,
    /// the built-in QR decoder and the `ffmpeg` renderer
    pub fn with_defaults(ctx: SortContext) -> Self {
        let locator = ctx.locator.build();
        let renderer = Arc::new(FfmpegRenderer::new(
            ctx.render.clone(),
            ctx.layout.unstabilized_videos.clone(),
            ctx.layout.stabilized_videos.clone(),
        ));
        Self::new(
            ctx,
            Arc::new(FsStore::new()),
            locator,
            Arc::new(RqrrDecoder::new()),
            renderer,
        )
    }

    pub fn context(&self) -> &SortContext {
        &self.ctx
    }

    /// Full control flow of one invocation
    pub fn execute_run(&mut self, options: RunOptions) -> SortResult<RunOutcome> {
        let start = std::time::Instant::now();
        self.prepare()?;

        info!(robot = %self.ctx.layout.robot, "Phase: HOUSEKEEPING");
        self.reconcile()?;
        self.clear_junk()?;

        if options.transfer_only {
            info!("Phase: PROMOTION (transfer all)");
            let promotion = self.transfer_all(options.stabilize)?;
            return Ok(RunOutcome::Completed {
                run: None,
                promotion,
            });
        }

        info!("Phase: INTAKE");
        let Some(run) = self.next_staged_run()? else {
            info!(staging = %self.ctx.layout.staging.display(), "No staged run archives");
            return Ok(RunOutcome::NothingStaged);
        };
        self.intake.extract(&run)?;
        let snapshot = self.snapshot()?;

        info!(run = %run.run_name, shelves = run.shelf_count(), "Phase: SORTING");
        let report = self.batch_and_identify(&run.run_name, run.shelf_count())?;

        info!(run = %run.run_name, "Phase: ARCHIVING");
        self.intake.archive(&run)?;

        let pending = self.review_pending()?;
        if pending > 0 {
            warn!(
                pending,
                review = %self.ctx.layout.junk_review.display(),
                "Junk review has unresolved batches. Move any worth keeping into re_merge/<experiment id> \
                 and rerun; skipping promotion"
            );
            return Ok(RunOutcome::ReviewRequired {
                run: report,
                pending,
            });
        }

        info!("Phase: PROMOTION");
        let promotion = self.merge_and_promote(&snapshot, options.stabilize)?;

        info!(
            run = %report.run_name,
            batches = report.batches.len(),
            promoted = promotion.promoted.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Run completed"
        );

        Ok(RunOutcome::Completed {
            run: Some(report),
            promotion,
        })
    }
}
