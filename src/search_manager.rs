//! Cover search batch: stage sequencing, cancellation, and progress reporting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, info};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cover_resolver::{Collection, CoverResolver, SearchMode, TrackOutcome};
use crate::error::PipelineError;
use crate::image_pipeline::CandidateImage;
use crate::manual_picker::ManualPicker;
use crate::observer::BatchObserver;
use crate::pipeline::{Pipeline, PipelineHandle, PipelineOutcome, StageResult};
use crate::result_cache::LastCoverCache;
use crate::track::{AlbumKey, Track};

/// Per-run bookkeeping shared between the stages and the caller.
#[derive(Debug, Default)]
pub struct BatchState {
    cancellation: CancellationToken,
    processed: AtomicUsize,
    failed: AtomicBool,
}

impl BatchState {
    fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            ..Self::default()
        }
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    fn ensure_not_cancelled(&self) -> StageResult {
        if self.cancellation.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Completed,
    Cancelled,
    Failed,
}

/// Everything one run owns. Nothing here outlives the run.
struct BatchContext {
    id: Uuid,
    tracks: Vec<Track>,
    mode: SearchMode,
    cache: LastCoverCache,
    /// Manual mode candidates, parked by album until the selection stage.
    pending_selections: Mutex<HashMap<AlbumKey, Vec<CandidateImage>>>,
    state: Arc<BatchState>,
    resolver: Arc<CoverResolver>,
    picker: Arc<dyn ManualPicker>,
    observer: Arc<dyn BatchObserver>,
}

impl BatchContext {
    fn total(&self) -> usize {
        self.tracks.len()
    }

    /// Wraps one track's work in the processing/highlight/finished notifications.
    fn visit_track<F>(&self, index: usize, track: &Track, work: F)
    where
        F: FnOnce() -> TrackOutcome,
    {
        self.observer.on_track_highlighted(track, true);
        self.observer.on_track_processing(track);
        let outcome = work();
        self.observer
            .on_track_state_changed(track, &outcome.status_text());
        self.observer.on_track_highlighted(track, false);
        self.state.processed.fetch_add(1, Ordering::SeqCst);
        self.observer.on_track_finished(track);
        self.observer.on_progress(index + 1, self.total());
    }

    fn search_stage(&self) -> StageResult {
        self.observer.on_batch_started(self.total());
        info!(
            "CoverSearch: batch {} started with {} track(s) in {:?} mode",
            self.id,
            self.total(),
            self.mode
        );
        for (index, track) in self.tracks.iter().enumerate() {
            self.state.ensure_not_cancelled()?;
            self.visit_track(index, track, || match self.mode {
                SearchMode::SingleBest => self.resolver.resolve(track, &self.cache),
                SearchMode::ManualSelection => self.collect_for_selection(track),
            });
        }
        Ok(())
    }

    /// Albums share parked candidates only when last-result reuse is on.
    fn selection_key(&self, track: &Track) -> AlbumKey {
        if self.cache.is_enabled() {
            track.album_key().clone()
        } else {
            AlbumKey::unique_to(track.path())
        }
    }

    /// Candidate count already parked for the track's album, if reuse is on.
    fn parked_count(&self, track: &Track) -> Option<usize> {
        if !self.cache.is_enabled() {
            return None;
        }
        self.pending_selections
            .lock()
            .expect("pending selections lock poisoned")
            .get(track.album_key())
            .map(Vec::len)
    }

    fn collect_for_selection(&self, track: &Track) -> TrackOutcome {
        match self
            .resolver
            .collect_candidates(track, || self.parked_count(track))
        {
            Collection::Settled(outcome) => outcome,
            Collection::Candidates(candidates) => {
                let count = candidates.len();
                let key = self.selection_key(track);
                self.pending_selections
                    .lock()
                    .expect("pending selections lock poisoned")
                    .insert(key, candidates);
                TrackOutcome::CandidatesCollected(count)
            }
        }
    }

    fn selection_stage(&self) -> StageResult {
        self.state.processed.store(0, Ordering::SeqCst);
        for (index, track) in self.tracks.iter().enumerate() {
            self.state.ensure_not_cancelled()?;
            let key = self.selection_key(track);
            let candidates = self
                .pending_selections
                .lock()
                .expect("pending selections lock poisoned")
                .get(&key)
                .cloned()
                .unwrap_or_default();
            self.visit_track(index, track, || {
                self.resolver
                    .select(track, &candidates, &self.cache, self.picker.as_ref())
            });
        }
        Ok(())
    }

    fn finish_stage(&self) -> StageResult {
        self.pending_selections
            .lock()
            .expect("pending selections lock poisoned")
            .clear();
        self.observer.on_progress(0, self.total());
        self.observer.on_batch_finished();
        info!(
            "CoverSearch: batch {} finished, {} track(s) processed",
            self.id,
            self.state.processed()
        );
        Ok(())
    }
}

/// Handle to a running batch.
pub struct BatchHandle {
    id: Uuid,
    state: Arc<BatchState>,
    pipeline: PipelineHandle,
}

impl BatchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Token whose cancellation stops the batch before its next track.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.state.cancellation.clone()
    }

    /// Blocks until the batch finished, was cancelled, or failed.
    pub fn wait(self) -> BatchOutcome {
        match self.pipeline.join() {
            PipelineOutcome::Completed => BatchOutcome::Completed,
            PipelineOutcome::Aborted if self.state.failed.load(Ordering::SeqCst) => {
                BatchOutcome::Failed
            }
            PipelineOutcome::Aborted => BatchOutcome::Cancelled,
        }
    }
}

/// Runs cover search batches over ordered track lists.
pub struct CoverSearchManager {
    resolver: Arc<CoverResolver>,
    picker: Arc<dyn ManualPicker>,
    observer: Arc<dyn BatchObserver>,
    auto_reuse_last_cover: bool,
}

impl CoverSearchManager {
    pub fn new(
        resolver: Arc<CoverResolver>,
        picker: Arc<dyn ManualPicker>,
        observer: Arc<dyn BatchObserver>,
        auto_reuse_last_cover: bool,
    ) -> Self {
        Self {
            resolver,
            picker,
            observer,
            auto_reuse_last_cover,
        }
    }

    /// Starts a batch over `tracks` in the given order and returns at once.
    pub fn run(
        &self,
        tracks: Vec<Track>,
        mode: SearchMode,
    ) -> Result<BatchHandle, PipelineError> {
        self.run_with_cancellation(tracks, mode, CancellationToken::new())
    }

    /// Like [`run`](Self::run) but observing a caller-provided cancellation token.
    pub fn run_with_cancellation(
        &self,
        tracks: Vec<Track>,
        mode: SearchMode,
        cancellation: CancellationToken,
    ) -> Result<BatchHandle, PipelineError> {
        let id = Uuid::new_v4();
        let state = Arc::new(BatchState::new(cancellation));
        let context = Arc::new(BatchContext {
            id,
            tracks,
            mode,
            cache: LastCoverCache::new(self.auto_reuse_last_cover),
            pending_selections: Mutex::new(HashMap::new()),
            state: Arc::clone(&state),
            resolver: Arc::clone(&self.resolver),
            picker: Arc::clone(&self.picker),
            observer: Arc::clone(&self.observer),
        });

        let search_context = Arc::clone(&context);
        let mut pipeline = Pipeline::new("cover-search")
            .then("search", move || search_context.search_stage());
        if mode == SearchMode::ManualSelection {
            let selection_context = Arc::clone(&context);
            pipeline = pipeline.then("select", move || selection_context.selection_stage());
        }
        let finish_context = Arc::clone(&context);
        pipeline = pipeline.then("finish", move || finish_context.finish_stage());

        let failure_context = Arc::clone(&context);
        let pipeline = pipeline.begin(move |pipeline_error| {
            let state = &failure_context.state;
            if pipeline_error.is_cancelled() {
                info!(
                    "CoverSearch: batch {} cancelled after {} track(s)",
                    failure_context.id,
                    state.processed()
                );
                failure_context.observer.on_batch_cancelled(state.processed());
            } else {
                state.failed.store(true, Ordering::SeqCst);
                error!(
                    "CoverSearch: batch {} failed: {}",
                    failure_context.id, pipeline_error
                );
                failure_context
                    .observer
                    .on_batch_failed(&pipeline_error.to_string());
            }
        })?;

        Ok(BatchHandle {
            id,
            state,
            pipeline,
        })
    }
}
