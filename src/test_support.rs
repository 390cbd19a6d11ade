//! In-memory fakes shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, Rgba};
use tokio_util::sync::CancellationToken;

use crate::error::{PersistError, ProviderError};
use crate::image_pipeline::CandidateImage;
use crate::manual_picker::ManualPicker;
use crate::metadata_tags::CoverStore;
use crate::observer::BatchObserver;
use crate::providers::{CoverProvider, ProviderKind};
use crate::track::{Track, TrackMetadata};

pub fn solid_cover(width: u32, height: u32) -> CandidateImage {
    CandidateImage::new(DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
        width,
        height,
        Rgba([200, 40, 40, 255]),
    )))
}

fn build_track(folder: &str, stem: &str, album: &str, has_cover: bool, read_only: bool) -> Track {
    Track::new(
        Path::new(folder).join(format!("{stem}.mp3")),
        TrackMetadata {
            title: stem.to_string(),
            artist: "Artist".to_string(),
            album: album.to_string(),
            album_artist: String::new(),
        },
        has_cover,
        read_only,
    )
}

pub fn track_in(folder: &str, stem: &str, album: &str) -> Track {
    build_track(folder, stem, album, false, false)
}

pub fn covered_track_in(folder: &str, stem: &str, album: &str) -> Track {
    build_track(folder, stem, album, true, false)
}

pub fn read_only_track_in(folder: &str, stem: &str, album: &str) -> Track {
    build_track(folder, stem, album, false, true)
}

enum Script {
    Images(Vec<(u32, u32)>),
    Fail(String),
    Panic,
}

/// Provider answering every call the same way, optionally after a delay.
pub struct ScriptedProvider {
    kind: ProviderKind,
    delay: Duration,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn scripted(kind: ProviderKind, script: Script) -> Self {
        Self {
            kind,
            delay: Duration::ZERO,
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn images(kind: ProviderKind, dimensions: &[(u32, u32)]) -> Self {
        Self::scripted(kind, Script::Images(dimensions.to_vec()))
    }

    pub fn failing(kind: ProviderKind, message: &str) -> Self {
        Self::scripted(kind, Script::Fail(message.to_string()))
    }

    pub fn panicking(kind: ProviderKind) -> Self {
        Self::scripted(kind, Script::Panic)
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CoverProvider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn search(&self, _track: &Track) -> Result<Vec<CandidateImage>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match &self.script {
            Script::Images(dimensions) => Ok(dimensions
                .iter()
                .map(|(width, height)| solid_cover(*width, *height))
                .collect()),
            Script::Fail(message) => Err(ProviderError::Transport(message.clone())),
            Script::Panic => panic!("scripted provider panic"),
        }
    }
}

/// Cover store keeping embedded covers in a map.
#[derive(Default)]
pub struct MemoryCoverStore {
    covers: Mutex<HashMap<PathBuf, CandidateImage>>,
    locked: Mutex<HashSet<PathBuf>>,
    writes: Mutex<Vec<(PathBuf, (u32, u32))>>,
}

impl MemoryCoverStore {
    pub fn with_cover(self, track: &Track, cover: CandidateImage) -> Self {
        self.covers
            .lock()
            .expect("covers lock poisoned")
            .insert(track.path().to_path_buf(), cover);
        self
    }

    /// Makes writes fail even though the track itself is not flagged read-only.
    pub fn locked(self, track: &Track) -> Self {
        self.locked
            .lock()
            .expect("locked lock poisoned")
            .insert(track.path().to_path_buf());
        self
    }

    pub fn writes(&self) -> Vec<(PathBuf, (u32, u32))> {
        self.writes.lock().expect("writes lock poisoned").clone()
    }

    pub fn cover_of(&self, track: &Track) -> Option<CandidateImage> {
        self.covers
            .lock()
            .expect("covers lock poisoned")
            .get(track.path())
            .cloned()
    }
}

impl CoverStore for MemoryCoverStore {
    fn has_cover(&self, track: &Track) -> bool {
        track.has_cover() || self.cover_of(track).is_some()
    }

    fn read_cover(&self, track: &Track) -> Option<CandidateImage> {
        self.cover_of(track)
    }

    fn write_cover(&self, track: &Track, cover: &CandidateImage) -> Result<(), PersistError> {
        if self
            .locked
            .lock()
            .expect("locked lock poisoned")
            .contains(track.path())
        {
            return Err(PersistError::NotWritable(track.path().to_path_buf()));
        }
        self.writes
            .lock()
            .expect("writes lock poisoned")
            .push((track.path().to_path_buf(), cover.dimensions()));
        self.covers
            .lock()
            .expect("covers lock poisoned")
            .insert(track.path().to_path_buf(), cover.clone());
        Ok(())
    }

    fn is_writable(&self, track: &Track) -> bool {
        !track.read_only()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    BatchStarted(usize),
    State(PathBuf, String),
    Highlighted(PathBuf, bool),
    Processing(PathBuf),
    Finished(PathBuf),
    Progress(usize, usize),
    BatchFinished,
    BatchCancelled(usize),
    BatchFailed(String),
}

/// Observer recording every event, optionally cancelling after N finished tracks.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
    cancel_after: Option<(usize, CancellationToken)>,
    finished: AtomicUsize,
}

impl RecordingObserver {
    pub fn cancelling_after(finished_tracks: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((finished_tracks, token)),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().expect("events lock poisoned").clone()
    }

    /// Final state text per track, in the order the tracks were last updated.
    pub fn states(&self) -> Vec<(PathBuf, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ObservedEvent::State(path, state) => Some((path, state)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ObservedEvent) {
        self.events.lock().expect("events lock poisoned").push(event);
    }
}

impl BatchObserver for RecordingObserver {
    fn on_batch_started(&self, total: usize) {
        self.record(ObservedEvent::BatchStarted(total));
    }

    fn on_track_state_changed(&self, track: &Track, state: &str) {
        self.record(ObservedEvent::State(
            track.path().to_path_buf(),
            state.to_string(),
        ));
    }

    fn on_track_highlighted(&self, track: &Track, highlighted: bool) {
        self.record(ObservedEvent::Highlighted(
            track.path().to_path_buf(),
            highlighted,
        ));
    }

    fn on_track_processing(&self, track: &Track) {
        self.record(ObservedEvent::Processing(track.path().to_path_buf()));
    }

    fn on_track_finished(&self, track: &Track) {
        self.record(ObservedEvent::Finished(track.path().to_path_buf()));
        let finished = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if finished == *limit {
                token.cancel();
            }
        }
    }

    fn on_progress(&self, current: usize, total: usize) {
        self.record(ObservedEvent::Progress(current, total));
    }

    fn on_batch_finished(&self) {
        self.record(ObservedEvent::BatchFinished);
    }

    fn on_batch_cancelled(&self, processed: usize) {
        self.record(ObservedEvent::BatchCancelled(processed));
    }

    fn on_batch_failed(&self, message: &str) {
        self.record(ObservedEvent::BatchFailed(message.to_string()));
    }
}

/// Picker answering from a queue of candidate indices; an empty queue declines.
#[derive(Default)]
pub struct ScriptedPicker {
    answers: Mutex<VecDeque<Option<usize>>>,
    prompts: Mutex<Vec<(String, usize)>>,
}

impl ScriptedPicker {
    pub fn answering(answers: &[Option<usize>]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// `(context label, candidate count)` for every prompt shown.
    pub fn prompts(&self) -> Vec<(String, usize)> {
        self.prompts.lock().expect("prompts lock poisoned").clone()
    }
}

impl ManualPicker for ScriptedPicker {
    fn choose(&self, candidates: &[CandidateImage], context_label: &str) -> Option<CandidateImage> {
        self.prompts
            .lock()
            .expect("prompts lock poisoned")
            .push((context_label.to_string(), candidates.len()));
        let answer = self
            .answers
            .lock()
            .expect("answers lock poisoned")
            .pop_front()
            .flatten();
        answer.and_then(|index| candidates.get(index).cloned())
    }
}
