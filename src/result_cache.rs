//! Last-result cache letting tracks of one album share a single search.

use std::path::PathBuf;
use std::sync::Mutex;

use log::debug;

use crate::image_pipeline::CandidateImage;
use crate::track::{AlbumKey, Track};

/// Most recently resolved `(track, cover)` pair. `cover == None` records a search
/// that found nothing.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub track_path: PathBuf,
    pub album_key: AlbumKey,
    pub cover: Option<CandidateImage>,
}

#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// Same album as the cached track and a cover was found for it.
    Reuse(CandidateImage),
    /// Same album as the cached track and nothing was found for it.
    KnownMissing,
    Miss,
}

/// Single-slot cache owned by one batch run.
///
/// Stages run on separate threads, so the slot sits behind a lock and every
/// store replaces the entry as a whole.
#[derive(Debug)]
pub struct LastCoverCache {
    enabled: bool,
    slot: Mutex<Option<CacheEntry>>,
}

impl LastCoverCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            slot: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records the outcome for `track`, returning the entry it replaced.
    pub fn store(&self, track: &Track, cover: Option<CandidateImage>) -> Option<CacheEntry> {
        let entry = CacheEntry {
            track_path: track.path().to_path_buf(),
            album_key: track.album_key().clone(),
            cover,
        };
        self.slot
            .lock()
            .expect("cover cache lock poisoned")
            .replace(entry)
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Option<CacheEntry> {
        self.slot.lock().expect("cover cache lock poisoned").clone()
    }

    /// Answers whether `track` can skip provider calls.
    ///
    /// A cached cover is only handed out when the target can be written; a cached
    /// miss is honoured regardless since nothing will be written.
    pub fn lookup(&self, track: &Track, target_writable: bool) -> CacheLookup {
        if !self.enabled {
            return CacheLookup::Miss;
        }
        let slot = self.slot.lock().expect("cover cache lock poisoned");
        let Some(entry) = slot.as_ref() else {
            return CacheLookup::Miss;
        };
        if entry.album_key != *track.album_key() {
            return CacheLookup::Miss;
        }
        debug!(
            "CoverCache: {} shares the album of {}",
            track.path().display(),
            entry.track_path.display()
        );
        match &entry.cover {
            Some(cover) if target_writable => CacheLookup::Reuse(cover.clone()),
            Some(_) => CacheLookup::Miss,
            None => CacheLookup::KnownMissing,
        }
    }
}
