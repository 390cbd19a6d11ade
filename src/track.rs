//! Track model used by the cover search batch.

use std::path::{Path, PathBuf};

/// Tag values relevant for cover search queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub album_artist: String,
}

/// Grouping key deciding whether two tracks may share a cover.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlbumKey {
    folder: PathBuf,
    album: String,
}

impl AlbumKey {
    pub fn new(path: &Path, album: &str) -> Self {
        Self {
            folder: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            album: album.trim().to_lowercase(),
        }
    }

    /// Key matching no other track.
    pub fn unique_to(path: &Path) -> Self {
        Self {
            folder: path.to_path_buf(),
            album: String::new(),
        }
    }
}

/// One audio file under orchestration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    path: PathBuf,
    metadata: TrackMetadata,
    album_key: AlbumKey,
    has_cover: bool,
    read_only: bool,
}

impl Track {
    pub fn new(path: PathBuf, metadata: TrackMetadata, has_cover: bool, read_only: bool) -> Self {
        let album_key = AlbumKey::new(&path, &metadata.album);
        Self {
            path,
            metadata,
            album_key,
            has_cover,
            read_only,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }

    pub fn album_key(&self) -> &AlbumKey {
        &self.album_key
    }

    pub fn has_cover(&self) -> bool {
        self.has_cover
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Short label used for logs and the manual picker title.
    pub fn display_label(&self) -> String {
        let artist = if self.metadata.album_artist.trim().is_empty() {
            self.metadata.artist.trim()
        } else {
            self.metadata.album_artist.trim()
        };
        let name = if self.metadata.album.trim().is_empty() {
            self.metadata.title.trim()
        } else {
            self.metadata.album.trim()
        };
        match (artist.is_empty(), name.is_empty()) {
            (false, false) => format!("{artist} - {name}"),
            (true, false) => name.to_string(),
            (false, true) => artist.to_string(),
            (true, true) => self.file_stem(),
        }
    }
}

/// Orders tracks so members of one album are resolved back to back.
pub fn order_for_batch(mut tracks: Vec<Track>) -> Vec<Track> {
    tracks.sort_by(|left, right| {
        left.album_key
            .cmp(&right.album_key)
            .then_with(|| left.path.cmp(&right.path))
    });
    tracks
}
