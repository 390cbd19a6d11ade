//! Tag and embedded-cover access backed by `lofty`.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag};
use log::{debug, warn};

use crate::error::PersistError;
use crate::image_pipeline::{encode_cover_jpeg, CandidateImage};
use crate::track::{Track, TrackMetadata};

/// Tag read/write operations the cover search needs from a track.
pub trait CoverStore: Send + Sync {
    fn has_cover(&self, track: &Track) -> bool;
    fn read_cover(&self, track: &Track) -> Option<CandidateImage>;
    fn write_cover(&self, track: &Track, cover: &CandidateImage) -> Result<(), PersistError>;
    fn is_writable(&self, track: &Track) -> bool;
}

fn first_non_empty_value<F>(primary_tag: Option<&Tag>, tags: &[Tag], mut extractor: F) -> String
where
    F: FnMut(&Tag) -> Option<String>,
{
    primary_tag
        .into_iter()
        .chain(tags.iter())
        .filter_map(|tag| extractor(tag))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

fn read_track_metadata(tagged_file: &TaggedFile) -> TrackMetadata {
    let primary_tag = tagged_file.primary_tag();
    let tags = tagged_file.tags();

    TrackMetadata {
        title: first_non_empty_value(primary_tag, tags, |tag| {
            tag.title().map(|value| value.into_owned())
        }),
        artist: first_non_empty_value(primary_tag, tags, |tag| {
            tag.artist().map(|value| value.into_owned())
        }),
        album: first_non_empty_value(primary_tag, tags, |tag| {
            tag.album().map(|value| value.into_owned())
        }),
        album_artist: first_non_empty_value(primary_tag, tags, |tag| {
            tag.get_string(ItemKey::AlbumArtist).map(str::to_string)
        }),
    }
}

fn first_picture_bytes(tagged_file: &TaggedFile) -> Option<Vec<u8>> {
    let primary_tag = tagged_file.primary_tag();
    let tags = tagged_file.tags();
    let front_cover = primary_tag
        .into_iter()
        .chain(tags.iter())
        .flat_map(|tag| tag.pictures())
        .find(|picture| picture.pic_type() == PictureType::CoverFront);
    front_cover
        .or_else(|| {
            primary_tag
                .into_iter()
                .chain(tags.iter())
                .flat_map(|tag| tag.pictures())
                .next()
        })
        .map(|picture| picture.data().to_vec())
}

fn file_permits_writing(path: &Path) -> bool {
    fs::metadata(path)
        .map(|metadata| metadata.is_file() && !metadata.permissions().readonly())
        .unwrap_or(false)
}

/// Loads a track's tags and cover flags; `None` when the file has no readable tags.
pub fn load_track(path: &Path) -> Option<Track> {
    let tagged_file = match read_from_path(path) {
        Ok(tagged_file) => tagged_file,
        Err(error) => {
            warn!("Metadata read failed for {}: {}", path.display(), error);
            return None;
        }
    };
    let metadata = read_track_metadata(&tagged_file);
    let has_cover = tagged_file
        .tags()
        .iter()
        .any(|tag| !tag.pictures().is_empty());
    let read_only = !file_permits_writing(path);
    Some(Track::new(path.to_path_buf(), metadata, has_cover, read_only))
}

/// Cover store that reads and writes embedded artwork in the audio file itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyCoverStore;

impl CoverStore for LoftyCoverStore {
    /// Answers from the flag `load_track` read; the file is not parsed again.
    fn has_cover(&self, track: &Track) -> bool {
        track.has_cover()
    }

    fn read_cover(&self, track: &Track) -> Option<CandidateImage> {
        let tagged_file = read_from_path(track.path()).ok()?;
        let bytes = first_picture_bytes(&tagged_file)?;
        let cover = CandidateImage::from_bytes(&bytes);
        if cover.is_none() {
            debug!(
                "Embedded cover of {} could not be decoded",
                track.path().display()
            );
        }
        cover
    }

    fn write_cover(&self, track: &Track, cover: &CandidateImage) -> Result<(), PersistError> {
        let path = track.path();
        if !self.is_writable(track) {
            return Err(PersistError::NotWritable(path.to_path_buf()));
        }
        let tag_error = |message: String| PersistError::Tag {
            path: path.to_path_buf(),
            message,
        };

        let encoded = encode_cover_jpeg(cover)?;
        let mut picture = Picture::from_reader(&mut Cursor::new(encoded))
            .map_err(|error| tag_error(format!("invalid picture: {error}")))?;
        picture.set_pic_type(PictureType::CoverFront);

        let mut tagged_file = read_from_path(path)
            .map_err(|error| tag_error(format!("failed to read tags: {error}")))?;
        let tag_type = tagged_file.primary_tag_type();
        if tagged_file.tag(tag_type).is_none() {
            tagged_file.insert_tag(Tag::new(tag_type));
        }
        let tag = tagged_file
            .tag_mut(tag_type)
            .ok_or_else(|| tag_error(format!("no writable tag available for {tag_type:?}")))?;
        tag.remove_picture_type(PictureType::CoverFront);
        tag.push_picture(picture);

        tagged_file
            .save_to_path(path, WriteOptions::default())
            .map_err(|error| tag_error(format!("failed to write tags: {error}")))
    }

    fn is_writable(&self, track: &Track) -> bool {
        !track.read_only() && file_permits_writing(track.path())
    }
}
