//! Expands command-line paths into the audio files a batch should visit.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use log::{debug, warn};

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 9] =
    ["mp3", "flac", "ogg", "m4a", "mp4", "aac", "wav", "opus", "wma"];

pub fn is_supported_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SUPPORTED_AUDIO_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

fn collect_audio_files_from_folder(folder_path: &Path, found: &mut BTreeSet<PathBuf>) {
    let mut pending_directories = vec![folder_path.to_path_buf()];

    while let Some(directory) = pending_directories.pop() {
        let entries = match std::fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("Failed to read directory {}: {}", directory.display(), err);
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                debug!("Failed to inspect {}", path.display());
                continue;
            };
            if file_type.is_dir() {
                pending_directories.push(path);
            } else if file_type.is_file() && is_supported_audio_file(&path) {
                found.insert(path);
            }
        }
    }
}

/// Collects supported audio files from files and (recursively) folders.
///
/// The result is sorted and free of duplicates. Unsupported files and missing
/// paths are skipped with a warning.
pub fn collect_audio_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();
    for path in paths {
        if path.is_dir() {
            collect_audio_files_from_folder(path, &mut found);
        } else if path.is_file() && is_supported_audio_file(path) {
            found.insert(path.clone());
        } else {
            warn!("Skipping {}: not a supported audio file or folder", path.display());
        }
    }
    found.into_iter().collect()
}
