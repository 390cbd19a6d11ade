//! Manual cover choice for the aggregate search mode.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::image_pipeline::{encode_preview_png, CandidateImage};

/// Lets a user choose one of several candidate covers.
pub trait ManualPicker: Send + Sync {
    /// Returns the chosen candidate, or `None` when the user declines.
    fn choose(&self, candidates: &[CandidateImage], context_label: &str) -> Option<CandidateImage>;
}

/// Interprets one line of picker input against `candidate_count` options.
///
/// Indices are 1-based as printed. Empty input or `s` skips.
pub fn parse_choice(input: &str, candidate_count: usize) -> Result<Option<usize>, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("s") {
        return Ok(None);
    }
    let index: usize = trimmed
        .parse()
        .map_err(|_| format!("'{trimmed}' is not a number"))?;
    if index == 0 || index > candidate_count {
        return Err(format!("choose between 1 and {candidate_count}"));
    }
    Ok(Some(index - 1))
}

/// Picker that writes PNG previews to disk and reads the choice from stdin.
pub struct TerminalPicker {
    preview_dir: PathBuf,
}

impl TerminalPicker {
    pub fn new(preview_dir: PathBuf) -> Self {
        Self { preview_dir }
    }

    /// Picker using a fresh directory below the system temp dir.
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join(format!("discover_cover_{}", uuid::Uuid::new_v4())))
    }

    fn write_previews(&self, candidates: &[CandidateImage]) -> Vec<Option<PathBuf>> {
        if let Err(error) = fs::create_dir_all(&self.preview_dir) {
            warn!(
                "ManualPicker: failed to create preview dir {}: {}",
                self.preview_dir.display(),
                error
            );
            return vec![None; candidates.len()];
        }
        candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let path = self.preview_dir.join(format!("candidate_{}.png", index + 1));
                write_preview(&path, candidate)
                    .map_err(|error| warn!("ManualPicker: {}", error))
                    .ok()
                    .map(|_| path)
            })
            .collect()
    }

    fn clear_previews(&self) {
        if let Err(error) = fs::remove_dir_all(&self.preview_dir) {
            debug!(
                "ManualPicker: could not remove {}: {}",
                self.preview_dir.display(),
                error
            );
        }
    }
}

fn write_preview(path: &Path, candidate: &CandidateImage) -> Result<(), String> {
    let bytes = encode_preview_png(candidate)?;
    fs::write(path, bytes).map_err(|error| format!("failed to write {}: {error}", path.display()))
}

/// Lists every candidate with its preview path, one line each.
fn candidate_listing(
    context_label: &str,
    candidates: &[CandidateImage],
    previews: &[Option<PathBuf>],
) -> String {
    let mut listing = format!("\nCovers for {context_label}:\n");
    for (index, (candidate, preview)) in candidates.iter().zip(previews).enumerate() {
        let source = candidate
            .source()
            .map(|kind| kind.display_name())
            .unwrap_or("unknown");
        let preview = preview
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "no preview".to_string());
        listing.push_str(&format!(
            "  [{}] {}x{} from {} ({})\n",
            index + 1,
            candidate.width(),
            candidate.height(),
            source,
            preview
        ));
    }
    listing
}

/// Writes `text` to stderr, holding the lock only for the write itself.
fn show(text: &str) {
    let written = {
        let mut stderr = io::stderr().lock();
        stderr
            .write_all(text.as_bytes())
            .and_then(|()| stderr.flush())
    };
    if let Err(error) = written {
        warn!("ManualPicker: failed to show prompt: {}", error);
    }
}

impl TerminalPicker {
    /// Prompts until `input` yields a choice or a skip; end of input declines.
    fn choose_from<R: BufRead>(
        &self,
        candidates: &[CandidateImage],
        context_label: &str,
        input: &mut R,
    ) -> Option<CandidateImage> {
        if candidates.is_empty() {
            return None;
        }
        let previews = self.write_previews(candidates);
        let question = format!("Pick 1-{} or press Enter to skip: ", candidates.len());
        let mut prompt = candidate_listing(context_label, candidates, &previews) + &question;

        let choice = loop {
            show(&prompt);
            let mut line = String::new();
            match input.read_line(&mut line) {
                Ok(0) => break None,
                Ok(_) => match parse_choice(&line, candidates.len()) {
                    Ok(choice) => break choice,
                    Err(message) => prompt = format!("{message}\n{question}"),
                },
                Err(error) => {
                    warn!("ManualPicker: failed to read choice: {}", error);
                    break None;
                }
            }
        };
        self.clear_previews();
        choice.and_then(|index| candidates.get(index).cloned())
    }
}

impl ManualPicker for TerminalPicker {
    fn choose(&self, candidates: &[CandidateImage], context_label: &str) -> Option<CandidateImage> {
        self.choose_from(candidates, context_label, &mut io::stdin().lock())
    }
}
