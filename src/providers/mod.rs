//! Cover search provider abstractions and concrete web clients.

pub mod deezer;
pub mod itunes;
pub mod musicbrainz;

use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::config::{NetworkConfig, ProviderEntry};
use crate::error::ProviderError;
use crate::image_pipeline::CandidateImage;
use crate::track::Track;

/// Upper bound on candidates a single provider returns per track.
pub const MAX_CANDIDATES_PER_PROVIDER: usize = 5;
const MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

/// Search backends known to the application, in default priority order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Itunes,
    Deezer,
    #[serde(alias = "music_brainz")]
    Musicbrainz,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Itunes, Self::Deezer, Self::Musicbrainz];

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Itunes => "iTunes",
            Self::Deezer => "Deezer",
            Self::Musicbrainz => "MusicBrainz",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "itunes" => Some(Self::Itunes),
            "deezer" => Some(Self::Deezer),
            "musicbrainz" | "music_brainz" | "coverartarchive" => Some(Self::Musicbrainz),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Interface implemented by cover search clients.
///
/// Calls are blocking; coordinators run them on worker threads and enforce the
/// search timeout themselves.
pub trait CoverProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn search(&self, track: &Track) -> Result<Vec<CandidateImage>, ProviderError>;
}

/// Query terms derived from a track's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub artist: String,
    pub album: String,
    pub title: String,
}

impl SearchQuery {
    pub fn from_track(track: &Track) -> Self {
        let metadata = track.metadata();
        let artist = if metadata.album_artist.trim().is_empty() {
            metadata.artist.trim().to_string()
        } else {
            metadata.album_artist.trim().to_string()
        };
        Self {
            artist,
            album: metadata.album.trim().to_string(),
            title: metadata.title.trim().to_string(),
        }
    }

    /// Free-text search term: artist + album, else artist + title, else file stem.
    pub fn term(&self, fallback: &str) -> String {
        let second = if self.album.is_empty() {
            &self.title
        } else {
            &self.album
        };
        let joined = [self.artist.as_str(), second.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            fallback.trim().to_string()
        } else {
            joined
        }
    }
}

/// Builds the shared blocking HTTP agent for all providers.
pub fn build_http_agent(network: &NetworkConfig) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(network.connect_timeout_secs))
        .timeout_read(Duration::from_secs(network.read_timeout_secs))
        .timeout_write(Duration::from_secs(network.read_timeout_secs))
        .user_agent(&network.user_agent)
        .build()
}

/// Instantiates enabled providers in configured priority order.
pub fn build_providers(
    entries: &[ProviderEntry],
    agent: &ureq::Agent,
) -> Vec<Arc<dyn CoverProvider>> {
    entries
        .iter()
        .filter(|entry| entry.enabled)
        .map(|entry| -> Arc<dyn CoverProvider> {
            match entry.kind {
                ProviderKind::Itunes => Arc::new(itunes::ItunesProvider::new(agent.clone())),
                ProviderKind::Deezer => Arc::new(deezer::DeezerProvider::new(agent.clone())),
                ProviderKind::Musicbrainz => {
                    Arc::new(musicbrainz::MusicbrainzProvider::new(agent.clone()))
                }
            }
        })
        .collect()
}

pub(crate) fn http_get_json(agent: &ureq::Agent, url: &str) -> Result<Value, ProviderError> {
    let response = agent
        .get(url)
        .set("Accept", "application/json")
        .call()
        .map_err(|error| ProviderError::Transport(error.to_string()))?;
    response
        .into_json::<Value>()
        .map_err(|error| ProviderError::Response(format!("invalid JSON response: {error}")))
}

pub(crate) fn download_image(
    agent: &ureq::Agent,
    url: &str,
) -> Result<CandidateImage, ProviderError> {
    let response = agent
        .get(url)
        .call()
        .map_err(|error| ProviderError::Transport(error.to_string()))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_IMAGE_BYTES)
        .read_to_end(&mut bytes)
        .map_err(|error| ProviderError::Transport(format!("failed to read image: {error}")))?;
    if bytes.is_empty() {
        return Err(ProviderError::Response(format!("empty image body from {url}")));
    }
    CandidateImage::from_bytes(&bytes)
        .ok_or_else(|| ProviderError::Decode(format!("undecodable image at {url}")))
}

/// Downloads candidate URLs in order, skipping ones that fail to fetch or decode.
pub(crate) fn download_candidates(
    agent: &ureq::Agent,
    provider: ProviderKind,
    urls: &[String],
) -> Vec<CandidateImage> {
    let mut candidates = Vec::new();
    for url in urls.iter().take(MAX_CANDIDATES_PER_PROVIDER) {
        match download_image(agent, url) {
            Ok(candidate) => candidates.push(candidate),
            Err(error) => debug!("{provider}: skipping candidate {url}: {error}"),
        }
    }
    candidates
}

pub(crate) fn encode_query_params(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}
