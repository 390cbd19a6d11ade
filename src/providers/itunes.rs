//! iTunes Search API client.

use log::debug;
use serde_json::Value;

use crate::error::ProviderError;
use crate::image_pipeline::CandidateImage;
use crate::providers::{
    download_candidates, encode_query_params, http_get_json, CoverProvider, ProviderKind,
    SearchQuery, MAX_CANDIDATES_PER_PROVIDER,
};
use crate::track::Track;

const ITUNES_SEARCH_URL: &str = "https://itunes.apple.com/search";
const ARTWORK_SIZE_TOKEN: &str = "100x100bb";
const ARTWORK_UPSCALED_TOKEN: &str = "1000x1000bb";

/// Album artwork lookups against the public iTunes catalog.
pub struct ItunesProvider {
    http_client: ureq::Agent,
}

impl ItunesProvider {
    pub fn new(http_client: ureq::Agent) -> Self {
        Self { http_client }
    }

    fn search_url(term: &str) -> String {
        let limit = MAX_CANDIDATES_PER_PROVIDER.to_string();
        format!(
            "{ITUNES_SEARCH_URL}?{}",
            encode_query_params(&[
                ("term", term),
                ("media", "music"),
                ("entity", "album"),
                ("limit", &limit),
            ])
        )
    }

    /// Extracts artwork URLs, upgraded from the 100px thumbnail to the large rendition.
    fn artwork_urls(payload: &Value) -> Vec<String> {
        payload
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|result| result.get("artworkUrl100").and_then(Value::as_str))
                    .filter(|url| !url.trim().is_empty())
                    .map(|url| url.replace(ARTWORK_SIZE_TOKEN, ARTWORK_UPSCALED_TOKEN))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl CoverProvider for ItunesProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Itunes
    }

    fn search(&self, track: &Track) -> Result<Vec<CandidateImage>, ProviderError> {
        let term = SearchQuery::from_track(track).term(&track.file_stem());
        let payload = http_get_json(&self.http_client, &Self::search_url(&term))?;
        let urls = Self::artwork_urls(&payload);
        debug!("iTunes: {} artwork url(s) for '{}'", urls.len(), term);
        Ok(download_candidates(&self.http_client, self.kind(), &urls))
    }
}
