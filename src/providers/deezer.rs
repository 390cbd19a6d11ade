//! Deezer album search client.

use log::debug;
use serde_json::Value;

use crate::error::ProviderError;
use crate::image_pipeline::CandidateImage;
use crate::providers::{
    download_candidates, encode_query_params, http_get_json, CoverProvider, ProviderKind,
    SearchQuery, MAX_CANDIDATES_PER_PROVIDER,
};
use crate::track::Track;

const DEEZER_ALBUM_SEARCH_URL: &str = "https://api.deezer.com/search/album";

pub struct DeezerProvider {
    http_client: ureq::Agent,
}

impl DeezerProvider {
    pub fn new(http_client: ureq::Agent) -> Self {
        Self { http_client }
    }

    fn search_url(term: &str) -> String {
        let limit = MAX_CANDIDATES_PER_PROVIDER.to_string();
        format!(
            "{DEEZER_ALBUM_SEARCH_URL}?{}",
            encode_query_params(&[("q", term), ("limit", &limit)])
        )
    }

    fn cover_urls(payload: &Value) -> Result<Vec<String>, ProviderError> {
        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Deezer returned an error");
            return Err(ProviderError::Response(message.to_string()));
        }
        Ok(payload
            .get("data")
            .and_then(Value::as_array)
            .map(|albums| {
                albums
                    .iter()
                    .filter_map(|album| {
                        album
                            .get("cover_xl")
                            .or_else(|| album.get("cover_big"))
                            .and_then(Value::as_str)
                    })
                    .filter(|url| !url.trim().is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl CoverProvider for DeezerProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Deezer
    }

    fn search(&self, track: &Track) -> Result<Vec<CandidateImage>, ProviderError> {
        let term = SearchQuery::from_track(track).term(&track.file_stem());
        let payload = http_get_json(&self.http_client, &Self::search_url(&term))?;
        let urls = Self::cover_urls(&payload)?;
        debug!("Deezer: {} cover url(s) for '{}'", urls.len(), term);
        Ok(download_candidates(&self.http_client, self.kind(), &urls))
    }
}

#[cfg(test)]
mod tests {
    use super::DeezerProvider;
    use crate::error::ProviderError;

    #[test]
    fn test_cover_urls_prefers_xl_and_falls_back_to_big() {
        let payload = serde_json::json!({
            "data": [
                {
                    "title": "One",
                    "cover_xl": "https://cdn.example/one/1000x1000.jpg",
                    "cover_big": "https://cdn.example/one/500x500.jpg"
                },
                { "title": "Two", "cover_big": "https://cdn.example/two/500x500.jpg" },
                { "title": "Three", "cover_xl": "" }
            ],
            "total": 3
        });
        assert_eq!(
            DeezerProvider::cover_urls(&payload).expect("payload should parse"),
            vec![
                "https://cdn.example/one/1000x1000.jpg".to_string(),
                "https://cdn.example/two/500x500.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn test_cover_urls_surfaces_api_error() {
        let payload = serde_json::json!({
            "error": { "type": "Exception", "message": "Quota limit exceeded", "code": 4 }
        });
        match DeezerProvider::cover_urls(&payload) {
            Err(ProviderError::Response(message)) => assert_eq!(message, "Quota limit exceeded"),
            other => panic!("expected response error, got {other:?}"),
        }
    }

    #[test]
    fn test_search_url_encodes_term() {
        assert_eq!(
            DeezerProvider::search_url("Björk Post"),
            "https://api.deezer.com/search/album?q=Bj%C3%B6rk%20Post&limit=5"
        );
    }
}
