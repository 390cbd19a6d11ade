//! MusicBrainz release search backed by Cover Art Archive images.

use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use log::debug;
use serde_json::Value;

use crate::error::ProviderError;
use crate::image_pipeline::CandidateImage;
use crate::providers::{
    download_candidates, encode_query_params, http_get_json, CoverProvider, ProviderKind,
    SearchQuery, MAX_CANDIDATES_PER_PROVIDER,
};
use crate::track::Track;

const MUSICBRAINZ_RELEASE_URL: &str = "https://musicbrainz.org/ws/2/release/";
const COVER_ART_ARCHIVE_URL: &str = "https://coverartarchive.org/release";
const MIN_RELEASE_SCORE: i64 = 70;
const RATE_LIMIT_WAIT_CAP: Duration = Duration::from_secs(5);

pub struct MusicbrainzProvider {
    http_client: ureq::Agent,
    limiter: RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>,
}

impl MusicbrainzProvider {
    pub fn new(http_client: ureq::Agent) -> Self {
        Self {
            http_client,
            // MusicBrainz asks clients to stay at or below one request per second.
            limiter: RateLimiter::direct(
                Quota::with_period(Duration::from_secs(1))
                    .expect("valid limiter period")
                    .allow_burst(NonZeroU32::new(1).expect("non-zero limiter burst")),
            ),
        }
    }

    fn wait_for_request_slot(&self) -> Result<(), ProviderError> {
        if self.limiter.check().is_ok() {
            return Ok(());
        }
        let deadline = Instant::now() + RATE_LIMIT_WAIT_CAP;
        while Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(100));
            if self.limiter.check().is_ok() {
                return Ok(());
            }
        }
        Err(ProviderError::Transport(
            "MusicBrainz rate limit saturated".to_string(),
        ))
    }

    fn escape_lucene(value: &str) -> String {
        value.replace('\\', "\\\\").replace('"', "\\\"")
    }

    fn lucene_query(query: &SearchQuery, fallback: &str) -> String {
        let release = if !query.album.is_empty() {
            query.album.as_str()
        } else if !query.title.is_empty() {
            query.title.as_str()
        } else {
            fallback.trim()
        };
        let mut clauses = vec![format!("release:\"{}\"", Self::escape_lucene(release))];
        if !query.artist.is_empty() {
            clauses.push(format!("artist:\"{}\"", Self::escape_lucene(&query.artist)));
        }
        clauses.join(" AND ")
    }

    fn search_url(lucene: &str) -> String {
        let limit = MAX_CANDIDATES_PER_PROVIDER.to_string();
        format!(
            "{MUSICBRAINZ_RELEASE_URL}?{}",
            encode_query_params(&[("query", lucene), ("fmt", "json"), ("limit", &limit)])
        )
    }

    fn release_ids(payload: &Value) -> Vec<String> {
        payload
            .get("releases")
            .and_then(Value::as_array)
            .map(|releases| {
                releases
                    .iter()
                    .filter(|release| {
                        release
                            .get("score")
                            .and_then(Value::as_i64)
                            .unwrap_or(100)
                            >= MIN_RELEASE_SCORE
                    })
                    .filter_map(|release| release.get("id").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn front_cover_url(release_id: &str) -> String {
        format!("{COVER_ART_ARCHIVE_URL}/{release_id}/front-1200")
    }
}

impl CoverProvider for MusicbrainzProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Musicbrainz
    }

    fn search(&self, track: &Track) -> Result<Vec<CandidateImage>, ProviderError> {
        let query = SearchQuery::from_track(track);
        let lucene = Self::lucene_query(&query, &track.file_stem());
        self.wait_for_request_slot()?;
        let payload = http_get_json(&self.http_client, &Self::search_url(&lucene))?;
        let urls: Vec<String> = Self::release_ids(&payload)
            .iter()
            .map(|id| Self::front_cover_url(id))
            .collect();
        debug!("MusicBrainz: {} release(s) for {}", urls.len(), lucene);
        Ok(download_candidates(&self.http_client, self.kind(), &urls))
    }
}
