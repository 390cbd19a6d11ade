//! Per-track cover decision: skip rules, cache reuse, provider search, policy, write-back.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::config::SearchConfig;
use crate::coordinators::{aggregate_all_results, race_first_result, SearchRuntime};
use crate::error::PersistError;
use crate::image_pipeline::{resize_if_needed, CandidateImage};
use crate::manual_picker::ManualPicker;
use crate::metadata_tags::CoverStore;
use crate::providers::CoverProvider;
use crate::resolution_policy::{should_overwrite, OverwritePolicy};
use crate::result_cache::{CacheLookup, LastCoverCache};
use crate::track::Track;

/// How candidates are obtained and a winner chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// First non-empty provider result in priority order wins.
    SingleBest,
    /// All providers are asked and the user picks.
    ManualSelection,
}

impl SearchMode {
    pub fn from_config(config: &SearchConfig) -> Self {
        if config.manual_image_selection {
            Self::ManualSelection
        } else {
            Self::SingleBest
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverSettings {
    pub policy: OverwritePolicy,
    pub search_timeout: Duration,
    pub max_cover_dimension: u32,
}

impl ResolverSettings {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            policy: OverwritePolicy::from_config(config),
            search_timeout: config.search_timeout(),
            max_cover_dimension: config.max_cover_dimension.max(1),
        }
    }
}

/// Result of handling one track, shown to the user as a short status text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    AlreadyHasCover,
    WriteProtected,
    NoFittingCover,
    NoneSelected,
    ExistingIsHigher,
    Saved,
    Failed(String),
    /// Manual mode: candidates parked until the selection stage.
    CandidatesCollected(usize),
}

impl TrackOutcome {
    pub fn status_text(&self) -> String {
        match self {
            Self::AlreadyHasCover => "cover already exists".to_string(),
            Self::WriteProtected => "file is write-protected".to_string(),
            Self::NoFittingCover => "no fitting cover".to_string(),
            Self::NoneSelected => "no cover selected".to_string(),
            Self::ExistingIsHigher => "existing resolution is higher".to_string(),
            Self::Saved => "cover saved".to_string(),
            Self::Failed(message) => format!("saving failed: {message}"),
            Self::CandidatesCollected(count) => format!("{count} candidate(s) found"),
        }
    }
}

/// Stage-one result in manual mode.
#[derive(Debug, Clone)]
pub enum Collection {
    Candidates(Vec<CandidateImage>),
    /// The track needs no selection; its outcome is final.
    Settled(TrackOutcome),
}

pub struct CoverResolver {
    providers: Vec<Arc<dyn CoverProvider>>,
    store: Arc<dyn CoverStore>,
    settings: ResolverSettings,
    runtime: SearchRuntime,
}

impl CoverResolver {
    pub fn new(
        providers: Vec<Arc<dyn CoverProvider>>,
        store: Arc<dyn CoverStore>,
        settings: ResolverSettings,
    ) -> std::io::Result<Self> {
        Ok(Self {
            providers,
            store,
            settings,
            runtime: SearchRuntime::new()?,
        })
    }

    /// Skip rules shared by every mode; `Some` means no search is needed.
    fn precheck(&self, track: &Track) -> Option<TrackOutcome> {
        if !self
            .settings
            .policy
            .permits_search(self.store.has_cover(track))
        {
            debug!(
                "CoverSearch: {} already has a cover, skipping",
                track.path().display()
            );
            return Some(TrackOutcome::AlreadyHasCover);
        }
        if !self.store.is_writable(track) {
            info!(
                "CoverSearch: {} is write-protected, skipping",
                track.path().display()
            );
            return Some(TrackOutcome::WriteProtected);
        }
        None
    }

    /// `Some(winner)` when the last result can stand in for a search.
    fn cached_winner(
        &self,
        track: &Track,
        cache: &LastCoverCache,
    ) -> Option<Option<CandidateImage>> {
        match cache.lookup(track, self.store.is_writable(track)) {
            CacheLookup::Reuse(cover) => {
                debug!(
                    "CoverSearch: reusing previous cover for {}",
                    track.path().display()
                );
                Some(Some(cover))
            }
            CacheLookup::KnownMissing => {
                debug!(
                    "CoverSearch: album of {} already had no cover",
                    track.path().display()
                );
                Some(None)
            }
            CacheLookup::Miss => None,
        }
    }

    /// Single-best resolution of one track.
    pub fn resolve(&self, track: &Track, cache: &LastCoverCache) -> TrackOutcome {
        if let Some(outcome) = self.precheck(track) {
            return outcome;
        }
        let winner = match self.cached_winner(track, cache) {
            Some(winner) => winner,
            None => self
                .runtime
                .block_on(race_first_result(
                    &self.providers,
                    track,
                    self.settings.search_timeout,
                ))
                .into_iter()
                .next(),
        };
        self.apply_winner(track, winner, cache, TrackOutcome::NoFittingCover)
    }

    /// Manual mode, first pass: gathers every provider's candidates.
    ///
    /// `parked` reports how many candidates are already held for the track's
    /// album; it is only consulted once the skip rules let the track through.
    pub fn collect_candidates<F>(&self, track: &Track, parked: F) -> Collection
    where
        F: FnOnce() -> Option<usize>,
    {
        if let Some(outcome) = self.precheck(track) {
            return Collection::Settled(outcome);
        }
        if let Some(count) = parked() {
            return Collection::Settled(TrackOutcome::CandidatesCollected(count));
        }
        Collection::Candidates(self.runtime.block_on(aggregate_all_results(
            &self.providers,
            track,
            self.settings.search_timeout,
        )))
    }

    /// Manual mode, second pass: lets the picker choose among `candidates` unless
    /// the last result already covers this track's album.
    pub fn select(
        &self,
        track: &Track,
        candidates: &[CandidateImage],
        cache: &LastCoverCache,
        picker: &dyn ManualPicker,
    ) -> TrackOutcome {
        if let Some(outcome) = self.precheck(track) {
            return outcome;
        }
        if let Some(winner) = self.cached_winner(track, cache) {
            return self.apply_winner(track, winner, cache, TrackOutcome::NoFittingCover);
        }
        if candidates.is_empty() {
            return self.apply_winner(track, None, cache, TrackOutcome::NoFittingCover);
        }
        let chosen = picker.choose(candidates, &track.display_label());
        self.apply_winner(track, chosen, cache, TrackOutcome::NoneSelected)
    }

    /// Applies the resolution policy, persists, and records the result in the cache.
    fn apply_winner(
        &self,
        track: &Track,
        winner: Option<CandidateImage>,
        cache: &LastCoverCache,
        empty_outcome: TrackOutcome,
    ) -> TrackOutcome {
        let Some(winner) = winner else {
            cache.store(track, None);
            info!("CoverSearch: no cover for {}", track.path().display());
            return empty_outcome;
        };

        let cover = resize_if_needed(&winner, self.settings.max_cover_dimension);
        cache.store(track, Some(cover.clone()));

        let existing = if self.store.has_cover(track) {
            self.store.read_cover(track).map(|image| image.dimensions())
        } else {
            None
        };
        if !should_overwrite(existing, cover.dimensions(), self.settings.policy) {
            debug!(
                "CoverSearch: keeping existing {:?} cover of {}",
                existing,
                track.path().display()
            );
            return TrackOutcome::ExistingIsHigher;
        }

        match self.store.write_cover(track, &cover) {
            Ok(()) => {
                info!(
                    "CoverSearch: saved {}x{} cover to {}",
                    cover.width(),
                    cover.height(),
                    track.path().display()
                );
                TrackOutcome::Saved
            }
            Err(PersistError::NotWritable(path)) => {
                warn!("CoverSearch: {} is write-protected", path.display());
                TrackOutcome::WriteProtected
            }
            Err(persist_error) => {
                warn!("CoverSearch: {}", persist_error);
                TrackOutcome::Failed(persist_error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Collection, CoverResolver, ResolverSettings, TrackOutcome};
    use crate::metadata_tags::CoverStore;
    use crate::providers::{CoverProvider, ProviderKind};
    use crate::resolution_policy::OverwritePolicy;
    use crate::result_cache::LastCoverCache;
    use crate::test_support::{
        covered_track_in, read_only_track_in, solid_cover, track_in, MemoryCoverStore,
        ScriptedPicker, ScriptedProvider,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn settings(overwrite_cover: bool, overwrite_only_if_higher: bool) -> ResolverSettings {
        ResolverSettings {
            policy: OverwritePolicy {
                overwrite_cover,
                overwrite_only_if_higher,
            },
            search_timeout: Duration::from_secs(2),
            max_cover_dimension: 1000,
        }
    }

    fn resolver(
        providers: &[Arc<ScriptedProvider>],
        store: &Arc<MemoryCoverStore>,
        settings: ResolverSettings,
    ) -> CoverResolver {
        CoverResolver::new(
            providers
                .iter()
                .map(|provider| Arc::clone(provider) as Arc<dyn CoverProvider>)
                .collect(),
            Arc::clone(store) as Arc<dyn CoverStore>,
            settings,
        )
        .expect("resolver should build")
    }

    #[test]
    fn test_same_album_track_reuses_cover_without_provider_calls() {
        let provider = Arc::new(ScriptedProvider::images(ProviderKind::Itunes, &[(600, 600)]));
        let store = Arc::new(MemoryCoverStore::default());
        let resolver = resolver(&[Arc::clone(&provider)], &store, settings(false, true));
        let cache = LastCoverCache::new(true);
        let first = track_in("/music/a", "01", "Debut");
        let second = track_in("/music/a", "02", "Debut");

        assert_eq!(resolver.resolve(&first, &cache), TrackOutcome::Saved);
        assert_eq!(resolver.resolve(&second, &cache), TrackOutcome::Saved);

        assert_eq!(provider.calls(), 1);
        let first_cover = store.cover_of(&first).expect("first cover written");
        let second_cover = store.cover_of(&second).expect("second cover written");
        assert!(first_cover.same_pixels(&second_cover));
    }

    #[test]
    fn test_missing_cover_is_cached_for_the_album() {
        let provider = Arc::new(ScriptedProvider::images(ProviderKind::Deezer, &[]));
        let store = Arc::new(MemoryCoverStore::default());
        let resolver = resolver(&[Arc::clone(&provider)], &store, settings(false, true));
        let cache = LastCoverCache::new(true);

        let first = track_in("/music/a", "01", "Debut");
        let second = track_in("/music/a", "02", "Debut");
        assert_eq!(resolver.resolve(&first, &cache), TrackOutcome::NoFittingCover);
        assert_eq!(resolver.resolve(&second, &cache), TrackOutcome::NoFittingCover);
        assert_eq!(provider.calls(), 1);

        resolver.resolve(&track_in("/music/b", "01", "Debut"), &cache);
        assert_eq!(provider.calls(), 2);
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_disabled_reuse_searches_every_track() {
        let provider = Arc::new(ScriptedProvider::images(ProviderKind::Itunes, &[(300, 300)]));
        let store = Arc::new(MemoryCoverStore::default());
        let resolver = resolver(&[Arc::clone(&provider)], &store, settings(false, true));
        let cache = LastCoverCache::new(false);

        resolver.resolve(&track_in("/music/a", "01", "Debut"), &cache);
        resolver.resolve(&track_in("/music/a", "02", "Debut"), &cache);
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_existing_cover_is_skipped_when_overwrite_is_off() {
        let provider = Arc::new(ScriptedProvider::images(ProviderKind::Itunes, &[(900, 900)]));
        let store = Arc::new(MemoryCoverStore::default());
        let resolver = resolver(&[Arc::clone(&provider)], &store, settings(false, true));

        let outcome = resolver.resolve(
            &covered_track_in("/music/a", "01", "Debut"),
            &LastCoverCache::new(true),
        );
        assert_eq!(outcome, TrackOutcome::AlreadyHasCover);
        assert_eq!(outcome.status_text(), "cover already exists");
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_higher_resolution_existing_cover_is_kept() {
        let track = track_in("/music/a", "01", "Debut");
        let provider = Arc::new(ScriptedProvider::images(ProviderKind::Itunes, &[(500, 500)]));
        let store = Arc::new(MemoryCoverStore::default().with_cover(&track, solid_cover(800, 800)));
        let resolver = resolver(&[provider], &store, settings(true, true));

        let outcome = resolver.resolve(&track, &LastCoverCache::new(true));
        assert_eq!(outcome, TrackOutcome::ExistingIsHigher);
        assert_eq!(outcome.status_text(), "existing resolution is higher");
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_larger_candidate_replaces_existing_cover_after_resize() {
        let track = track_in("/music/a", "01", "Debut");
        let provider = Arc::new(ScriptedProvider::images(ProviderKind::Itunes, &[(2000, 1000)]));
        let store = Arc::new(MemoryCoverStore::default().with_cover(&track, solid_cover(300, 300)));
        let resolver = resolver(&[provider], &store, settings(true, true));

        assert_eq!(resolver.resolve(&track, &LastCoverCache::new(true)), TrackOutcome::Saved);
        assert_eq!(store.writes(), vec![(track.path().to_path_buf(), (1000, 500))]);
    }

    #[test]
    fn test_write_protection_is_reported_per_track() {
        let provider = Arc::new(ScriptedProvider::images(ProviderKind::Itunes, &[(400, 400)]));
        let locked = track_in("/music/a", "02", "Debut");
        let store = Arc::new(MemoryCoverStore::default().locked(&locked));
        let resolver = resolver(&[Arc::clone(&provider)], &store, settings(false, true));
        let cache = LastCoverCache::new(true);

        let read_only = read_only_track_in("/music/a", "01", "Debut");
        assert_eq!(resolver.resolve(&read_only, &cache), TrackOutcome::WriteProtected);
        assert_eq!(provider.calls(), 0);

        let outcome = resolver.resolve(&locked, &cache);
        assert_eq!(outcome, TrackOutcome::WriteProtected);
        assert_eq!(outcome.status_text(), "file is write-protected");
        assert!(cache.snapshot().and_then(|entry| entry.cover).is_some());
    }

    #[test]
    fn test_manual_selection_uses_picker_then_cache_for_album() {
        let itunes = Arc::new(ScriptedProvider::images(ProviderKind::Itunes, &[(300, 300)]));
        let deezer = Arc::new(ScriptedProvider::images(ProviderKind::Deezer, &[(700, 700)]));
        let store = Arc::new(MemoryCoverStore::default());
        let resolver = resolver(
            &[Arc::clone(&itunes), Arc::clone(&deezer)],
            &store,
            settings(false, true),
        );
        let cache = LastCoverCache::new(true);
        let picker = ScriptedPicker::answering(&[Some(1)]);
        let first = track_in("/music/a", "01", "Debut");
        let second = track_in("/music/a", "02", "Debut");

        let candidates = match resolver.collect_candidates(&first, || None) {
            Collection::Candidates(candidates) => candidates,
            other => panic!("expected candidates, got {other:?}"),
        };
        assert_eq!(candidates.len(), 2);

        assert_eq!(resolver.select(&first, &candidates, &cache, &picker), TrackOutcome::Saved);
        assert_eq!(resolver.select(&second, &candidates, &cache, &picker), TrackOutcome::Saved);

        assert_eq!(picker.prompts(), vec![("Artist - Debut".to_string(), 2)]);
        assert_eq!(
            store.writes().iter().map(|(_, dims)| *dims).collect::<Vec<_>>(),
            vec![(700, 700), (700, 700)]
        );
    }

    #[test]
    fn test_manual_decline_records_no_selection() {
        let store = Arc::new(MemoryCoverStore::default());
        let resolver = resolver(&[], &store, settings(false, true));
        let picker = ScriptedPicker::answering(&[None]);

        let outcome = resolver.select(
            &track_in("/music/a", "01", "Debut"),
            &[solid_cover(10, 10)],
            &LastCoverCache::new(true),
            &picker,
        );
        assert_eq!(outcome, TrackOutcome::NoneSelected);
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_collect_settles_tracks_that_need_no_search() {
        let provider = Arc::new(ScriptedProvider::images(ProviderKind::Itunes, &[(10, 10)]));
        let store = Arc::new(MemoryCoverStore::default());
        let resolver = resolver(&[Arc::clone(&provider)], &store, settings(false, true));

        assert!(matches!(
            resolver.collect_candidates(&covered_track_in("/music/a", "01", "Debut"), || None),
            Collection::Settled(TrackOutcome::AlreadyHasCover)
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn test_skip_rules_win_over_parked_album_candidates() {
        let provider = Arc::new(ScriptedProvider::images(ProviderKind::Itunes, &[(10, 10)]));
        let store = Arc::new(MemoryCoverStore::default());
        let resolver = resolver(&[Arc::clone(&provider)], &store, settings(false, true));

        assert!(matches!(
            resolver.collect_candidates(&covered_track_in("/music/a", "02", "Debut"), || Some(3)),
            Collection::Settled(TrackOutcome::AlreadyHasCover)
        ));
        assert!(matches!(
            resolver.collect_candidates(&read_only_track_in("/music/a", "03", "Debut"), || Some(3)),
            Collection::Settled(TrackOutcome::WriteProtected)
        ));
        assert!(matches!(
            resolver.collect_candidates(&track_in("/music/a", "04", "Debut"), || Some(3)),
            Collection::Settled(TrackOutcome::CandidatesCollected(3))
        ));
        assert_eq!(provider.calls(), 0);
    }
}
