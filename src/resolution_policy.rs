//! Rules deciding whether a found cover replaces what a track already has.

use crate::config::SearchConfig;

/// Overwrite switches taken from the search config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverwritePolicy {
    pub overwrite_cover: bool,
    pub overwrite_only_if_higher: bool,
}

impl OverwritePolicy {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            overwrite_cover: config.overwrite_cover,
            overwrite_only_if_higher: config.overwrite_only_if_higher,
        }
    }

    /// Tracks that already carry a cover are left alone unless overwriting is on.
    pub fn permits_search(&self, track_has_cover: bool) -> bool {
        !track_has_cover || self.overwrite_cover
    }
}

/// Decides whether `candidate` may replace `existing`, both given as `(width, height)`.
///
/// No existing cover always allows writing. With `overwrite_only_if_higher` the
/// candidate must have strictly more pixels; equal resolution keeps the old cover.
pub fn should_overwrite(
    existing: Option<(u32, u32)>,
    candidate: (u32, u32),
    policy: OverwritePolicy,
) -> bool {
    let Some((existing_width, existing_height)) = existing else {
        return true;
    };
    if policy.overwrite_only_if_higher {
        let existing_area = u64::from(existing_width) * u64::from(existing_height);
        let candidate_area = u64::from(candidate.0) * u64::from(candidate.1);
        return candidate_area > existing_area;
    }
    policy.overwrite_cover
}

#[cfg(test)]
mod tests {
    use super::{should_overwrite, OverwritePolicy};

    const ONLY_HIGHER: OverwritePolicy = OverwritePolicy {
        overwrite_cover: true,
        overwrite_only_if_higher: true,
    };
    const ALWAYS: OverwritePolicy = OverwritePolicy {
        overwrite_cover: true,
        overwrite_only_if_higher: false,
    };
    const NEVER: OverwritePolicy = OverwritePolicy {
        overwrite_cover: false,
        overwrite_only_if_higher: false,
    };

    #[test]
    fn test_missing_existing_cover_always_overwrites() {
        for policy in [ONLY_HIGHER, ALWAYS, NEVER] {
            assert!(should_overwrite(None, (1, 1), policy));
        }
    }

    #[test]
    fn test_only_higher_requires_strictly_larger_area() {
        assert!(should_overwrite(Some((500, 500)), (501, 500), ONLY_HIGHER));
        assert!(!should_overwrite(Some((500, 500)), (500, 500), ONLY_HIGHER));
        assert!(!should_overwrite(Some((500, 500)), (250, 1000), ONLY_HIGHER));
        assert!(!should_overwrite(Some((500, 500)), (499, 500), ONLY_HIGHER));
    }

    #[test]
    fn test_only_higher_is_monotonic_in_candidate_area() {
        let existing = (300, 400);
        let candidates = [
            (100, 100),
            (300, 399),
            (400, 300),
            (200, 600),
            (301, 400),
            (1000, 1000),
        ];
        for candidate in candidates {
            let larger = u64::from(candidate.0) * u64::from(candidate.1) > 300 * 400;
            assert_eq!(
                should_overwrite(Some(existing), candidate, ONLY_HIGHER),
                larger,
                "candidate {candidate:?}"
            );
        }
    }

    #[test]
    fn test_without_only_higher_follows_overwrite_switch() {
        assert!(should_overwrite(Some((1000, 1000)), (10, 10), ALWAYS));
        assert!(!should_overwrite(Some((10, 10)), (1000, 1000), NEVER));
    }

    #[test]
    fn test_permits_search_skips_covered_tracks_unless_overwriting() {
        assert!(NEVER.permits_search(false));
        assert!(!NEVER.permits_search(true));
        assert!(ALWAYS.permits_search(true));
    }
}
