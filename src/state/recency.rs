//! Recency gate
//!
//! Decides from stored crawl metadata whether a resource has to be fetched
//! again. Pure functions only; callers supply `now`.

use chrono::{DateTime, Duration, Utc};

/// Default minimum age before an entity is crawled again
pub const DEFAULT_REVISIT_DAYS: u32 = 7;

/// Returns true if a resource last crawled at `last_crawled` must be refreshed
///
/// A resource that was never crawled always needs a refresh. Otherwise it is
/// due once `interval` has fully elapsed.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use trope_atlas::needs_refresh;
///
/// let now = Utc::now();
/// assert!(needs_refresh(None, now, Duration::days(7)));
/// assert!(!needs_refresh(Some(now - Duration::days(1)), now, Duration::days(7)));
/// assert!(needs_refresh(Some(now - Duration::days(7)), now, Duration::days(7)));
/// ```
pub fn needs_refresh(
    last_crawled: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
) -> bool {
    match last_crawled {
        None => true,
        Some(last) => now - last >= interval,
    }
}

/// Converts the configured interval in days to a chrono duration
pub fn revisit_interval(days: u32) -> Duration {
    Duration::days(i64::from(days))
}
