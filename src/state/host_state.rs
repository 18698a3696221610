use std::time::{Duration, Instant};

/// Tracks requests made to one host
///
/// The HTTP fetcher keeps one of these per host to space requests by a
/// minimum delay, independent of how many crawl workers are running.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests made to this host in the current process
    pub request_count: u32,

    /// Timestamp of the last request to this host
    pub last_request_time: Option<Instant>,
}

impl HostState {
    /// Creates a new HostState with no recorded requests
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request was made to this host
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        // `last_request_time` may lie in the future when a slot was reserved
        let ready_at = self.last_request_time? + min_delay;
        if ready_at > now {
            Some(ready_at - now)
        } else {
            None
        }
    }
}
