use std::time::Duration;
use tokio::time::Instant;

/// Backoff floor — also the delay before the single reconnect scheduled
/// after a server-initiated disconnect.
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(1_000);
/// Backoff ceiling.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_millis(10_000);
/// Health-check cadence while connected.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);
/// Ping round-trips slower than this are logged as a warning.
pub const PING_WARN_LATENCY: Duration = Duration::from_millis(1_000);

/// Lifecycle of the single real-time connection a session owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
}

/// Connection state as surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    /// The delay most recently scheduled (what a UI would display).
    pub reconnect_delay_ms: u64,
    pub detail: Option<String>,
}

/// Reconnect backoff bookkeeping: delay doubles per failed attempt up
/// to the ceiling and resets on success. `max_attempts == 0` means
/// unlimited (the transport default).
#[derive(Debug)]
pub struct ReconnectPolicy {
    attempts: u32,
    delay: Duration,
    last_scheduled: Duration,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            delay: INITIAL_RECONNECT_DELAY,
            last_scheduled: INITIAL_RECONNECT_DELAY,
            max_attempts,
        }
    }

    /// Record a failed attempt. Returns the delay to wait before the
    /// next attempt, or `None` when the attempt budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts != 0 && self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let scheduled = self.delay;
        self.last_scheduled = scheduled;
        self.delay = (self.delay * 2).min(MAX_RECONNECT_DELAY);
        Some(scheduled)
    }

    /// Successful connect: counter and delay reset.
    pub fn on_success(&mut self) {
        self.attempts = 0;
        self.delay = INITIAL_RECONNECT_DELAY;
        self.last_scheduled = INITIAL_RECONNECT_DELAY;
    }

    /// Manual "Retry Now" — a fresh attempt budget.
    pub fn reset(&mut self) {
        self.on_success();
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn display_delay_ms(&self) -> u64 {
        self.last_scheduled.as_millis() as u64
    }
}

/// Tracks the outstanding health-check ping. At most one in flight;
/// a new ping replaces an unanswered one.
#[derive(Debug, Default)]
pub struct PingTracker {
    outstanding: Option<(i64, Instant)>,
}

impl PingTracker {
    pub fn on_sent(&mut self, timestamp: i64, now: Instant) {
        self.outstanding = Some((timestamp, now));
    }

    /// Returns the round-trip latency when the echoed timestamp matches
    /// the outstanding ping. Stale or unknown echoes are ignored.
    pub fn on_pong(&mut self, timestamp: i64, now: Instant) -> Option<Duration> {
        match self.outstanding {
            Some((sent_ts, sent_at)) if sent_ts == timestamp => {
                self.outstanding = None;
                Some(now - sent_at)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence_doubles_to_ceiling() {
        let mut policy = ReconnectPolicy::new(0);
        let delays: Vec<u64> = (0..7)
            .map(|_| policy.next_delay().unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10000, 10000, 10000]);
    }

    #[test]
    fn test_backoff_is_non_decreasing() {
        let mut policy = ReconnectPolicy::new(0);
        let mut prev = 0;
        for _ in 0..20 {
            let d = policy.next_delay().unwrap().as_millis() as u64;
            assert!(d >= prev);
            assert!(d <= 10_000);
            prev = d;
        }
    }

    #[test]
    fn test_success_resets_counter_and_delay() {
        let mut policy = ReconnectPolicy::new(0);
        policy.next_delay();
        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.attempts(), 3);

        policy.on_success();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_delay().unwrap(), INITIAL_RECONNECT_DELAY);
    }

    #[test]
    fn test_exhaustion_with_capped_attempts() {
        let mut policy = ReconnectPolicy::new(2);
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        // Still exhausted until reset
        assert!(policy.next_delay().is_none());
        policy.reset();
        assert!(policy.next_delay().is_some());
    }

    #[test]
    fn test_unlimited_policy_never_exhausts() {
        let mut policy = ReconnectPolicy::new(0);
        for _ in 0..1000 {
            assert!(policy.next_delay().is_some());
        }
    }

    #[test]
    fn test_ping_tracker_matches_echo() {
        let mut tracker = PingTracker::default();
        let start = Instant::now();
        tracker.on_sent(42, start);
        let latency = tracker.on_pong(42, start + Duration::from_millis(250));
        assert_eq!(latency, Some(Duration::from_millis(250)));
        // Answered — a second echo is ignored
        assert_eq!(tracker.on_pong(42, start + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_ping_tracker_ignores_stale_echo() {
        let mut tracker = PingTracker::default();
        let start = Instant::now();
        tracker.on_sent(1, start);
        tracker.on_sent(2, start + Duration::from_secs(30));
        // Echo for the replaced ping does not count
        assert_eq!(tracker.on_pong(1, start + Duration::from_secs(31)), None);
        assert!(tracker.on_pong(2, start + Duration::from_secs(31)).is_some());
    }
}
