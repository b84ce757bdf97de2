use std::time::Duration;
use tokio::time::Instant;

/// Idle window after the last keystroke before a stop signal fires.
pub const TYPING_IDLE: Duration = Duration::from_secs(2);
/// How often the remote roster is swept for stale entries.
pub const TYPING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
/// At most this many per-user indicators are surfaced.
pub const MAX_TYPING_INDICATORS: usize = 3;

/// Debounces local keystrokes into one start signal per burst and one
/// stop signal when the burst ends (idle timeout or message send).
#[derive(Debug, Default)]
pub struct TypingDebounce {
    signaled: bool,
}

/// What the session must do after a keystroke.
#[derive(Debug, PartialEq, Eq)]
pub struct KeystrokeAction {
    /// Emit `typing=true` now (first non-empty keystroke of a burst).
    pub emit_start: bool,
    /// (Re)arm the idle timer.
    pub arm_idle_timer: bool,
}

impl TypingDebounce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a content change.
    pub fn on_input(&mut self, content: &str) -> KeystrokeAction {
        let emit_start = !content.is_empty() && !self.signaled;
        if emit_start {
            self.signaled = true;
        }
        KeystrokeAction {
            emit_start,
            // Any keystroke during a signaled burst pushes the stop out
            arm_idle_timer: self.signaled,
        }
    }

    /// The idle timer elapsed. Returns whether a stop signal is due.
    pub fn on_idle(&mut self) -> bool {
        std::mem::take(&mut self.signaled)
    }

    /// A message was sent. Returns whether an immediate stop signal is
    /// due; the caller must also cancel the idle timer.
    pub fn on_send(&mut self) -> bool {
        std::mem::take(&mut self.signaled)
    }
}

#[derive(Debug)]
struct TypingEntry {
    user_id: String,
    user_name: String,
    last_signal: Instant,
}

/// Who is currently typing, as seen from remote signals. Entries are
/// refreshed by repeated start signals and removed by stop signals or,
/// defensively, by a TTL sweep — the original client never evicted a
/// typer whose connection dropped mid-burst.
#[derive(Debug)]
pub struct TypingRoster {
    entries: Vec<TypingEntry>,
    self_id: String,
    ttl: Option<Duration>,
}

/// Typing state as surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypingDisplay {
    /// None when nobody is typing; otherwise "`name` is typing…" or
    /// "`N` people are typing…".
    pub text: Option<String>,
    /// Names for per-user indicators, capped at the first three.
    pub indicators: Vec<String>,
}

impl TypingRoster {
    pub fn new(self_id: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            entries: Vec::new(),
            self_id: self_id.into(),
            ttl,
        }
    }

    /// Apply a remote typing signal. Self-echoes are ignored. Returns
    /// whether the roster changed.
    pub fn apply(
        &mut self,
        user_id: &str,
        user_name: &str,
        is_typing: bool,
        now: Instant,
    ) -> bool {
        if user_id == self.self_id {
            return false;
        }
        let existing = self.entries.iter_mut().find(|e| e.user_id == user_id);
        match (existing, is_typing) {
            (Some(entry), true) => {
                entry.last_signal = now;
                false
            }
            (Some(_), false) => {
                self.entries.retain(|e| e.user_id != user_id);
                true
            }
            (None, true) => {
                self.entries.push(TypingEntry {
                    user_id: user_id.into(),
                    user_name: user_name.into(),
                    last_signal: now,
                });
                true
            }
            (None, false) => false,
        }
    }

    /// Evict entries that stopped signaling without a stop event.
    /// Returns whether the roster changed. No-op when the TTL is
    /// disabled.
    pub fn sweep(&mut self, now: Instant) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let before = self.entries.len();
        self.entries.retain(|e| now - e.last_signal < ttl);
        self.entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn needs_sweeping(&self) -> bool {
        self.ttl.is_some() && !self.entries.is_empty()
    }

    pub fn display(&self) -> TypingDisplay {
        let text = match self.entries.len() {
            0 => None,
            1 => Some(format!("{} is typing…", self.entries[0].user_name)),
            n => Some(format!("{} people are typing…", n)),
        };
        let indicators = self
            .entries
            .iter()
            .take(MAX_TYPING_INDICATORS)
            .map(|e| e.user_name.clone())
            .collect();
        TypingDisplay { text, indicators }
    }
}
