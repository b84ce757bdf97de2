use std::time::Duration;

use super::events::ChatMessage;

/// How long after the first buffered message a flush runs. Batching at
/// this granularity bounds re-render frequency under bursty traffic
/// while keeping perceived latency low.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Confirmed-log cap for long-lived sessions. Oldest entries drop first.
pub const LOG_CAP: usize = 500;

/// The confirmed message log. Mutations go through the dedup merge so
/// the displayed log never shows two entries for the same logical
/// message.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the log with server history (initial forum fetch).
    pub fn seed(&mut self, mut history: Vec<ChatMessage>) {
        if history.len() > LOG_CAP {
            history.drain(..history.len() - LOG_CAP);
        }
        self.entries = history;
    }

    pub fn contains_logical(&self, msg: &ChatMessage) -> bool {
        self.entries.iter().any(|m| m.is_same_logical(msg))
    }

    /// Append an optimistic local message without dedup — the send
    /// pipeline guarantees it is new.
    pub fn append_optimistic(&mut self, msg: ChatMessage) {
        self.entries.push(msg);
        self.truncate_to_cap();
    }

    /// Remove a rolled-back optimistic entry. Returns whether anything
    /// was removed.
    pub fn remove_by_id(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|m| m.id != id);
        self.entries.len() != before
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn truncate_to_cap(&mut self) -> bool {
        if self.entries.len() > LOG_CAP {
            self.entries.drain(..self.entries.len() - LOG_CAP);
            true
        } else {
            false
        }
    }
}

/// Transient queue of not-yet-committed inbound messages. At most one
/// flush is scheduled at a time; the buffer is empty immediately after
/// every flush.
#[derive(Debug, Default)]
pub struct IngestBuffer {
    pending: Vec<ChatMessage>,
    flush_scheduled: bool,
}

impl IngestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound message. Returns `true` when the caller must
    /// schedule a flush (none is currently pending).
    pub fn offer(&mut self, msg: ChatMessage) -> bool {
        self.pending.push(msg);
        if self.flush_scheduled {
            false
        } else {
            self.flush_scheduled = true;
            true
        }
    }

    /// Merge all buffered messages into the log, preserving arrival
    /// order and dropping duplicates. Returns whether the log changed.
    /// The buffer is empty and the scheduled-flush flag cleared after.
    pub fn flush_into(&mut self, log: &mut MessageLog) -> bool {
        let mut changed = false;
        for msg in self.pending.drain(..) {
            // Checking against the log as we append also dedups within
            // the buffer itself.
            if !log.contains_logical(&msg) {
                log.entries.push(msg);
                changed = true;
            }
        }
        if log.truncate_to_cap() {
            changed = true;
        }
        self.flush_scheduled = false;
        changed
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, Utc};

    fn msg(id: &str, sender: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            sender: sender.into(),
            sender_name: sender.into(),
            sender_img: None,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_duplicate_inbound_message_kept_once() {
        let mut log = MessageLog::new();
        let mut buffer = IngestBuffer::new();

        buffer.offer(msg("m1", "alice", "hi"));
        buffer.offer(msg("m1", "alice", "hi"));
        assert!(buffer.flush_into(&mut log));
        assert_eq!(log.len(), 1);

        // The same message arriving again in a later cycle is also dropped
        buffer.offer(msg("m1", "alice", "hi"));
        assert!(!buffer.flush_into(&mut log));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_dedup_by_sender_content_window() {
        let mut log = MessageLog::new();
        let mut buffer = IngestBuffer::new();

        let optimistic = msg("1700000000123", "alice", "hi");
        log.append_optimistic(optimistic.clone());

        let mut confirmed = msg("m1", "alice", "hi");
        confirmed.timestamp = optimistic.timestamp + TimeDelta::milliseconds(400);
        buffer.offer(confirmed);
        buffer.flush_into(&mut log);

        assert_eq!(log.len(), 1, "broadcast must fold into the optimistic entry");
    }

    #[test]
    fn test_distinct_messages_preserve_arrival_order() {
        let mut log = MessageLog::new();
        let mut buffer = IngestBuffer::new();

        buffer.offer(msg("m1", "alice", "one"));
        buffer.offer(msg("m2", "bob", "two"));
        buffer.offer(msg("m3", "alice", "three"));
        buffer.flush_into(&mut log);

        let contents: Vec<&str> = log.entries().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_offer_schedules_flush_exactly_once() {
        let mut buffer = IngestBuffer::new();
        assert!(buffer.offer(msg("m1", "a", "x")));
        assert!(!buffer.offer(msg("m2", "a", "y")));
        assert!(!buffer.offer(msg("m3", "a", "z")));

        let mut log = MessageLog::new();
        buffer.flush_into(&mut log);
        assert_eq!(log.len(), 3);

        // After a flush the flag is reset and the next offer schedules again
        assert!(buffer.offer(msg("m4", "a", "w")));
    }

    #[test]
    fn test_buffer_empty_after_flush() {
        let mut buffer = IngestBuffer::new();
        let mut log = MessageLog::new();
        buffer.offer(msg("m1", "a", "x"));
        buffer.flush_into(&mut log);
        assert!(!buffer.has_pending());
    }

    #[test]
    fn test_log_cap_drops_oldest_first() {
        let mut log = MessageLog::new();
        let mut buffer = IngestBuffer::new();

        for i in 0..LOG_CAP + 25 {
            let mut m = msg(&format!("m{}", i), "alice", &format!("msg {}", i));
            // Spread timestamps so the content-window rule never collapses them
            m.timestamp = Utc::now() + TimeDelta::seconds(i as i64 * 2);
            buffer.offer(m);
        }
        buffer.flush_into(&mut log);

        assert_eq!(log.len(), LOG_CAP);
        assert_eq!(log.entries()[0].id, "m25", "oldest entries drop first");
        assert_eq!(log.entries()[LOG_CAP - 1].id, format!("m{}", LOG_CAP + 24));
    }

    #[test]
    fn test_seed_applies_cap() {
        let mut log = MessageLog::new();
        let history: Vec<ChatMessage> = (0..LOG_CAP + 10)
            .map(|i| {
                let mut m = msg(&format!("h{}", i), "alice", &format!("old {}", i));
                m.timestamp = Utc::now() + TimeDelta::seconds(i as i64 * 2);
                m
            })
            .collect();
        log.seed(history);
        assert_eq!(log.len(), LOG_CAP);
        assert_eq!(log.entries()[0].id, "h10");
    }

    #[test]
    fn test_remove_by_id() {
        let mut log = MessageLog::new();
        log.append_optimistic(msg("t1", "alice", "hello"));
        assert!(log.remove_by_id("t1"));
        assert!(log.is_empty());
        assert!(!log.remove_by_id("t1"));
    }
}
