use std::sync::Arc;

use dashmap::DashMap;

use super::events::Attendee;

/// Forum members with presence, keyed by user id so a join broadcast
/// can never duplicate an existing attendee. Shared between the session
/// actor (writes) and the handle (snapshot reads).
#[derive(Clone, Default)]
pub struct Roster {
    inner: Arc<DashMap<String, Attendee>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace contents with the attendee list from the forum fetch.
    pub fn seed(&self, attendees: Vec<Attendee>) {
        self.inner.clear();
        for a in attendees {
            self.inner.insert(a.user_id.clone(), a);
        }
    }

    /// Add a joining attendee. Returns `false` when the user id is
    /// already present (duplicate join broadcast).
    pub fn join(&self, attendee: Attendee) -> bool {
        if self.inner.contains_key(&attendee.user_id) {
            return false;
        }
        self.inner.insert(attendee.user_id.clone(), attendee);
        true
    }

    /// Remove a leaving attendee. Returns the removed entry, if any.
    pub fn leave(&self, user_id: &str) -> Option<Attendee> {
        self.inner.remove(user_id).map(|(_, a)| a)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Stable snapshot, sorted by display name.
    pub fn snapshot(&self) -> Vec<Attendee> {
        let mut attendees: Vec<Attendee> =
            self.inner.iter().map(|e| e.value().clone()).collect();
        attendees.sort_by(|a, b| a.user_name.cmp(&b.user_name));
        attendees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attendee(id: &str, name: &str) -> Attendee {
        Attendee {
            user_id: id.into(),
            user_name: name.into(),
            avatar_url: None,
            status: "online".into(),
        }
    }

    #[test]
    fn test_duplicate_join_ignored() {
        let roster = Roster::new();
        assert!(roster.join(attendee("u1", "alice")));
        assert!(!roster.join(attendee("u1", "alice")));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_leave_removes_and_reports() {
        let roster = Roster::new();
        roster.join(attendee("u1", "alice"));
        assert_eq!(roster.leave("u1").map(|a| a.user_name), Some("alice".into()));
        assert!(roster.leave("u1").is_none());
        assert!(roster.is_empty());
    }

    #[test]
    fn test_snapshot_sorted_by_name() {
        let roster = Roster::new();
        roster.join(attendee("u3", "carol"));
        roster.join(attendee("u1", "alice"));
        roster.join(attendee("u2", "bob"));
        let names: Vec<String> = roster.snapshot().into_iter().map(|a| a.user_name).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_seed_replaces_contents() {
        let roster = Roster::new();
        roster.join(attendee("u9", "zoe"));
        roster.seed(vec![attendee("u1", "alice"), attendee("u2", "bob")]);
        assert_eq!(roster.len(), 2);
        assert!(roster.leave("u9").is_none());
    }
}
