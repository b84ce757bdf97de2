use std::time::Duration;

use chrono::Utc;

use crate::auth::credentials::StoredUser;
use crate::error::ApiError;

use super::events::ChatMessage;

/// Delay before the single automatic retry of a send that failed with a
/// pure network failure.
pub const SEND_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Build the locally-synthesized message appended before the persist
/// request completes. The temporary id is the current unix-millis
/// timestamp; the server broadcast later folds this entry away via the
/// dedup rule.
pub fn make_optimistic(user: &StoredUser, content: &str) -> ChatMessage {
    let now = Utc::now();
    ChatMessage {
        id: now.timestamp_millis().to_string(),
        sender: user.id.clone(),
        sender_name: user.name.clone(),
        sender_img: user.avatar_url.clone(),
        content: content.to_string(),
        timestamp: now,
    }
}

/// What the session must do with a completed persist request.
#[derive(Debug, PartialEq)]
pub enum PersistResolution {
    /// Persisted — leave the optimistic entry for the broadcast to
    /// supersede.
    Keep,
    /// Remove the optimistic entry and surface the notice.
    Rollback { notice: String },
    /// Remove the optimistic entry, surface the notice, and retry the
    /// same send once after `SEND_RETRY_DELAY`.
    RollbackAndRetry { notice: String },
}

/// Route a persist outcome. Application errors are never retried; a
/// pure network failure earns exactly one automatic retry.
pub fn resolve(outcome: Result<(), ApiError>, is_retry: bool) -> PersistResolution {
    match outcome {
        Ok(()) => PersistResolution::Keep,
        Err(ApiError::Application(msg)) => PersistResolution::Rollback {
            notice: format!("Message rejected: {}", msg),
        },
        Err(e) if !is_retry => PersistResolution::RollbackAndRetry {
            notice: format!("Message failed to send ({}); retrying…", e),
        },
        Err(e) => PersistResolution::Rollback {
            notice: format!("Message failed to send ({})", e),
        },
    }
}
