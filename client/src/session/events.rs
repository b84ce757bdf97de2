use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How close two timestamps may be for two messages with the same sender
/// and content to count as the same logical message.
pub const DEDUP_WINDOW_MS: i64 = 1_000;

/// One chat line as displayed in the forum log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned identifier once persisted. While a message is
    /// optimistic (sent but unconfirmed) this is a client-generated
    /// unix-millis string.
    pub id: String,
    /// User id of the sender.
    pub sender: String,
    pub sender_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_img: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// The dedup rule: identical id, or same sender and content with
    /// timestamps within one second of each other. This is what folds an
    /// optimistic entry into its server-confirmed broadcast.
    pub fn is_same_logical(&self, other: &ChatMessage) -> bool {
        if self.id == other.id {
            return true;
        }
        self.sender == other.sender
            && self.content == other.content
            && (self.timestamp - other.timestamp)
                .num_milliseconds()
                .abs()
                < DEDUP_WINDOW_MS
    }
}

/// A forum member with presence status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub user_id: String,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// `online`/`away`/`offline` or free text from the backend.
    #[serde(default)]
    pub status: String,
}

/// Event pushed by the server over the real-time transport. Validated at
/// the boundary by serde — malformed or unknown frames never reach
/// session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A message was posted to the forum (including echoes of our own).
    NewMessage { message: ChatMessage },

    /// A member joined the forum.
    UserJoined { user: Attendee },

    /// A member left the forum.
    UserLeft { user_id: String, user_name: String },

    /// The forum itself was deleted; the session cannot continue.
    ForumDeleted { forum_id: String },

    /// A remote user started or stopped typing.
    Typing {
        user_id: String,
        user_name: String,
        is_typing: bool,
    },

    /// Server-side health report for this connection.
    ConnectionHealth {
        healthy: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Acknowledgment of a health-check ping, echoing its timestamp.
    Pong { timestamp: i64 },
}

/// Signal emitted by the client over the real-time transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinForum { forum_id: String },

    LeaveForum { forum_id: String },

    Typing {
        forum_id: String,
        user_id: String,
        user_name: String,
        is_typing: bool,
    },

    /// Health-check ping carrying the send time in unix millis.
    Ping { timestamp: i64 },
}
