use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ApiError;
use crate::session::events::{Attendee, ChatMessage};

/// Timeout for the forum-details fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Tighter timeout used for the single automatic fetch retry.
pub const FETCH_RETRY_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for persisting a message.
pub const POST_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for the join-forum request.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Forum detail as returned by the backend. Seeds the initial message
/// log and attendee roster.
#[derive(Debug, Clone, Deserialize)]
pub struct ForumDetail {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Envelope the backend wraps write responses in. A present `error`
/// field is an application-level failure even on a 200.
#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(default)]
    error: Option<String>,
}

/// The REST boundary the session depends on. A trait so tests can
/// script persistence outcomes without a server.
pub trait ForumApi: Send + Sync + 'static {
    /// Fetch forum detail. Retries once on a pure network failure
    /// (with a tighter timeout) before giving up.
    fn fetch_forum(
        &self,
        forum_id: &str,
    ) -> impl Future<Output = Result<ForumDetail, ApiError>> + Send;

    /// Persist one message. Single attempt — the send pipeline owns
    /// its own delayed retry.
    fn post_message(
        &self,
        forum_id: &str,
        content: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Request forum membership, optionally with a passcode. Retries
    /// once on a pure network failure; application errors (duplicate
    /// join, invalid passcode) are returned as-is.
    fn join_forum(
        &self,
        forum_id: &str,
        passcode: Option<&str>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// reqwest-backed implementation talking to the LinkUp backend.
pub struct HttpForumApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpForumApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    fn classify(e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(e.to_string())
        }
    }

    async fn get_forum_once(
        &self,
        forum_id: &str,
        timeout: Duration,
    ) -> Result<ForumDetail, ApiError> {
        let url = format!("{}/forums/{}", self.base_url, forum_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .timeout(timeout)
            .send()
            .await
            .map_err(Self::classify)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Application(format!(
                "forum fetch failed ({}): {}",
                status, body
            )));
        }

        resp.json::<ForumDetail>()
            .await
            .map_err(|e| ApiError::Network(format!("malformed forum detail: {}", e)))
    }

    async fn post_write(
        &self,
        url: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = resp.status();
        let envelope: WriteResponse = resp
            .json()
            .await
            .unwrap_or(WriteResponse { error: None });

        if let Some(error) = envelope.error {
            return Err(ApiError::Application(error));
        }
        if !status.is_success() {
            return Err(ApiError::Application(format!("request failed ({})", status)));
        }
        Ok(())
    }
}

impl ForumApi for HttpForumApi {
    async fn fetch_forum(&self, forum_id: &str) -> Result<ForumDetail, ApiError> {
        match self.get_forum_once(forum_id, FETCH_TIMEOUT).await {
            Ok(detail) => Ok(detail),
            Err(e) if e.is_network_failure() => {
                warn!(%forum_id, error = %e, "forum fetch failed, retrying once");
                self.get_forum_once(forum_id, FETCH_RETRY_TIMEOUT).await
            }
            Err(e) => Err(e),
        }
    }

    async fn post_message(&self, forum_id: &str, content: &str) -> Result<(), ApiError> {
        let url = format!("{}/forums/{}/messages", self.base_url, forum_id);
        self.post_write(
            &url,
            serde_json::json!({ "content": content }),
            POST_MESSAGE_TIMEOUT,
        )
        .await
    }

    async fn join_forum(&self, forum_id: &str, passcode: Option<&str>) -> Result<(), ApiError> {
        let url = format!("{}/forums/{}/join", self.base_url, forum_id);
        let body = match passcode {
            Some(code) => serde_json::json!({ "passcode": code }),
            None => serde_json::json!({}),
        };
        match self.post_write(&url, body.clone(), JOIN_TIMEOUT).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_network_failure() => {
                warn!(%forum_id, error = %e, "join request failed, retrying once");
                self.post_write(&url, body, JOIN_TIMEOUT).await
            }
            Err(e) => Err(e),
        }
    }
}
