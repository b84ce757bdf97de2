use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Top-level client configuration, loaded from linkup.toml.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerSection,
    pub session: SessionSection,
    pub auth: AuthSection,
}

#[derive(Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// WebSocket endpoint for the real-time transport.
    pub ws_url: String,
    /// Base URL for the REST API.
    pub api_url: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws".into(),
            api_url: "http://localhost:8080/api".into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Reconnect attempts before the session goes terminal.
    /// 0 means unlimited (the transport default).
    pub max_reconnect_attempts: u32,
    /// Evict a remote typer after this many milliseconds without a
    /// fresh signal. 0 disables eviction (matching the original client,
    /// which leaks entries when a typer drops mid-burst).
    pub typing_ttl_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            typing_ttl_ms: 5_000,
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Path to the persisted credentials file (token + user profile).
    pub credentials_path: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            credentials_path: "linkup-credentials.json".into(),
        }
    }
}

impl ClientConfig {
    /// Load config from a TOML file. Falls back to defaults if the file
    /// doesn't exist. Environment variables override TOML values.
    pub fn load(path: &str) -> Self {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .unwrap_or_else(|e| panic!("failed to read config file {}: {}", path, e));
            toml::from_str(&contents)
                .unwrap_or_else(|e| panic!("failed to parse config file {}: {}", path, e))
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("LINKUP_WS_URL") {
            self.server.ws_url = v;
        }
        if let Ok(v) = std::env::var("LINKUP_API_URL") {
            self.server.api_url = v;
        }
        if let Ok(v) = std::env::var("LINKUP_CREDENTIALS") {
            self.auth.credentials_path = v;
        }
        if let Ok(v) = std::env::var("LINKUP_MAX_RECONNECT_ATTEMPTS")
            && let Ok(n) = v.parse()
        {
            self.session.max_reconnect_attempts = n;
        }
        if let Ok(v) = std::env::var("LINKUP_TYPING_TTL_MS")
            && let Ok(ms) = v.parse()
        {
            self.session.typing_ttl_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server.ws_url, "ws://localhost:8080/ws");
        assert_eq!(config.session.max_reconnect_attempts, 0);
        assert_eq!(config.session.typing_ttl_ms, 5_000);
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [server]
            ws_url = "wss://forums.linkup.example/ws"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.ws_url, "wss://forums.linkup.example/ws");
        // Untouched fields fall back to their defaults
        assert_eq!(config.server.api_url, "http://localhost:8080/api");
        assert_eq!(config.session.typing_ttl_ms, 5_000);
    }

    #[test]
    fn test_session_section_parses() {
        let config: ClientConfig = toml::from_str(
            r#"
            [session]
            max_reconnect_attempts = 5
            typing_ttl_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.session.max_reconnect_attempts, 5);
        assert_eq!(config.session.typing_ttl_ms, 0);
    }
}
