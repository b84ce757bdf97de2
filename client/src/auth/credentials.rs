use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The signed-in user as persisted by the login flow. Stamps sender
/// identity onto optimistic messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Durable client-side auth state: bearer token plus the serialized
/// user object, written by the (out-of-scope) login flow and read when
/// a session is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub user: StoredUser,
}

impl Credentials {
    /// Read credentials from disk. Absence is an error — a session
    /// cannot be constructed without a signed-in user.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("no credentials at {}", path.display()))?;
        let creds: Credentials = serde_json::from_str(&contents)
            .with_context(|| format!("malformed credentials file {}", path.display()))?;
        if creds.token.trim().is_empty() {
            anyhow::bail!("credentials file {} has an empty token", path.display());
        }
        Ok(creds)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write credentials to {}", path.display()))
    }

    pub fn clear(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials {
            token: "tok-123".into(),
            user: StoredUser {
                id: "u1".into(),
                name: "alice".into(),
                avatar_url: Some("https://cdn.linkup.example/a.png".into()),
            },
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("linkup-creds-{}", uuid::Uuid::new_v4()));
        let path = dir.join("credentials.json");
        let creds = sample();
        creds.save(&path).unwrap();

        let loaded = Credentials::load(&path).unwrap();
        assert_eq!(loaded.token, "tok-123");
        assert_eq!(loaded.user.name, "alice");

        Credentials::clear(&path).unwrap();
        assert!(Credentials::load(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(Credentials::load("/nonexistent/linkup-credentials.json").is_err());
    }

    #[test]
    fn test_empty_token_rejected() {
        let dir = std::env::temp_dir().join(format!("linkup-creds-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("credentials.json");
        std::fs::write(
            &path,
            r#"{"token":"  ","user":{"id":"u1","name":"alice"}}"#,
        )
        .unwrap();
        assert!(Credentials::load(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
