use crate::types::{DisarmError, DisarmResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Stored OAuth credentials, as written by the engine's `authenticate` tooling
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub refresh_token: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("refresh_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("project", &self.project)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Credentials {
    /// `~/.config/earthengine/credentials`, on every platform
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("earthengine").join("credentials"))
    }

    pub fn read<P: AsRef<Path>>(path: P) -> DisarmResult<Self> {
        let path = path.as_ref();
        log::debug!("Reading credentials from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DisarmError::Auth(format!("no credentials found at {}", path.display()))
            } else {
                DisarmError::Io(e)
            }
        })?;

        let credentials: Credentials = serde_json::from_str(&content).map_err(|e| {
            DisarmError::Auth(format!("malformed credentials file {}: {}", path.display(), e))
        })?;

        if credentials.refresh_token.trim().is_empty() {
            return Err(DisarmError::Auth(format!(
                "credentials file {} has an empty refresh token",
                path.display()
            )));
        }
        Ok(credentials)
    }
}

/// Short-lived bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_credentials() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"refresh_token": "1//abc", "client_id": "id", "client_secret": "s", "project": "disarm-demo"}}"#
        )
        .unwrap();

        let creds = Credentials::read(file.path()).unwrap();
        assert_eq!(creds.refresh_token, "1//abc");
        assert_eq!(creds.project.as_deref(), Some("disarm-demo"));
        assert!(creds.scopes.is_empty());
        assert!(!format!("{:?}", creds).contains("1//abc"));
    }

    #[test]
    fn test_missing_credentials_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Credentials::read(dir.path().join("credentials"));
        assert!(matches!(result, Err(DisarmError::Auth(_))));
    }

    #[test]
    fn test_malformed_credentials_is_auth_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"refresh_token": ""}}"#).unwrap();
        assert!(matches!(Credentials::read(file.path()), Err(DisarmError::Auth(_))));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(Credentials::read(file.path()), Err(DisarmError::Auth(_))));
    }

    #[test]
    fn test_default_path_under_home_config() {
        if let (Some(path), Some(home)) = (Credentials::default_path(), dirs::home_dir()) {
            assert!(path.starts_with(&home));
            assert!(path.ends_with(".config/earthengine/credentials"));
        }
    }

    #[test]
    fn test_token_expiry() {
        let token = AccessToken::new("ya29.x", 3600);
        assert!(!token.is_expired(Utc::now()));
        assert!(token.is_expired(Utc::now() + Duration::seconds(3601)));
        assert!(!format!("{:?}", token).contains("ya29"));
    }
}
