//! Remote engine session.
//!
//! [`connect`] first tries the default (cached) session. On an
//! authentication failure it forces exactly one re-authentication and tries
//! again; a second failure is returned to the caller. Any other failure is
//! returned immediately.

use crate::io::client::classify_status;
use crate::io::credentials::{AccessToken, Credentials};
use crate::types::{DisarmError, DisarmResult};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Token endpoint statuses for a rejected or revoked refresh token
pub const TOKEN_AUTH_STATUSES: &[u16] = &[400, 401];

/// Authenticated session against one cloud project
#[derive(Debug, Clone)]
pub struct Session {
    pub project: String,
    token: AccessToken,
}

impl Session {
    pub fn new(project: impl Into<String>, token: AccessToken) -> Self {
        Self {
            project: project.into(),
            token,
        }
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }
}

/// Source of sessions
pub trait Authenticator {
    /// Open a session from whatever credentials are currently cached
    fn initialize(&mut self) -> DisarmResult<Session>;

    /// Discard cached state and authenticate again
    fn authenticate(&mut self) -> DisarmResult<()>;
}

/// Open a session, re-authenticating once on an authentication failure
pub fn connect<A: Authenticator + ?Sized>(auth: &mut A) -> DisarmResult<Session> {
    match auth.initialize() {
        Ok(session) => {
            log::info!("Session initialized for project {}", session.project);
            Ok(session)
        }
        Err(DisarmError::Auth(reason)) => {
            log::warn!("Default session failed: {}. Forcing re-authentication", reason);
            auth.authenticate()?;
            let session = auth.initialize().map_err(|e| match e {
                DisarmError::Auth(reason) => DisarmError::Auth(format!(
                    "session still unavailable after re-authentication: {}",
                    reason
                )),
                other => other,
            })?;
            log::info!("Session initialized for project {} after re-authentication", session.project);
            Ok(session)
        }
        Err(e) => Err(e),
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: i64,
}

fn default_expiry() -> i64 {
    3600
}

/// Refresh-token authenticator backed by a credentials file
pub struct OAuthAuthenticator {
    credentials_path: PathBuf,
    project: Option<String>,
    token_uri: String,
    http: reqwest::blocking::Client,
    credentials: Option<Credentials>,
}

impl OAuthAuthenticator {
    pub fn new(credentials_path: PathBuf, project: Option<String>, timeout: Duration) -> DisarmResult<Self> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            credentials_path,
            project,
            token_uri: TOKEN_URI.to_string(),
            http,
            credentials: None,
        })
    }

    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    fn cached_credentials(&mut self) -> DisarmResult<Credentials> {
        if let Some(credentials) = &self.credentials {
            return Ok(credentials.clone());
        }
        let credentials = Credentials::read(&self.credentials_path)?;
        self.credentials = Some(credentials.clone());
        Ok(credentials)
    }

    fn exchange(&self, credentials: &Credentials) -> DisarmResult<AccessToken> {
        let client_id = credentials.client_id.as_deref().ok_or_else(|| {
            DisarmError::Auth("credentials file has no client_id".to_string())
        })?;
        let client_secret = credentials.client_secret.as_deref().unwrap_or_default();

        log::debug!("Exchanging refresh token at {}", self.token_uri);
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credentials.refresh_token.as_str()),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body, TOKEN_AUTH_STATUSES));
        }

        let token: TokenResponse = response.json()?;
        Ok(AccessToken::new(token.access_token, token.expires_in))
    }
}

impl Authenticator for OAuthAuthenticator {
    fn initialize(&mut self) -> DisarmResult<Session> {
        let credentials = self.cached_credentials()?;
        let project = self
            .project
            .clone()
            .or_else(|| credentials.project.clone())
            .ok_or_else(|| {
                DisarmError::Config("no cloud project configured or stored with credentials".to_string())
            })?;
        let token = self.exchange(&credentials)?;
        Ok(Session::new(project, token))
    }

    fn authenticate(&mut self) -> DisarmResult<()> {
        log::info!("Re-reading credentials from {}", self.credentials_path.display());
        self.credentials = None;
        self.cached_credentials().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted authenticator: each `initialize` pops the next outcome
    struct Scripted {
        outcomes: Vec<DisarmResult<Session>>,
        initialize_calls: usize,
        authenticate_calls: usize,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<DisarmResult<Session>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes,
                initialize_calls: 0,
                authenticate_calls: 0,
            }
        }
    }

    impl Authenticator for Scripted {
        fn initialize(&mut self) -> DisarmResult<Session> {
            self.initialize_calls += 1;
            self.outcomes
                .pop()
                .unwrap_or_else(|| Err(DisarmError::Auth("script exhausted".to_string())))
        }

        fn authenticate(&mut self) -> DisarmResult<()> {
            self.authenticate_calls += 1;
            Ok(())
        }
    }

    fn session() -> DisarmResult<Session> {
        Ok(Session::new("disarm-demo", AccessToken::new("t", 3600)))
    }

    fn auth_failure() -> DisarmResult<Session> {
        Err(DisarmError::Auth("expired".to_string()))
    }

    #[test]
    fn test_first_attempt_succeeds() {
        let mut auth = Scripted::new(vec![session()]);
        assert!(connect(&mut auth).is_ok());
        assert_eq!(auth.initialize_calls, 1);
        assert_eq!(auth.authenticate_calls, 0);
    }

    #[test]
    fn test_non_auth_failure_is_not_retried() {
        let mut auth = Scripted::new(vec![Err(DisarmError::Remote {
            status: 429,
            message: "quota".to_string(),
        })]);
        assert!(matches!(connect(&mut auth), Err(DisarmError::Remote { status: 429, .. })));
        assert_eq!(auth.authenticate_calls, 0);
    }

    #[test]
    fn test_token_exchange_status_classification() {
        let revoked = r#"{"error": "invalid_grant", "error_description": "Token has been expired or revoked."}"#;
        for status in [400, 401] {
            assert!(matches!(
                classify_status(status, revoked, TOKEN_AUTH_STATUSES),
                DisarmError::Auth(_)
            ));
        }
        // an unavailable token endpoint is not worth a re-authentication
        for status in [403, 429, 500, 502] {
            assert!(matches!(
                classify_status(status, "Service Unavailable", TOKEN_AUTH_STATUSES),
                DisarmError::Remote { .. }
            ));
        }
    }

    #[test]
    fn test_missing_client_id_is_auth_error() {
        let mut auth = OAuthAuthenticator::new(
            PathBuf::from("/nonexistent"),
            Some("p".to_string()),
            Duration::from_secs(1),
        )
        .unwrap();
        let creds = Credentials {
            refresh_token: "r".to_string(),
            client_id: None,
            client_secret: None,
            project: None,
            scopes: Vec::new(),
        };
        assert!(matches!(auth.exchange(&creds), Err(DisarmError::Auth(_))));
        // credentials file absent: both attempts fail as authentication errors
        assert!(matches!(connect(&mut auth), Err(DisarmError::Auth(_))));
    }
}
