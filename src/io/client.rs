use crate::core::expr::Expression;
use crate::io::export::{ExportJob, ExportRequest};
use crate::io::session::Session;
use crate::types::{DisarmError, DisarmResult};
use serde::{Deserialize, Serialize};
use chrono::Utc;
use serde_json::{json, Value as Json};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://earthengine.googleapis.com/v1";

/// Engine statuses that mean the session is not (or no longer) authorized
pub const ENGINE_AUTH_STATUSES: &[u16] = &[401, 403];

/// Tile source for a rendered map layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTiles {
    pub name: String,
    /// URL with `{z}`, `{x}`, `{y}` placeholders
    pub url_template: String,
}

/// Operations issued against the remote engine
pub trait RemoteEngine {
    /// Register a (visualized) image and return its tile source
    fn create_map(&self, expression: &Expression) -> DisarmResult<MapTiles>;

    /// Submit an export job; does not wait for it
    fn start_export(&self, request: &ExportRequest) -> DisarmResult<ExportJob>;
}

/// Blocking REST client for the remote engine
pub struct EarthEngineClient {
    http: reqwest::blocking::Client,
    session: Session,
    base_url: String,
}

#[derive(Deserialize)]
struct MapResponse {
    name: String,
}

impl EarthEngineClient {
    pub fn new(session: Session, timeout: Duration) -> DisarmResult<Self> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            session,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn project_url(&self, method: &str) -> String {
        format!("{}/projects/{}/{}", self.base_url, self.session.project, method)
    }

    fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> DisarmResult<Json> {
        let token = self.session.token();
        if token.is_expired(Utc::now()) {
            return Err(DisarmError::Auth(format!(
                "access token expired at {}",
                token.expires_at()
            )));
        }

        log::debug!("POST {}", url);
        let response = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(body)
            .send()?;

        let status = response.status();
        let text = response.text()?;
        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }

        Err(classify_status(status.as_u16(), &text, ENGINE_AUTH_STATUSES))
    }
}

/// Map a failed response to an error: `auth_codes` become [`DisarmError::Auth`]
/// (eligible for re-authentication), everything else [`DisarmError::Remote`]
pub(crate) fn classify_status(status: u16, body: &str, auth_codes: &[u16]) -> DisarmError {
    let message = remote_error_message(body);
    if auth_codes.contains(&status) {
        DisarmError::Auth(format!("{} ({})", message, status))
    } else {
        DisarmError::Remote { status, message }
    }
}

/// Extract the error message from an engine or OAuth error body, falling
/// back to the raw text
pub(crate) fn remote_error_message(body: &str) -> String {
    serde_json::from_str::<Json>(body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error_description"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

impl RemoteEngine for EarthEngineClient {
    fn create_map(&self, expression: &Expression) -> DisarmResult<MapTiles> {
        let body = json!({
            "expression": expression,
            "fileFormat": "AUTO_JPEG_PNG",
        });
        let response: MapResponse = serde_json::from_value(self.post(&self.project_url("maps"), &body)?)?;
        let url_template = format!("{}/{}/tiles/{{z}}/{{x}}/{{y}}", self.base_url, response.name);
        log::debug!("Map registered: {}", response.name);
        Ok(MapTiles {
            name: response.name,
            url_template,
        })
    }

    fn start_export(&self, request: &ExportRequest) -> DisarmResult<ExportJob> {
        let response = self.post(&self.project_url("image:export"), request)?;
        Ok(serde_json::from_value(response)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::credentials::AccessToken;

    #[test]
    fn test_remote_error_message() {
        let body = r#"{"error": {"code": 400, "message": "Image.load: Image asset 'X' not found.", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(remote_error_message(body), "Image.load: Image asset 'X' not found.");
        assert_eq!(remote_error_message("  Bad Gateway \n"), "Bad Gateway");
        let oauth = r#"{"error": "invalid_grant", "error_description": "Token has been expired or revoked."}"#;
        assert_eq!(remote_error_message(oauth), "Token has been expired or revoked.");
    }

    #[test]
    fn test_engine_status_classification() {
        let body = r#"{"error": {"code": 401, "message": "Request had invalid authentication credentials."}}"#;
        for status in [401, 403] {
            match classify_status(status, body, ENGINE_AUTH_STATUSES) {
                DisarmError::Auth(message) => {
                    assert!(message.contains("invalid authentication credentials"))
                }
                other => panic!("{} classified as {:?}", status, other),
            }
        }
        for status in [400, 404, 429, 500, 503] {
            assert!(matches!(
                classify_status(status, body, ENGINE_AUTH_STATUSES),
                DisarmError::Remote { status: s, .. } if s == status
            ));
        }
    }

    #[test]
    fn test_expired_token_is_auth_error_before_sending() {
        let session = Session::new("disarm-demo", AccessToken::new("t", -1));
        // nothing listens here; an attempted request would be an Http error
        let client = EarthEngineClient::new(session, Duration::from_secs(1))
            .unwrap()
            .with_base_url("http://127.0.0.1:9/v1");
        let result = client.create_map(&Expression::encode(&crate::core::expr::Value::Number(1.0)));
        assert!(matches!(result, Err(DisarmError::Auth(_))));
    }

    #[test]
    fn test_project_url() {
        let session = Session::new("disarm-demo", AccessToken::new("t", 60));
        let client = EarthEngineClient::new(session, Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://localhost:9000/v1/");
        assert_eq!(
            client.project_url("image:export"),
            "http://localhost:9000/v1/projects/disarm-demo/image:export"
        );
    }
}
