//! OAuth credentials for the calendar API
//!
//! Lifecycle: `CredentialStore::acquire` loads and validates the persisted
//! token (refreshing it when expired), `access_token` refreshes on demand,
//! `release` persists the latest token on shutdown. Interactive consent is
//! only done by [`authorize`], run from the `calendar-auth` command.

use super::CalendarError;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Treat tokens this close to expiry as expired
const EXPIRY_SKEW_SECS: i64 = 60;

/// Persisted authorized-user token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

impl StoredToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty()
            && self
                .expiry
                .is_some_and(|expiry| expiry - Duration::seconds(EXPIRY_SKEW_SECS) > now)
    }

    fn apply(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.access_token = response.access_token;
        self.expiry = response.expires_in.map(|secs| now + Duration::seconds(secs));
        if let Some(refresh) = response.refresh_token {
            self.refresh_token = Some(refresh);
        }
    }
}

/// OAuth client registration, as downloaded from the cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self, CalendarError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CalendarError::Credentials(format!(
                "{}: {e}. Download OAuth client credentials from the cloud console",
                path.display()
            ))
        })?;
        let file: ClientSecretsFile = serde_json::from_str(&json)
            .map_err(|e| CalendarError::Credentials(format!("{}: {e}", path.display())))?;
        file.installed
            .or(file.web)
            .ok_or_else(|| CalendarError::Credentials("no installed or web client".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// Scoped owner of the calendar token
pub struct CredentialStore {
    path: PathBuf,
    http: Client,
    token: Mutex<StoredToken>,
}

impl CredentialStore {
    /// Load the token file and make sure it holds a usable access token
    pub async fn acquire(path: &Path, http: Client) -> Result<Self, CalendarError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            CalendarError::Credentials(format!(
                "{}: {e}. Run `support-desk calendar-auth` first",
                path.display()
            ))
        })?;
        let token: StoredToken = serde_json::from_str(&json)
            .map_err(|e| CalendarError::Credentials(format!("{}: {e}", path.display())))?;

        let store = Self {
            path: path.to_path_buf(),
            http,
            token: Mutex::new(token),
        };
        store.access_token().await?;
        tracing::info!(path = %store.path.display(), "Calendar credentials acquired");
        Ok(store)
    }

    #[cfg(test)]
    pub fn from_token(path: &Path, http: Client, token: StoredToken) -> Self {
        Self {
            path: path.to_path_buf(),
            http,
            token: Mutex::new(token),
        }
    }

    /// Current access token, refreshed and persisted if it has expired
    pub async fn access_token(&self) -> Result<String, CalendarError> {
        let mut token = self.token.lock().await;
        let now = Utc::now();
        if token.is_valid_at(now) {
            return Ok(token.access_token.clone());
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(CalendarError::Auth(
                "token expired and no refresh token; run `support-desk calendar-auth`".to_string(),
            ));
        };

        tracing::info!("Refreshing calendar access token");
        let response = self
            .http
            .post(&token.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", token.client_id.as_str()),
                ("client_secret", token.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CalendarError::Http(e.to_string()))?;

        let refreshed = parse_token_response(response).await?;
        token.apply(refreshed, now);
        persist(&self.path, &token)?;
        Ok(token.access_token.clone())
    }

    /// Persist the latest token; called on shutdown
    pub async fn release(&self) -> Result<(), CalendarError> {
        let token = self.token.lock().await;
        persist(&self.path, &token)?;
        tracing::info!(path = %self.path.display(), "Calendar credentials released");
        Ok(())
    }
}

async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse, CalendarError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| CalendarError::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(CalendarError::Auth(format!("token endpoint returned {status}: {body}")));
    }
    serde_json::from_str(&body).map_err(|e| CalendarError::Auth(format!("bad token response: {e}")))
}

fn persist(path: &Path, token: &StoredToken) -> Result<(), CalendarError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(token)
        .map_err(|e| CalendarError::Credentials(e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Extract `code` and `state` from the loopback redirect request line
fn parse_redirect(request_line: &str) -> Result<(String, String), CalendarError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| CalendarError::Auth("malformed redirect request".to_string()))?;
    let url = Url::parse(&format!("http://localhost{target}"))
        .map_err(|e| CalendarError::Auth(format!("malformed redirect: {e}")))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(CalendarError::Auth(format!("consent denied: {value}"))),
            _ => {}
        }
    }
    match (code, state) {
        (Some(code), Some(state)) => Ok((code, state)),
        _ => Err(CalendarError::Auth("redirect missing code or state".to_string())),
    }
}

/// Installed-app consent flow over a loopback redirect. Prints the consent
/// URL, waits for the browser redirect, exchanges the code and persists the
/// resulting token at `token_path`.
pub async fn authorize(
    credentials_path: &Path,
    token_path: &Path,
    http: &Client,
) -> Result<StoredToken, CalendarError> {
    let secrets = ClientSecrets::load(credentials_path)?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let redirect_uri = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
    let state: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();

    let consent_url = Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", CALENDAR_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state.as_str()),
        ],
    )
    .map_err(|e| CalendarError::Credentials(format!("bad auth_uri: {e}")))?;

    println!("Open this URL in a browser to authorize calendar access:\n\n{consent_url}\n");

    let (mut socket, _) = listener.accept().await?;
    let mut buf = vec![0u8; 8192];
    let n = socket.read(&mut buf).await?;
    let request = String::from_utf8_lossy(buf.get(..n).unwrap_or_default());
    let first_line = request.lines().next().unwrap_or_default();
    let parsed = parse_redirect(first_line);

    let body = if parsed.is_ok() {
        "Authorization complete. You can close this window."
    } else {
        "Authorization failed. Check the terminal."
    };
    let reply = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    socket.write_all(reply.as_bytes()).await?;

    let (code, returned_state) = parsed?;
    if returned_state != state {
        return Err(CalendarError::Auth("state mismatch in redirect".to_string()));
    }

    let response = http
        .post(&secrets.token_uri)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| CalendarError::Http(e.to_string()))?;
    let granted = parse_token_response(response).await?;

    let mut token = StoredToken {
        access_token: String::new(),
        refresh_token: None,
        expiry: None,
        client_id: secrets.client_id,
        client_secret: secrets.client_secret,
        token_uri: secrets.token_uri,
        scopes: vec![CALENDAR_SCOPE.to_string()],
    };
    token.apply(granted, Utc::now());
    persist(token_path, &token)?;
    tracing::info!(path = %token_path.display(), "Calendar token saved");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::utc;

    fn token(expiry: Option<DateTime<Utc>>, refresh: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: "ya29.token".to_string(),
            refresh_token: refresh.map(String::from),
            expiry,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            scopes: vec![CALENDAR_SCOPE.to_string()],
        }
    }

    #[test]
    fn test_validity_uses_skew() {
        let now = utc(2025, 3, 3, 10, 0);
        assert!(token(Some(now + Duration::minutes(5)), None).is_valid_at(now));
        assert!(!token(Some(now + Duration::seconds(30)), None).is_valid_at(now));
        assert!(!token(None, None).is_valid_at(now));
    }

    #[test]
    fn test_apply_keeps_refresh_token_when_not_rotated() {
        let now = utc(2025, 3, 3, 10, 0);
        let mut t = token(None, Some("refresh-1"));
        t.apply(
            TokenResponse {
                access_token: "new".to_string(),
                expires_in: Some(3600),
                refresh_token: None,
            },
            now,
        );
        assert_eq!(t.access_token, "new");
        assert_eq!(t.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(t.expiry, Some(now + Duration::hours(1)));
    }

    #[test]
    fn test_parse_redirect() {
        let (code, state) = parse_redirect("GET /?state=abc&code=4%2F0Ab&scope=x HTTP/1.1").unwrap();
        assert_eq!(code, "4/0Ab");
        assert_eq!(state, "abc");

        assert!(parse_redirect("GET /?error=access_denied&state=abc HTTP/1.1").is_err());
        assert!(parse_redirect("GET /favicon.ico HTTP/1.1").is_err());
        assert!(parse_redirect("").is_err());
    }

    #[test]
    fn test_client_secrets_installed_or_web() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"web": {"client_id": "id", "client_secret": "s"}}"#,
        )
        .unwrap();
        let secrets = ClientSecrets::load(&path).unwrap();
        assert_eq!(secrets.client_id, "id");
        assert_eq!(secrets.token_uri, DEFAULT_TOKEN_URI);

        assert!(matches!(
            ClientSecrets::load(&dir.path().join("missing.json")),
            Err(CalendarError::Credentials(_))
        ));
    }

    #[tokio::test]
    async fn test_acquire_with_valid_token_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let valid = token(Some(Utc::now() + Duration::hours(1)), Some("r"));
        persist(&path, &valid).unwrap();

        let store = CredentialStore::acquire(&path, Client::new()).await.unwrap();
        assert_eq!(store.access_token().await.unwrap(), "ya29.token");

        std::fs::remove_file(&path).unwrap();
        store.release().await.unwrap();
        let saved: StoredToken =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, valid);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_requires_reauth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = CredentialStore::from_token(
            &path,
            Client::new(),
            token(Some(Utc::now() - Duration::hours(1)), None),
        );
        assert!(matches!(store.access_token().await, Err(CalendarError::Auth(_))));
    }

    #[tokio::test]
    async fn test_acquire_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = CredentialStore::acquire(&dir.path().join("none.json"), Client::new()).await;
        assert!(matches!(result, Err(CalendarError::Credentials(_))));
    }
}
