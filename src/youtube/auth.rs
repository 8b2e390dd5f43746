//! OAuth 2.0 installed-app flow for the YouTube Data API.
//!
//! Tokens are kept in `youtube_credentials.json` under the app config
//! directory. A stored token is reused while valid, refreshed when it has
//! expired, and only when neither works is the user sent through the consent
//! screen, with the authorization code delivered to a loopback listener.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::config::{ApiKeys, YouTubeSettings};
use crate::interrupt::ctrlc_received;

pub const UPLOAD_SCOPE: &str = "https://www.googleapis.com/auth/youtube.upload";
pub const READONLY_SCOPE: &str = "https://www.googleapis.com/auth/youtube.readonly";

pub const CREDENTIALS_FILE: &str = "youtube_credentials.json";

/// Tokens this close to expiry are refreshed instead of reused.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// How long to wait for the browser to hit the loopback listener.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

/// A loopback connection that sends no request line within this is dropped.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the consent wait looks for Ctrl+C.
const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(
        "YouTube client credentials not configured (set {} and {})",
        crate::config::YOUTUBE_CLIENT_ID_ENV,
        crate::config::YOUTUBE_CLIENT_SECRET_ENV
    )]
    MissingClientCredentials,

    #[error("YouTube rejected the access token: {0}")]
    Unauthorized(String),

    #[error("Token request failed ({status}): {message}")]
    TokenExchange { status: u16, message: String },

    #[error("Authorization failed: {0}")]
    Consent(String),

    #[error("Invalid OAuth URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid credentials file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Authorization interrupted")]
    Interrupted,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Default location of the credentials file.
pub fn default_credentials_path() -> PathBuf {
    crate::config::app_config_dir().join(CREDENTIALS_FILE)
}

/// Tokens persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl StoredCredentials {
    /// Valid unless it expires within the next minute. Tokens without an
    /// expiry are trusted until the API rejects them.
    pub fn is_valid_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > now + EXPIRY_MARGIN_SECS,
            None => !self.access_token.is_empty(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(now_secs())
    }

    /// `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, AuthError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write the tokens, readable by the owner only on unix.
    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        use std::io::Write;

        crate::util::ensure_parent(path)?;
        let json = serde_json::to_string_pretty(self)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;

        // mode only applies on creation; tighten a file left by an older run
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credentials(self, previous_refresh: Option<&str>) -> StoredCredentials {
        StoredCredentials {
            access_token: self.access_token,
            // refresh responses usually omit the refresh token
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_at: self.expires_in.map(|s| now_secs() + s),
            scopes: self
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

/// Obtains access tokens for the upload API.
pub struct Authenticator {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
    redirect_port: u16,
    credentials_path: PathBuf,
    http_client: reqwest::Client,
}

impl Authenticator {
    /// # Errors
    ///
    /// Returns `AuthError::MissingClientCredentials` if the client id or
    /// secret is not set.
    pub fn new(settings: &YouTubeSettings, keys: &ApiKeys) -> Result<Self, AuthError> {
        let client_id = keys
            .youtube_client_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or(AuthError::MissingClientCredentials)?;
        let client_secret = keys
            .youtube_client_secret
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or(AuthError::MissingClientCredentials)?;

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            client_id,
            client_secret,
            auth_uri: settings.auth_uri.clone(),
            token_uri: settings.token_uri.clone(),
            redirect_port: settings.redirect_port,
            credentials_path: default_credentials_path(),
            http_client,
        })
    }

    pub fn with_credentials_path(mut self, path: PathBuf) -> Self {
        self.credentials_path = path;
        self
    }

    pub fn credentials_path(&self) -> &Path {
        &self.credentials_path
    }

    pub fn redirect_uri(&self) -> String {
        // must name the address the listener is bound to
        format!("http://127.0.0.1:{}/", self.redirect_port)
    }

    /// Consent screen URL.
    pub fn authorization_url(&self, state: &str) -> Result<Url, AuthError> {
        let scopes = format!("{} {}", UPLOAD_SCOPE, READONLY_SCOPE);
        let redirect_uri = self.redirect_uri();
        Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scopes.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::InvalidUrl(e.to_string()))
    }

    /// A usable access token, refreshing or re-authorizing as needed.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        if let Some(stored) = StoredCredentials::load(&self.credentials_path)? {
            if stored.is_valid() {
                log::debug!("Using stored YouTube credentials");
                return Ok(stored.access_token);
            }
            if let Some(refresh_token) = stored.refresh_token.as_deref() {
                match self.refresh(refresh_token).await {
                    Ok(creds) => {
                        creds.save(&self.credentials_path)?;
                        return Ok(creds.access_token);
                    }
                    Err(e) => log::warn!("Token refresh failed, signing in again: {}", e),
                }
            }
        }

        let creds = self.authorize_interactive().await?;
        creds.save(&self.credentials_path)?;
        log::info!("Saved YouTube credentials to {}", self.credentials_path.display());
        Ok(creds.access_token)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredCredentials, AuthError> {
        log::info!("Refreshing YouTube access token");
        let token = self
            .token_request(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        Ok(token.into_credentials(Some(refresh_token)))
    }

    pub async fn exchange_code(&self, code: &str) -> Result<StoredCredentials, AuthError> {
        let redirect_uri = self.redirect_uri();
        let token = self
            .token_request(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .await?;
        Ok(token.into_credentials(None))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self
            .http_client
            .post(&self.token_uri)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::TokenExchange {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn authorize_interactive(&self) -> Result<StoredCredentials, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", self.redirect_port)).await?;
        let state = new_state();
        let url = self.authorization_url(&state)?;

        println!("Open this URL in your browser to authorize YouTube uploads:\n\n{}\n", url);

        let code = tokio::time::timeout(CONSENT_TIMEOUT, receive_code(&listener, &state))
            .await
            .map_err(|_| AuthError::Consent("timed out waiting for the browser".to_string()))??;

        self.exchange_code(&code).await
    }
}

/// Opaque value tying the redirect to this run.
fn new_state() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Wait for the consent redirect on `listener`.
///
/// Each connection is read on its own task, so an idle browser preconnect
/// cannot hold up the real redirect.
async fn receive_code(listener: &TcpListener, state: &str) -> Result<String, AuthError> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(1);

    loop {
        if ctrlc_received() {
            return Err(AuthError::Interrupted);
        }
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let tx = tx.clone();
                let state = state.to_string();
                tokio::spawn(async move {
                    if let Some(result) = handle_redirect(stream, &state).await {
                        let _ = tx.send(result).await;
                    }
                });
            }
            Some(result) = rx.recv() => return result,
            _ = tokio::time::sleep(INTERRUPT_POLL_INTERVAL) => {}
        }
    }
}

/// Answer one loopback request. `None` for anything that is not the redirect.
async fn handle_redirect(mut stream: TcpStream, state: &str) -> Option<Result<String, AuthError>> {
    let mut request_line = String::new();
    let read = {
        let mut reader = BufReader::new(&mut stream);
        tokio::time::timeout(REQUEST_READ_TIMEOUT, reader.read_line(&mut request_line)).await
    };
    match read {
        Ok(Ok(n)) if n > 0 => {}
        Ok(Err(e)) => {
            log::debug!("Loopback connection failed: {}", e);
            return None;
        }
        _ => {
            log::debug!("Dropping idle loopback connection");
            return None;
        }
    }

    // favicon and other stray requests
    if !request_line.contains("code=") && !request_line.contains("error=") {
        let _ = stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await;
        return None;
    }

    let result = parse_redirect(&request_line, state);
    let body = match &result {
        Ok(_) => "Authorization complete. You can close this window.",
        Err(_) => "Authorization failed. Check the terminal for details.",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    Some(result)
}

/// Extract the authorization code from the redirect's request line,
/// e.g. `GET /?state=..&code=4/0Ab.. HTTP/1.1`.
pub fn parse_redirect(request_line: &str, expected_state: &str) -> Result<String, AuthError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AuthError::Consent("malformed redirect request".to_string()))?;
    let url = Url::parse(&format!("http://localhost{}", target))
        .map_err(|e| AuthError::Consent(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => return Err(AuthError::Consent(value.into_owned())),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::Consent("state mismatch".to_string()));
    }
    code.ok_or_else(|| AuthError::Consent("no authorization code in redirect".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn keys(id: Option<&str>, secret: Option<&str>) -> ApiKeys {
        ApiKeys {
            youtube_client_id: id.map(str::to_string),
            youtube_client_secret: secret.map(str::to_string),
            ..ApiKeys::default()
        }
    }

    #[test]
    fn test_missing_client_credentials() {
        let settings = YouTubeSettings::default();
        assert!(matches!(
            Authenticator::new(&settings, &keys(None, Some("s"))),
            Err(AuthError::MissingClientCredentials)
        ));
        assert!(matches!(
            Authenticator::new(&settings, &keys(Some("id"), Some("  "))),
            Err(AuthError::MissingClientCredentials)
        ));
    }

    #[test]
    fn test_authorization_url() {
        let auth = Authenticator::new(&YouTubeSettings::default(), &keys(Some("cid"), Some("sec")))
            .unwrap();
        let url = auth.authorization_url("xyz").unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "cid");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:8080/");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["state"], "xyz");
        assert!(pairs["scope"].contains(UPLOAD_SCOPE));
    }

    #[test]
    fn test_parse_redirect() {
        let line = "GET /?state=abc&code=4%2F0Ab-xyz&scope=s HTTP/1.1\r\n";
        assert_eq!(parse_redirect(line, "abc").unwrap(), "4/0Ab-xyz");

        assert!(matches!(
            parse_redirect(line, "other"),
            Err(AuthError::Consent(_))
        ));
        match parse_redirect("GET /?error=access_denied&state=abc HTTP/1.1", "abc") {
            Err(AuthError::Consent(msg)) => assert_eq!(msg, "access_denied"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_credentials_validity() {
        let creds = StoredCredentials {
            access_token: "t".into(),
            refresh_token: None,
            expires_at: Some(1_000),
            scopes: vec![],
        };
        assert!(creds.is_valid_at(500));
        assert!(!creds.is_valid_at(950));
        assert!(!creds.is_valid_at(2_000));
    }

    #[test]
    fn test_credentials_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CREDENTIALS_FILE);
        assert!(StoredCredentials::load(&path).unwrap().is_none());

        let creds = StoredCredentials {
            access_token: "a".into(),
            refresh_token: Some("r".into()),
            expires_at: Some(42),
            scopes: vec![UPLOAD_SCOPE.into()],
        };
        creds.save(&path).unwrap();
        assert_eq!(StoredCredentials::load(&path).unwrap(), Some(creds));
    }

    #[cfg(unix)]
    #[test]
    fn test_credentials_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let creds = StoredCredentials {
            access_token: "a".into(),
            refresh_token: None,
            expires_at: None,
            scopes: vec![],
        };

        let fresh = dir.path().join(CREDENTIALS_FILE);
        creds.save(&fresh).unwrap();
        let mode = std::fs::metadata(&fresh).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let loose = dir.path().join("old_credentials.json");
        std::fs::write(&loose, "{}").unwrap();
        std::fs::set_permissions(&loose, std::fs::Permissions::from_mode(0o644)).unwrap();
        creds.save(&loose).unwrap();
        let mode = std::fs::metadata(&loose).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(StoredCredentials::load(&loose).unwrap(), Some(creds));
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_redirect() {
        use tokio::io::AsyncReadExt;

        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiting = tokio::spawn(async move { receive_code(&listener, "s1").await });

        // a preconnect that never sends anything
        let _idle = TcpStream::connect(addr).await.unwrap();

        let mut browser = TcpStream::connect(addr).await.unwrap();
        browser
            .write_all(b"GET /?state=s1&code=4%2Fcode HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n")
            .await
            .unwrap();
        let mut reply = String::new();
        browser.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.contains("Authorization complete"));

        let code = tokio::time::timeout(Duration::from_secs(2), waiting)
            .await
            .expect("redirect was held up by the idle connection")
            .unwrap()
            .unwrap();
        assert_eq!(code, "4/code");
    }

    #[tokio::test]
    async fn test_stray_requests_get_not_found() {
        use tokio::io::AsyncReadExt;

        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let waiting = tokio::spawn(async move { receive_code(&listener, "s2").await });

        let mut favicon = TcpStream::connect(addr).await.unwrap();
        favicon
            .write_all(b"GET /favicon.ico HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut reply = String::new();
        favicon.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 404"));

        let mut denied = TcpStream::connect(addr).await.unwrap();
        denied
            .write_all(b"GET /?error=access_denied&state=s2 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let err = waiting.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthError::Consent(msg) if msg == "access_denied"));
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let token = TokenResponse {
            access_token: "new".into(),
            expires_in: Some(3600),
            refresh_token: None,
            scope: Some(format!("{} {}", UPLOAD_SCOPE, READONLY_SCOPE)),
        };
        let creds = token.into_credentials(Some("old-refresh"));
        assert_eq!(creds.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(creds.scopes.len(), 2);
        assert!(creds.is_valid());
    }
}
