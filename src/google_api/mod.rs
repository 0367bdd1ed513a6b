//! Native Google API client.
//!
//! Direct HTTP via reqwest against Gmail v1, Sheets v4 and Drive v3. The
//! token file format is the one Python's google-auth writes with
//! `Credentials.to_json()`, so an existing `token.json` keeps working.
//!
//! Modules:
//! - drive: resume lookup and download
//! - gmail: raw message send
//! - sheets: values read and batch update
//! - token_store: token.json load/save

pub mod drive;
pub mod gmail;
pub mod sheets;
pub mod token_store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::GoogleConfig;

/// OAuth2 scopes a usable token must carry.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/drive.readonly",
    "https://www.googleapis.com/auth/spreadsheets",
];

const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

// ============================================================================
// Token types (compatible with Python's google-auth token format)
// ============================================================================

/// OAuth2 token payload persisted in token.json.
///
/// Both `token` and `access_token` are accepted on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    /// The access token (Python writes this as "token")
    #[serde(alias = "access_token")]
    pub token: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Authorized scopes. Some writers emit a space-separated "scope" string instead.
    #[serde(default, deserialize_with = "scopes_list_or_string", alias = "scope")]
    pub scopes: Vec<String>,
    /// Token expiry time (ISO 8601)
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default, alias = "email")]
    pub account: Option<String>,
    #[serde(default)]
    pub universe_domain: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn scopes_list_or_string<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Scopes::deserialize(deserializer)? {
        Scopes::List(list) => list,
        Scopes::Joined(joined) => joined.split_whitespace().map(str::to_string).collect(),
    })
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GoogleApiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("Credentials not found at {0}")]
    CredentialsNotFound(PathBuf),
    #[error("Token not found at {0}")]
    TokenNotFound(PathBuf),
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid credentials format: {0}")]
    InvalidCredentials(String),
    #[error("Token is missing required scopes: {}", .0.join(", "))]
    MissingScopes(Vec<String>),
    #[error("Unexpected API response: {0}")]
    UnexpectedResponse(String),
}

impl GoogleApiError {
    /// Network failures, throttling and server errors; a later attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GoogleApiError::Http(_) => true,
            GoogleApiError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Whether repeating the request is harmless. A non-idempotent request
    /// (sending mail) is only retried when the server provably did not act
    /// on it: HTTP 429 or a connection that never opened.
    pub idempotent: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
            idempotent: true,
        }
    }
}

impl RetryPolicy {
    pub fn non_idempotent() -> Self {
        Self {
            idempotent: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retryable,
    NonRetryable,
}

fn retry_decision_for_status(status: reqwest::StatusCode, policy: &RetryPolicy) -> RetryDecision {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return RetryDecision::Retryable;
    }
    if policy.idempotent
        && (status == reqwest::StatusCode::REQUEST_TIMEOUT || status.is_server_error())
    {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(value) = retry_after.and_then(|v| v.to_str().ok()) {
        if let Ok(secs) = value.parse::<u64>() {
            return Duration::from_secs(secs.min(30));
        }
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, GoogleApiError> {
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(GoogleApiError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                let decision = retry_decision_for_status(status, policy);
                if decision == RetryDecision::Retryable && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "google_api retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = if policy.idempotent {
                    err.is_timeout() || err.is_connect()
                } else {
                    err.is_connect()
                };
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "google_api retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(GoogleApiError::Http(err));
            }
        }
    }

    Err(GoogleApiError::UnexpectedResponse(
        "request exhausted retries".to_string(),
    ))
}

/// Map a non-success response onto `GoogleApiError`.
pub(crate) async fn check_status(
    resp: reqwest::Response,
) -> Result<reqwest::Response, GoogleApiError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

// ============================================================================
// Token refresh
// ============================================================================

/// Check if a token is expired based on its expiry field.
pub fn is_token_expired(token: &GoogleToken) -> bool {
    match &token.expiry {
        None => true, // No expiry = assume expired, try refresh
        Some(expiry_str) => {
            // Python stores expiry as "2026-02-08T12:00:00.000000Z" or without zone
            let parsed = chrono::DateTime::parse_from_rfc3339(expiry_str)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .or_else(|_| {
                    chrono::NaiveDateTime::parse_from_str(expiry_str, "%Y-%m-%dT%H:%M:%S%.f")
                        .map(|naive| naive.and_utc())
                });
            match parsed {
                // Consider expired if within 60 seconds of expiry
                Ok(expiry) => expiry <= chrono::Utc::now() + chrono::Duration::seconds(60),
                Err(_) => true,
            }
        }
    }
}

/// Refresh an access token using the refresh token.
///
/// Returns an updated GoogleToken with new access token and expiry. The
/// caller persists it.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    token: &GoogleToken,
) -> Result<GoogleToken, GoogleApiError> {
    let refresh_token = token
        .refresh_token
        .as_ref()
        .ok_or(GoogleApiError::AuthExpired)?;

    let (status, body_text) =
        refresh_access_token_request(client, token, refresh_token, false).await?;
    let body: serde_json::Value = if status.is_success() {
        serde_json::from_str(&body_text)?
    } else if status.as_u16() == 400
        && body_text.contains("invalid_client")
        && token.client_secret.is_some()
    {
        let (retry_status, retry_body_text) =
            refresh_access_token_request(client, token, refresh_token, true).await?;
        if !retry_status.is_success() {
            return Err(map_refresh_error(retry_status.as_u16(), &retry_body_text));
        }
        serde_json::from_str(&retry_body_text)?
    } else {
        return Err(map_refresh_error(status.as_u16(), &body_text));
    };

    let access_token = body["access_token"]
        .as_str()
        .ok_or_else(|| GoogleApiError::RefreshFailed("No access_token in response".into()))?;

    let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
    let expiry = chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64);

    let mut new_token = token.clone();
    new_token.token = access_token.to_string();
    new_token.expiry = Some(expiry.to_rfc3339());
    Ok(new_token)
}

async fn refresh_access_token_request(
    client: &reqwest::Client,
    token: &GoogleToken,
    refresh_token: &str,
    include_client_secret: bool,
) -> Result<(reqwest::StatusCode, String), GoogleApiError> {
    let mut form = vec![
        ("client_id", token.client_id.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    if include_client_secret {
        if let Some(secret) = token.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
    }
    let resp = client.post(&token.token_uri).form(&form).send().await?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Ok((status, body))
}

fn map_refresh_error(status: u16, body: &str) -> GoogleApiError {
    let lowered = body.to_lowercase();
    if (status == 400 || status == 401)
        && (lowered.contains("invalid_grant") || lowered.contains("token has been expired"))
    {
        return GoogleApiError::AuthExpired;
    }
    GoogleApiError::RefreshFailed(format!("HTTP {}: {}", status, body))
}

// ============================================================================
// Token source
// ============================================================================

/// Hands out valid access tokens for one run, refreshing (and persisting)
/// when the cached token is about to expire.
///
/// The mutex serializes refreshes so two clients never race on token.json.
pub struct TokenSource {
    path: PathBuf,
    http: reqwest::Client,
    token: Mutex<GoogleToken>,
}

impl TokenSource {
    pub fn load(path: &Path, http: reqwest::Client) -> Result<Self, GoogleApiError> {
        let token = token_store::load_token(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            http,
            token: Mutex::new(token),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Get a valid access token, refreshing if expired.
    pub async fn access_token(&self) -> Result<String, GoogleApiError> {
        let mut guard = self.token.lock().await;
        if is_token_expired(&guard) {
            let refreshed = refresh_access_token(&self.http, &guard).await?;
            token_store::save_token(&self.path, &refreshed)?;
            *guard = refreshed;
        }
        Ok(guard.token.clone())
    }

    /// Account email recorded in the token, if any.
    pub async fn account(&self) -> Option<String> {
        self.token
            .lock()
            .await
            .account
            .clone()
            .filter(|a| !a.trim().is_empty())
    }
}

// ============================================================================
// Preflight
// ============================================================================

/// Validate that credentials.json and token.json are present and usable.
///
/// Refreshes (and persists) an expired token when a refresh token exists.
/// Fails when the token lacks any of [`SCOPES`].
pub async fn preflight_validate(
    google: &GoogleConfig,
    http: &reqwest::Client,
) -> Result<(), GoogleApiError> {
    if !google.credentials_path.exists() {
        return Err(GoogleApiError::CredentialsNotFound(
            google.credentials_path.clone(),
        ));
    }
    let raw = std::fs::read_to_string(&google.credentials_path)?;
    serde_json::from_str::<serde_json::Value>(&raw).map_err(|e| {
        GoogleApiError::InvalidCredentials(format!(
            "{}: {}",
            google.credentials_path.display(),
            e
        ))
    })?;

    let mut token = token_store::load_token(&google.token_path)?;
    if is_token_expired(&token) {
        if token.refresh_token.is_none() {
            return Err(GoogleApiError::AuthExpired);
        }
        token = refresh_access_token(http, &token).await?;
        token_store::save_token(&google.token_path, &token)?;
    }

    validate_scopes(&token)
}

pub fn validate_scopes(token: &GoogleToken) -> Result<(), GoogleApiError> {
    let mut missing: Vec<String> = SCOPES
        .iter()
        .filter(|scope| !token.scopes.iter().any(|s| s.trim() == **scope))
        .map(|scope| scope.to_string())
        .collect();
    // gmail.send first: it is the one scope a run cannot do without.
    missing.sort_by_key(|s| s != GMAIL_SEND_SCOPE);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GoogleApiError::MissingScopes(missing))
    }
}

// ============================================================================
// Tests
// ============================================================================
