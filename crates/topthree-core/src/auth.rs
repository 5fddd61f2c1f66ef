//! Bearer tokens for the calendar API.
//!
//! Tokens are obtained out of band and stored in the OS keyring as JSON.
//! Expired access tokens are refreshed against the configured token
//! endpoint; a failed refresh is surfaced once and never retried here.

use std::future::Future;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::storage::AuthConfig;

/// Seconds before `expires_at` at which a token is already treated as
/// expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Supplies a bearer token before every calendar call.
pub trait TokenProvider: Send + Sync {
    fn get_valid_token(&self) -> impl Future<Output = Result<String, AuthError>> + Send;
}

/// A fixed token, for tests and pre-authorized callers.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    async fn get_valid_token(&self) -> Result<String, AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::NotAuthenticated);
        }
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp
    pub expires_at: Option<i64>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl OAuthTokens {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => now.timestamp() > exp - EXPIRY_SKEW_SECS,
            None => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Exchange a refresh token for a new access token.
///
/// The refresh token is carried over when the endpoint does not rotate it.
pub async fn refresh_tokens(
    http: &Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh: &str,
    now: DateTime<Utc>,
) -> Result<OAuthTokens, AuthError> {
    let params = [
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("refresh_token", refresh),
        ("grant_type", "refresh_token"),
    ];
    let resp = http
        .post(token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;
    let status = resp.status();
    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| AuthError::TokenRefreshFailed(format!("unreadable token response: {e}")))?;

    if let Some(error) = body.error {
        let detail = body.error_description.unwrap_or_default();
        return Err(AuthError::TokenRefreshFailed(format!("{error} {detail}").trim().to_string()));
    }
    if !status.is_success() {
        return Err(AuthError::TokenRefreshFailed(format!("token endpoint returned {status}")));
    }
    let access_token = body
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::TokenRefreshFailed("response carried no access_token".into()))?;

    Ok(OAuthTokens {
        access_token,
        refresh_token: body.refresh_token.or_else(|| Some(refresh.to_string())),
        expires_at: body.expires_in.map(|secs| now.timestamp() + secs),
        token_type: body.token_type.unwrap_or_else(|| "Bearer".into()),
        scope: body.scope,
    })
}

/// Thin wrapper around the OS keyring for credential storage.
pub mod keyring_store {
    use crate::error::AuthError;

    const SERVICE: &str = "topthree";

    fn entry(key: &str) -> Result<keyring::Entry, AuthError> {
        keyring::Entry::new(SERVICE, key).map_err(|e| AuthError::Keyring(e.to_string()))
    }

    pub fn get(key: &str) -> Result<Option<String>, AuthError> {
        match entry(key)?.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AuthError::Keyring(e.to_string())),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<(), AuthError> {
        entry(key)?
            .set_password(value)
            .map_err(|e| AuthError::Keyring(e.to_string()))
    }

    pub fn delete(key: &str) -> Result<(), AuthError> {
        match entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AuthError::Keyring(e.to_string())),
        }
    }
}

const TOKENS_KEY: &str = "google_tokens";
const CLIENT_SECRET_KEY: &str = "google_client_secret";

/// Tokens from the OS keyring, refreshed when expired.
#[derive(Debug, Clone)]
pub struct KeyringTokenProvider {
    http: Client,
    client_id: String,
    token_url: String,
}

impl KeyringTokenProvider {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            http: Client::new(),
            client_id: config.client_id.clone(),
            token_url: config.token_url.clone(),
        }
    }

    pub fn load_tokens() -> Result<Option<OAuthTokens>, AuthError> {
        let Some(json) = keyring_store::get(TOKENS_KEY)? else {
            return Ok(None);
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| AuthError::Keyring(format!("stored tokens unreadable: {e}")))
    }

    pub fn store_tokens(tokens: &OAuthTokens) -> Result<(), AuthError> {
        let json = serde_json::to_string(tokens).map_err(|e| AuthError::Keyring(e.to_string()))?;
        keyring_store::set(TOKENS_KEY, &json)
    }

    pub fn store_client_secret(secret: &str) -> Result<(), AuthError> {
        keyring_store::set(CLIENT_SECRET_KEY, secret)
    }

    /// Forget stored tokens and the client secret.
    pub fn sign_out() -> Result<(), AuthError> {
        keyring_store::delete(TOKENS_KEY)?;
        keyring_store::delete(CLIENT_SECRET_KEY)
    }
}

impl TokenProvider for KeyringTokenProvider {
    async fn get_valid_token(&self) -> Result<String, AuthError> {
        let tokens = Self::load_tokens()?.ok_or(AuthError::NotAuthenticated)?;
        let now = Utc::now();
        if !tokens.is_expired_at(now) {
            return Ok(tokens.access_token);
        }

        let refresh = tokens.refresh_token.as_deref().ok_or_else(|| {
            AuthError::TokenRefreshFailed("access token expired and no refresh token is stored".into())
        })?;
        let secret = keyring_store::get(CLIENT_SECRET_KEY)?.unwrap_or_default();
        let refreshed =
            refresh_tokens(&self.http, &self.token_url, &self.client_id, &secret, refresh, now).await?;
        Self::store_tokens(&refreshed)?;
        tracing::debug!("refreshed calendar access token");
        Ok(refreshed.access_token)
    }
}
