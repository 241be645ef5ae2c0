//! Authorization-code exchange against the provider's token endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Token set produced by one successful exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub expires_at: u64,
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl OAuthToken {
    pub fn is_expired(&self) -> bool {
        unix_now() >= self.expires_at
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("provider rejected the authorization code (HTTP {status}): {error}")]
    Rejected { status: u16, error: String },
    #[error("provider returned an unreadable token response: {0}")]
    InvalidResponse(String),
    #[error("token request timed out")]
    Timeout,
    #[error("token request failed: {0}")]
    Network(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ExchangeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ExchangeError::Timeout
        } else {
            ExchangeError::Network(e)
        }
    }
}

/// Swaps an authorization code plus its PKCE verifier for a token.
///
/// Called at most once per code. Implementations must not retry: a rejected
/// code is spent, and transport failures are reported to the caller.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<OAuthToken, ExchangeError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// `TokenExchange` over HTTP, one form POST per call.
pub struct HttpTokenExchange {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
}

impl HttpTokenExchange {
    pub fn new(
        token_url: String,
        client_id: String,
        client_secret: Option<String>,
        redirect_uri: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            token_url,
            client_id,
            client_secret,
            redirect_uri,
        })
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, code: &str, code_verifier: &str) -> Result<OAuthToken, ExchangeError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];

        let mut request = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form);
        if let Some(secret) = &self.client_secret {
            request = request.basic_auth(&self.client_id, Some(secret));
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let error = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(e) => match e.error_description {
                    Some(desc) => format!("{}: {desc}", e.error),
                    None => e.error,
                },
                Err(_) => "unrecognized error response".to_string(),
            };
            return Err(ExchangeError::Rejected {
                status: status.as_u16(),
                error,
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;

        Ok(OAuthToken {
            access_token: parsed.access_token,
            refresh_token: parsed.refresh_token,
            expires_at: unix_now()
                .saturating_add(parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN)),
            token_type: parsed.token_type,
            scope: parsed.scope,
        })
    }
}
