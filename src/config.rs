use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::oauth::attempts::MAX_ATTEMPT_TTL;

/// Longest a session cookie may live.
const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Top-level configuration parsed from TOML.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
}

/// Server-level configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub public_url: String,
    /// Secret key used for AES-256-GCM encrypting session cookies and
    /// HMAC-signing login attempt cookies. Base64, at least 32 bytes decoded.
    #[serde(default)]
    pub session_secret: String,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// How long a minted state/PKCE pair waits for its callback.
    #[serde(default = "default_login_attempt_ttl")]
    pub login_attempt_ttl_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_login_attempt_ttl() -> u64 {
    600
}

/// The OAuth provider and the music API behind it.
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_authorize_url() -> String {
    "https://accounts.spotify.com/authorize".to_string()
}

fn default_token_url() -> String {
    "https://accounts.spotify.com/api/token".to_string()
}

fn default_api_base_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["user-read-private".to_string(), "user-top-read".to_string()]
}

fn default_request_timeout() -> u64 {
    10
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

impl Config {
    /// The callback URL registered with the provider.
    pub fn redirect_uri(&self) -> String {
        format!("{}/callback", self.server.public_url)
    }

    /// Cookies get the `Secure` attribute whenever we are served over TLS.
    pub fn secure_cookies(&self) -> bool {
        self.server.public_url.starts_with("https://")
    }

    /// Decoded `session_secret`. Only valid after `validate` has passed.
    pub fn session_secret_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            &self.server.session_secret,
        )
        .map_err(|e| ConfigError::Invalid(format!("server.session_secret is not valid base64: {e}")))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.request_timeout_secs)
    }
}

/// Load and validate config from a TOML file, applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config: Config = toml::from_str(&content)?;

    apply_env_overrides(&mut config);
    validate(&config)?;

    Ok(config)
}

/// Apply environment variable overrides.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("TOPTRACKS_SESSION_SECRET") {
        config.server.session_secret = val;
    }
    if let Ok(val) = std::env::var("SPOTIFY_ID") {
        config.provider.client_id = val;
    }
    if let Ok(val) = std::env::var("SPOTIFY_SECRET") {
        config.provider.client_secret = Some(val);
    }
}

/// Validate the entire configuration.
fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_server(&config.server)?;
    validate_provider(&config.provider)?;
    Ok(())
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.public_url.is_empty() {
        return Err(invalid("server.public_url is required"));
    }

    // The redirect URI is built by appending "/callback"
    if server.public_url.ends_with('/') {
        return Err(invalid("server.public_url must not have a trailing slash"));
    }

    // Warn (but allow) http:// for local dev; require https:// otherwise
    if server.public_url.starts_with("http://") {
        tracing::warn!(
            "server.public_url uses http://, session cookies will not be marked Secure"
        );
    } else if !server.public_url.starts_with("https://") {
        return Err(invalid(
            "server.public_url must start with https:// (or http:// for local dev)",
        ));
    }

    if server.session_secret.is_empty() {
        return Err(invalid(
            "server.session_secret is required (or set TOPTRACKS_SESSION_SECRET)",
        ));
    }
    match base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        &server.session_secret,
    ) {
        Ok(bytes) => {
            if bytes.len() < 32 {
                return Err(invalid(format!(
                    "server.session_secret must be at least 32 bytes when base64-decoded (got {} bytes). Generate with: openssl rand -base64 32",
                    bytes.len()
                )));
            }
        }
        Err(e) => {
            return Err(invalid(format!(
                "server.session_secret is not valid base64: {e}"
            )));
        }
    }

    if server.session_ttl_secs == 0 || server.session_ttl_secs > MAX_SESSION_TTL_SECS {
        return Err(invalid(format!(
            "server.session_ttl_secs must be between 1 and {MAX_SESSION_TTL_SECS}"
        )));
    }
    let max_attempt_ttl = MAX_ATTEMPT_TTL.as_secs();
    if server.login_attempt_ttl_secs == 0 || server.login_attempt_ttl_secs > max_attempt_ttl {
        return Err(invalid(format!(
            "server.login_attempt_ttl_secs must be between 1 and {max_attempt_ttl}"
        )));
    }

    Ok(())
}

fn validate_provider(provider: &ProviderConfig) -> Result<(), ConfigError> {
    if provider.client_id.is_empty() {
        return Err(invalid(
            "provider.client_id is required (or set SPOTIFY_ID)",
        ));
    }

    for (key, value) in [
        ("provider.authorize_url", &provider.authorize_url),
        ("provider.token_url", &provider.token_url),
        ("provider.api_base_url", &provider.api_base_url),
    ] {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            return Err(invalid(format!("{key} must be a valid HTTP(S) URL")));
        }
    }

    if provider.api_base_url.ends_with('/') {
        return Err(invalid("provider.api_base_url must not have a trailing slash"));
    }

    if provider.scopes.is_empty() {
        return Err(invalid("provider.scopes must list at least one scope"));
    }
    // RFC 6749 scope-token: printable ASCII except space, '"' and '\'
    let scope_regex =
        regex_lite::Regex::new(r"^[\x21\x23-\x5B\x5D-\x7E]+$").expect("static regex");
    for scope in &provider.scopes {
        if !scope_regex.is_match(scope) {
            return Err(invalid(format!(
                "provider.scopes: '{scope}' must be printable ASCII without spaces, quotes or backslashes"
            )));
        }
    }

    if provider.request_timeout_secs == 0 {
        return Err(invalid(
            "provider.request_timeout_secs must be greater than zero",
        ));
    }

    Ok(())
}
