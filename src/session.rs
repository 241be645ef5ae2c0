//! Encrypted cookie sessions.
//!
//! The session cookie itself carries the token: an AES-256-GCM encrypted blob
//! holding the OAuth token and the session expiry. Nothing is kept server-side,
//! so sessions survive restarts, and a cookie that fails to decrypt, parse, or
//! is past its expiry simply reads as "no session".
//!
//! Format:  base64url( nonce || ciphertext || tag )
//!
//! The plaintext is JSON:
//! ```json
//! { "token": { "access_token": "...", ... }, "exp": 1234567890 }
//! ```

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, AeadCore, Key, Nonce};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::oauth::token::unix_now;
use crate::oauth::OAuthToken;

pub const SESSION_COOKIE: &str = "auth-session";

/// Browsers cap a cookie at roughly 4 KiB including its name and attributes.
const MAX_COOKIE_VALUE_LEN: usize = 4000;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to encrypt session")]
    Encrypt,
    #[error("session cookie is {0} bytes, over the {MAX_COOKIE_VALUE_LEN} byte limit")]
    TooLarge(usize),
}

/// Where a logged-in user's token lives between requests.
pub trait SessionStore: Send + Sync {
    /// Attach a session carrying `token` to the outgoing cookie jar.
    fn save(&self, jar: CookieJar, token: &OAuthToken) -> Result<CookieJar, SessionError>;

    /// The token of the request's session, or `None` when there is no usable
    /// session. Never fails.
    fn load(&self, jar: &CookieJar) -> Option<OAuthToken>;

    /// Invalidate the session on the client.
    fn clear(&self, jar: CookieJar) -> CookieJar;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionPayload {
    token: OAuthToken,
    exp: u64,
}

/// Attributes shared by every cookie this server sets.
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub secure: bool,
}

impl CookieSettings {
    pub fn build(
        &self,
        name: &'static str,
        value: String,
        max_age_secs: u64,
    ) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(
                i64::try_from(max_age_secs).unwrap_or(i64::MAX),
            ))
            .build()
    }

    /// A cookie that tells the browser to drop `name` right away.
    pub fn expired(&self, name: &'static str) -> Cookie<'static> {
        self.build(name, String::new(), 0)
    }
}

pub struct EncryptedCookieStore {
    cipher: Aes256Gcm,
    ttl_secs: u64,
    cookies: CookieSettings,
}

/// Derive a 256-bit AES key from the session secret using SHA-256.
fn derive_key(secret: &[u8]) -> [u8; 32] {
    Sha256::digest(secret).into()
}

impl EncryptedCookieStore {
    pub fn new(secret: &[u8], ttl_secs: u64, cookies: CookieSettings) -> Self {
        let key = derive_key(secret);
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
            ttl_secs,
            cookies,
        }
    }

    fn seal(&self, payload: &SessionPayload) -> Result<String, SessionError> {
        let plaintext = serde_json::to_vec(payload)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| SessionError::Encrypt)?;

        // Wire format: nonce (12 bytes) || ciphertext+tag
        let mut blob = Vec::with_capacity(12 + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(&blob))
    }

    fn open(&self, value: &str) -> Result<SessionPayload, &'static str> {
        let blob = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| "invalid session cookie encoding")?;

        if blob.len() < 13 {
            return Err("session cookie too short");
        }

        let (nonce_bytes, ciphertext) = blob.split_at(12);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| "session cookie is invalid or tampered")?;

        let payload: SessionPayload =
            serde_json::from_slice(&plaintext).map_err(|_| "session payload corrupt")?;

        if unix_now() > payload.exp {
            return Err("session expired");
        }

        Ok(payload)
    }
}

impl SessionStore for EncryptedCookieStore {
    fn save(&self, jar: CookieJar, token: &OAuthToken) -> Result<CookieJar, SessionError> {
        let value = self.seal(&SessionPayload {
            token: token.clone(),
            exp: unix_now().saturating_add(self.ttl_secs),
        })?;
        if value.len() > MAX_COOKIE_VALUE_LEN {
            return Err(SessionError::TooLarge(value.len()));
        }
        Ok(jar.add(self.cookies.build(SESSION_COOKIE, value, self.ttl_secs)))
    }

    fn load(&self, jar: &CookieJar) -> Option<OAuthToken> {
        let cookie = jar.get(SESSION_COOKIE)?;
        match self.open(cookie.value()) {
            Ok(payload) => Some(payload.token),
            Err(reason) => {
                tracing::debug!(reason, "Ignoring unusable session cookie");
                None
            }
        }
    }

    fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.cookies.expired(SESSION_COOKIE))
    }
}
