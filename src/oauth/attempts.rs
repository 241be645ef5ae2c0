//! Pending login attempts.
//!
//! Each visit to the login page mints a fresh `state` and PKCE pair and parks
//! them here under a random attempt id. The id reaches the browser in a
//! cookie signed with HMAC-SHA256 so a forged id is rejected before the map
//! is consulted. Records are single use and expire after a short TTL.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::pkce::{random_token, PkcePair};

type HmacSha256 = Hmac<Sha256>;

/// Upper bound on attempts waiting for their callback at once. Past it the
/// attempt closest to expiry is evicted to make room.
pub const MAX_PENDING_ATTEMPTS: usize = 10_000;

/// Longest an attempt may wait for its callback.
pub const MAX_ATTEMPT_TTL: Duration = Duration::from_secs(3600);

/// What the login page needs from a freshly minted attempt.
#[derive(Debug)]
pub struct StartedAttempt {
    /// Signed attempt id, the value of the attempt cookie.
    pub cookie_value: String,
    pub state: String,
    pub code_challenge: String,
}

/// What the callback needs to finish an attempt.
#[derive(Debug, Clone)]
pub struct PendingAttempt {
    pub state: String,
    pub code_verifier: String,
    expires_at: Instant,
}

pub struct LoginAttempts {
    key: Vec<u8>,
    ttl: Duration,
    capacity: usize,
    pending: Mutex<HashMap<String, PendingAttempt>>,
}

impl LoginAttempts {
    pub fn new(key: &[u8], ttl: Duration) -> Self {
        Self {
            key: key.to_vec(),
            ttl: ttl.min(MAX_ATTEMPT_TTL),
            capacity: MAX_PENDING_ATTEMPTS,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a new attempt with its own state token and PKCE pair.
    pub async fn begin(&self) -> StartedAttempt {
        let attempt_id = random_token();
        let state = random_token();
        let pkce = PkcePair::generate();

        let mut guard = self.pending.lock().await;
        let now = Instant::now();
        prune_expired(&mut guard, now);
        while guard.len() >= self.capacity {
            if !evict_soonest_expiring(&mut guard) {
                break;
            }
            tracing::debug!(capacity = self.capacity, "Login attempt store full, evicted oldest");
        }
        guard.insert(
            attempt_id.clone(),
            PendingAttempt {
                state: state.clone(),
                code_verifier: pkce.verifier,
                expires_at: now + self.ttl,
            },
        );
        drop(guard);

        StartedAttempt {
            cookie_value: self.sign(&attempt_id),
            state,
            code_challenge: pkce.challenge,
        }
    }

    /// Remove and return the attempt named by a signed cookie value.
    ///
    /// The record is consumed even if the caller goes on to reject the
    /// callback. Returns `None` for bad signatures, unknown ids and expired
    /// records alike.
    pub async fn take(&self, cookie_value: &str) -> Option<PendingAttempt> {
        let attempt_id = self.verify(cookie_value)?;
        let attempt = self.pending.lock().await.remove(attempt_id)?;
        if attempt.expires_at <= Instant::now() {
            return None;
        }
        Some(attempt)
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length")
    }

    fn sign(&self, attempt_id: &str) -> String {
        let mut mac = self.mac();
        mac.update(attempt_id.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{attempt_id}.{tag}")
    }

    fn verify<'a>(&self, cookie_value: &'a str) -> Option<&'a str> {
        let (attempt_id, tag) = cookie_value.split_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        let mut mac = self.mac();
        mac.update(attempt_id.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(attempt_id)
    }
}

fn prune_expired(pending: &mut HashMap<String, PendingAttempt>, now: Instant) {
    pending.retain(|_, attempt| attempt.expires_at > now);
}

fn evict_soonest_expiring(pending: &mut HashMap<String, PendingAttempt>) -> bool {
    let oldest = pending
        .iter()
        .min_by_key(|(_, attempt)| attempt.expires_at)
        .map(|(id, _)| id.clone());
    match oldest {
        Some(id) => pending.remove(&id).is_some(),
        None => false,
    }
}

/// Equality whose running time does not depend on where the inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
