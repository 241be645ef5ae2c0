pub mod callback;
pub mod login;
pub mod pages;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Redirect;
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use std::time::Duration;

use crate::api::MusicApi;
use crate::config::{Config, ConfigError};
use crate::oauth::{Authorizer, HttpTokenExchange, LoginAttempts, OAuthToken, TokenExchange};
use crate::session::{CookieSettings, EncryptedCookieStore, SessionStore};

/// Name of the cookie carrying the signed login attempt id.
pub const ATTEMPT_COOKIE: &str = "login-attempt";

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub authorizer: Arc<Authorizer>,
    pub attempts: Arc<LoginAttempts>,
    pub exchange: Arc<dyn TokenExchange>,
    pub sessions: Arc<dyn SessionStore>,
    pub api: Arc<MusicApi>,
    pub cookies: CookieSettings,
}

impl AppState {
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        let secret = cfg.session_secret_bytes()?;
        let cookies = CookieSettings {
            secure: cfg.secure_cookies(),
        };
        let http_error =
            |e: reqwest::Error| ConfigError::Invalid(format!("failed to build HTTP client: {e}"));

        let exchange = HttpTokenExchange::new(
            cfg.provider.token_url.clone(),
            cfg.provider.client_id.clone(),
            cfg.provider.client_secret.clone(),
            cfg.redirect_uri(),
            cfg.request_timeout(),
        )
        .map_err(http_error)?;
        let api = MusicApi::new(cfg.provider.api_base_url.clone(), cfg.request_timeout())
            .map_err(http_error)?;

        Ok(Self {
            authorizer: Arc::new(Authorizer {
                authorize_url: cfg.provider.authorize_url.clone(),
                client_id: cfg.provider.client_id.clone(),
                redirect_uri: cfg.redirect_uri(),
                scopes: cfg.provider.scopes.clone(),
            }),
            attempts: Arc::new(LoginAttempts::new(
                &secret,
                Duration::from_secs(cfg.server.login_attempt_ttl_secs),
            )),
            exchange: Arc::new(exchange),
            sessions: Arc::new(EncryptedCookieStore::new(
                &secret,
                cfg.server.session_ttl_secs,
                cookies,
            )),
            api: Arc::new(api),
            cookies,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // Login flow
        .route("/", get(login::login_page))
        .route("/callback", get(callback::callback))
        .route("/logout", get(pages::logout))
        // Authenticated pages
        .route("/home", get(pages::home))
        .route("/user-info", get(pages::user_info))
        .route("/top-tracks", get(pages::top_tracks))
        // Static assets
        .route("/public/script.js", get(pages::script))
        .with_state(state)
}

/// The token of a valid session. Rejects with a redirect to the login page,
/// whether the session is missing, unreadable or past the token's expiry.
pub struct Authenticated(pub OAuthToken);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        match state.sessions.load(&jar) {
            Some(token) if !token.is_expired() => Ok(Authenticated(token)),
            Some(_) => {
                tracing::debug!("Session token expired, redirecting to login");
                Err(Redirect::to("/"))
            }
            None => Err(Redirect::to("/")),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, HeaderMap, HeaderValue, Request, Response};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::oauth::ExchangeError;
    use crate::session::SessionError;

    /// How a `MockExchange` answers.
    pub enum Outcome {
        Token(OAuthToken),
        Reject,
        Timeout,
        Network,
    }

    pub struct MockExchange {
        outcome: Outcome,
        pub calls: AtomicUsize,
        pub last_call: Mutex<Option<(String, String)>>,
    }

    impl MockExchange {
        pub fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
                last_call: Mutex::new(None),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenExchange for MockExchange {
        async fn exchange(
            &self,
            code: &str,
            code_verifier: &str,
        ) -> Result<OAuthToken, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_call.lock().unwrap() = Some((code.to_string(), code_verifier.to_string()));
            match &self.outcome {
                Outcome::Token(t) => Ok(t.clone()),
                Outcome::Reject => Err(ExchangeError::Rejected {
                    status: 400,
                    error: "invalid_grant".to_string(),
                }),
                Outcome::Timeout => Err(ExchangeError::Timeout),
                Outcome::Network => Err(ExchangeError::Network(
                    crate::test_support::connection_refused().await,
                )),
            }
        }
    }

    /// Wraps the real store, counting saves and optionally failing them.
    pub struct RecordingStore {
        inner: EncryptedCookieStore,
        fail: bool,
        pub saved: Mutex<Vec<OAuthToken>>,
    }

    impl RecordingStore {
        pub fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                inner: EncryptedCookieStore::new(&SECRET, 3600, CookieSettings { secure: false }),
                fail,
                saved: Mutex::new(Vec::new()),
            })
        }

        pub fn saved(&self) -> Vec<OAuthToken> {
            self.saved.lock().unwrap().clone()
        }
    }

    impl SessionStore for RecordingStore {
        fn save(&self, jar: CookieJar, token: &OAuthToken) -> Result<CookieJar, SessionError> {
            self.saved.lock().unwrap().push(token.clone());
            if self.fail {
                return Err(SessionError::Encrypt);
            }
            self.inner.save(jar, token)
        }

        fn load(&self, jar: &CookieJar) -> Option<OAuthToken> {
            self.inner.load(jar)
        }

        fn clear(&self, jar: CookieJar) -> CookieJar {
            self.inner.clear(jar)
        }
    }

    pub const SECRET: [u8; 32] = [0x5A; 32];

    pub fn state_with(
        exchange: Arc<dyn TokenExchange>,
        sessions: Arc<dyn SessionStore>,
        api_base_url: &str,
    ) -> AppState {
        AppState {
            authorizer: Arc::new(Authorizer {
                authorize_url: "https://accounts.example.com/authorize".to_string(),
                client_id: "client-123".to_string(),
                redirect_uri: "http://localhost:8080/callback".to_string(),
                scopes: vec!["user-read-private".to_string(), "user-top-read".to_string()],
            }),
            attempts: Arc::new(LoginAttempts::new(&SECRET, Duration::from_secs(600))),
            exchange,
            sessions,
            api: Arc::new(
                MusicApi::new(api_base_url.to_string(), Duration::from_secs(5)).unwrap(),
            ),
            cookies: CookieSettings { secure: false },
        }
    }

    pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    /// The `name=value` pair of the `Set-Cookie` header for `name`.
    pub fn set_cookie<B>(response: &Response<B>, name: &str) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(&format!("{name}=")))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    /// A request-side cookie jar holding one `name=value` pair.
    pub fn jar_from(pair: &str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(pair).unwrap());
        CookieJar::from_headers(&headers)
    }

    pub async fn body_string(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// The provider link embedded in the login page, unescaped.
    pub fn extract_auth_url(html: &str) -> url::Url {
        let start = html
            .find("href=\"https://accounts.example.com")
            .expect("login page links to the provider")
            + "href=\"".len();
        let end = start + html[start..].find('"').unwrap();
        url::Url::parse(&html[start..end].replace("&amp;", "&").replace("&#38;", "&")).unwrap()
    }
}
