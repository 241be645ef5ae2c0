//! Helpers shared by the unit tests.

use axum::Router;

use crate::oauth::token::unix_now;
use crate::oauth::OAuthToken;

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Base URL of a local port nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// The transport error a request to a closed port fails with.
pub async fn connection_refused() -> reqwest::Error {
    reqwest::get(closed_port_url().await).await.unwrap_err()
}

/// A bearer token valid for another hour.
pub fn token(access: &str) -> OAuthToken {
    OAuthToken {
        access_token: access.to_string(),
        refresh_token: Some(format!("{access}-refresh")),
        expires_at: unix_now() + 3600,
        token_type: "Bearer".to_string(),
        scope: Some("user-read-private user-top-read".to_string()),
    }
}
