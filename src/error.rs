use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use thiserror::Error;

use crate::api::ApiError;
use crate::oauth::ExchangeError;
use crate::session::{CookieSettings, SessionError, SESSION_COOKIE};

/// Everything a request handler can fail with, mapped onto an HTTP response.
#[derive(Debug, Error)]
pub enum AppError {
    /// No pending attempt matched the callback. Answered with a bare 404 so
    /// the caller learns nothing about which attempts exist.
    #[error("callback did not match a pending login attempt")]
    StateMismatch,
    /// The provider sent the user back without a code.
    #[error("authorization was not granted: {0}")]
    AuthorizationDenied(String),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("couldn't save session: {0}")]
    Session(#[from] SessionError),
    /// A music API call failed. `cookies` lets a 401 clear the session.
    #[error("{source}")]
    Api {
        source: ApiError,
        cookies: CookieSettings,
    },
    #[error("couldn't render template: {0}")]
    Render(#[from] askama::Error),
}

impl AppError {
    pub fn api(source: ApiError, cookies: CookieSettings) -> Self {
        AppError::Api { source, cookies }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::StateMismatch => {
                tracing::warn!("Rejected callback: no matching login attempt");
                StatusCode::NOT_FOUND.into_response()
            }
            AppError::AuthorizationDenied(reason) => {
                tracing::warn!(%reason, "Provider returned no authorization code");
                (StatusCode::FORBIDDEN, "Couldn't get token").into_response()
            }
            AppError::Exchange(e) => {
                let status = match &e {
                    ExchangeError::Rejected { .. } | ExchangeError::InvalidResponse(_) => {
                        StatusCode::FORBIDDEN
                    }
                    ExchangeError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    ExchangeError::Network(_) => StatusCode::BAD_GATEWAY,
                };
                tracing::warn!(error = %e, status = status.as_u16(), "Error getting token");
                (status, "Couldn't get token").into_response()
            }
            AppError::Session(e) => {
                tracing::error!(error = %e, "Error saving session");
                (StatusCode::INTERNAL_SERVER_ERROR, "Couldn't save session").into_response()
            }
            AppError::Api {
                source: ApiError::Unauthorized,
                cookies,
            } => {
                tracing::info!("Access token refused upstream, sending user back to login");
                let jar = CookieJar::new().add(cookies.expired(SESSION_COOKIE));
                (jar, Redirect::to("/")).into_response()
            }
            AppError::Api { source, .. } => {
                let status = match source {
                    ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                };
                tracing::error!(error = %source, "Music API request failed");
                (status, "Couldn't reach the music service").into_response()
            }
            AppError::Render(e) => {
                tracing::error!(error = %e, "Error rendering template");
                (StatusCode::INTERNAL_SERVER_ERROR, "Couldn't render template").into_response()
            }
        }
    }
}
