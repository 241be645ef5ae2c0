//! `GET /callback`: the end of the authorization-code flow.
//!
//! An attempt moves through
//! `AWAITING_CALLBACK → STATE_VALIDATED → TOKEN_EXCHANGED → SESSION_SAVED`.
//! Any failing step ends the attempt for good; the user starts over at `/`,
//! which mints a new state and PKCE pair.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::{AppState, ATTEMPT_COOKIE};
use crate::error::AppError;
use crate::oauth::attempts::constant_time_eq;
use crate::oauth::OAuthToken;

/// Where a completed login lands.
const LANDING_PAGE: &str = "/home";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    let attempt_cookie = jar.get(ATTEMPT_COOKIE).map(|c| c.value().to_string());
    // The attempt is spent whatever the outcome, so its cookie goes too
    let spent = state.cookies.expired(ATTEMPT_COOKIE);

    let saved = match exchange_code(&state, attempt_cookie.as_deref(), params).await {
        Ok(token) => state
            .sessions
            .save(jar.add(spent.clone()), &token)
            .map_err(AppError::from),
        Err(e) => Err(e),
    };

    match saved {
        Ok(jar) => {
            tracing::info!("Login complete, session saved");
            (jar, Redirect::to(LANDING_PAGE)).into_response()
        }
        Err(e) => (CookieJar::new().add(spent), e).into_response(),
    }
}

/// Validate the callback against its attempt and trade the code for a token.
async fn exchange_code(
    state: &AppState,
    attempt_cookie: Option<&str>,
    params: CallbackParams,
) -> Result<OAuthToken, AppError> {
    // The attempt is consumed here, before anything else can fail
    let attempt = match attempt_cookie {
        Some(value) => state.attempts.take(value).await,
        None => None,
    }
    .ok_or(AppError::StateMismatch)?;

    let returned_state = params.state.as_deref().unwrap_or_default();
    if !constant_time_eq(returned_state.as_bytes(), attempt.state.as_bytes()) {
        return Err(AppError::StateMismatch);
    }

    let code = match params.code {
        Some(code) if !code.is_empty() => code,
        _ => {
            return Err(AppError::AuthorizationDenied(
                params.error.unwrap_or_else(|| "missing code".to_string()),
            ))
        }
    };

    Ok(state
        .exchange
        .exchange(&code, &attempt.code_verifier)
        .await?)
}
