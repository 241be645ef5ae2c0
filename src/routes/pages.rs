use askama::Template;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Redirect};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::{AppState, Authenticated};
use crate::api::{TimeRange, Track};
use crate::error::AppError;

#[derive(Template)]
#[template(path = "home.html")]
struct HomePage {
    user_id: String,
}

/// GET /home
pub async fn home(
    State(state): State<AppState>,
    Authenticated(token): Authenticated,
) -> Result<Html<String>, AppError> {
    let user = state
        .api
        .current_user(&token)
        .await
        .map_err(|e| AppError::api(e, state.cookies))?;

    Ok(Html(HomePage { user_id: user.id }.render()?))
}

/// GET /user-info: the display name as plain text.
pub async fn user_info(
    State(state): State<AppState>,
    Authenticated(token): Authenticated,
) -> Result<String, AppError> {
    let user = state
        .api
        .current_user(&token)
        .await
        .map_err(|e| AppError::api(e, state.cookies))?;

    Ok(user.display_name.unwrap_or(user.id))
}

#[derive(Debug, Deserialize)]
pub struct TopTracksParams {
    #[serde(default)]
    pub time_range: TimeRange,
}

/// GET /top-tracks?time_range=short_term|medium_term|long_term
pub async fn top_tracks(
    State(state): State<AppState>,
    Authenticated(token): Authenticated,
    Query(params): Query<TopTracksParams>,
) -> Result<Json<Vec<Track>>, AppError> {
    let tracks = state
        .api
        .top_tracks(&token, params.time_range)
        .await
        .map_err(|e| AppError::api(e, state.cookies))?;

    tracing::debug!(
        time_range = params.time_range.as_str(),
        count = tracks.len(),
        "Fetched top tracks"
    );
    Ok(Json(tracks))
}

/// GET /logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (state.sessions.clear(jar), Redirect::to("/"))
}

const SCRIPT: &str = include_str!("../../public/script.js");

/// GET /public/script.js
pub async fn script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        SCRIPT,
    )
}
