use askama::Template;
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum_extra::extract::cookie::CookieJar;

use super::{AppState, ATTEMPT_COOKIE};
use crate::error::AppError;

#[derive(Template)]
#[template(path = "index.html")]
struct LoginPage {
    auth_url: String,
}

/// GET /: mint a login attempt and render the page linking to the provider.
pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let attempt = state.attempts.begin().await;
    let auth_url = state
        .authorizer
        .build_auth_url(&attempt.state, &attempt.code_challenge);

    let html = LoginPage { auth_url }.render()?;

    let jar = jar.add(state.cookies.build(
        ATTEMPT_COOKIE,
        attempt.cookie_value,
        state.attempts.ttl().as_secs(),
    ));
    Ok((jar, Html(html)))
}
