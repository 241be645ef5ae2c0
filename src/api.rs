//! Read-only client for the music API, authenticated with a session's token.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::oauth::OAuthToken;

/// How many tracks a top-tracks query returns.
const TOP_TRACKS_LIMIT: u32 = 15;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The token was refused; the user has to log in again.
    #[error("music API rejected the access token")]
    Unauthorized,
    #[error("music API returned HTTP {0}")]
    Status(u16),
    #[error("music API request timed out")]
    Timeout,
    #[error("music API request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("music API returned an unexpected body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(e)
        }
    }
}

/// Window a top-tracks query is computed over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum TimeRange {
    /// Roughly the last four weeks.
    #[default]
    #[serde(rename = "short_term")]
    Short,
    /// Roughly the last six months.
    #[serde(rename = "medium_term")]
    Medium,
    /// Several years.
    #[serde(rename = "long_term")]
    Long,
}

impl TimeRange {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Short => "short_term",
            TimeRange::Medium => "medium_term",
            TimeRange::Long => "long_term",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// One row of the top-tracks JSON the front end renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub img: String,
    pub title: String,
    pub artist: String,
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct FullTrack {
    name: String,
    #[serde(default)]
    album: Option<Album>,
    #[serde(default)]
    artists: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct Album {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

impl From<FullTrack> for Track {
    fn from(t: FullTrack) -> Self {
        let img = t
            .album
            .and_then(|a| a.images.into_iter().next())
            .map(|i| i.url)
            .unwrap_or_default();
        let artist = t
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .unwrap_or_default();
        Track {
            img,
            title: t.name,
            artist,
        }
    }
}

pub struct MusicApi {
    http: reqwest::Client,
    base_url: String,
}

impl MusicApi {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// `GET /me`
    pub async fn current_user(&self, token: &OAuthToken) -> Result<User, ApiError> {
        self.get(token, "/me", &[]).await
    }

    /// `GET /me/top/tracks` for one time range.
    pub async fn top_tracks(
        &self,
        token: &OAuthToken,
        range: TimeRange,
    ) -> Result<Vec<Track>, ApiError> {
        let limit = TOP_TRACKS_LIMIT.to_string();
        let page: Paging<FullTrack> = self
            .get(
                token,
                "/me/top/tracks",
                &[
                    ("limit", limit.as_str()),
                    ("offset", "0"),
                    ("time_range", range.as_str()),
                ],
            )
            .await?;
        Ok(page.items.into_iter().map(Track::from).collect())
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        token: &OAuthToken,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .bearer_auth(&token.access_token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                ApiError::Decode(e.to_string())
            } else {
                ApiError::from(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn, token};
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer good")
    }

    fn mock_api() -> Router {
        Router::new()
            .route(
                "/me",
                get(|headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return StatusCode::UNAUTHORIZED.into_response();
                    }
                    Json(serde_json::json!({"id": "wizzler", "display_name": "Wiz"}))
                        .into_response()
                }),
            )
            .route(
                "/me/top/tracks",
                get(
                    |headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                        if !authorized(&headers) {
                            return StatusCode::UNAUTHORIZED.into_response();
                        }
                        assert_eq!(q["limit"], "15");
                        assert_eq!(q["offset"], "0");
                        Json(serde_json::json!({
                            "items": [
                                {
                                    "name": format!("Song {}", q["time_range"]),
                                    "album": {"images": [{"url": "https://img/1"}, {"url": "https://img/2"}]},
                                    "artists": [{"name": "First"}, {"name": "Second"}]
                                },
                                {
                                    "name": "Bare",
                                    "album": {"images": []},
                                    "artists": []
                                }
                            ]
                        }))
                        .into_response()
                    },
                ),
            )
    }

    #[tokio::test]
    async fn test_current_user() {
        let base = spawn(mock_api()).await;
        let api = MusicApi::new(base, Duration::from_secs(5)).unwrap();
        let user = api.current_user(&token("good")).await.unwrap();
        assert_eq!(user.id, "wizzler");
        assert_eq!(user.display_name.as_deref(), Some("Wiz"));
    }

    #[tokio::test]
    async fn test_top_tracks_shapes_items() {
        let base = spawn(mock_api()).await;
        let api = MusicApi::new(base, Duration::from_secs(5)).unwrap();
        let tracks = api.top_tracks(&token("good"), TimeRange::Long).await.unwrap();
        assert_eq!(
            tracks,
            vec![
                Track {
                    img: "https://img/1".to_string(),
                    title: "Song long_term".to_string(),
                    artist: "First".to_string(),
                },
                Track {
                    img: String::new(),
                    title: "Bare".to_string(),
                    artist: String::new(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_token_is_unauthorized() {
        let base = spawn(mock_api()).await;
        let api = MusicApi::new(base, Duration::from_secs(5)).unwrap();
        let err = api.current_user(&token("revoked")).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn test_server_error_is_status() {
        let app = Router::new().route("/me", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let base = spawn(app).await;
        let api = MusicApi::new(base, Duration::from_secs(5)).unwrap();
        let err = api.current_user(&token("good")).await.unwrap_err();
        assert!(matches!(err, ApiError::Status(503)));
    }

    #[tokio::test]
    async fn test_unexpected_body_is_decode_error() {
        let app = Router::new().route("/me", get(|| async { Json(serde_json::json!({"name": 1})) }));
        let base = spawn(app).await;
        let api = MusicApi::new(base, Duration::from_secs(5)).unwrap();
        let err = api.current_user(&token("good")).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_time_range_parsing() {
        #[derive(Deserialize)]
        struct Q {
            #[serde(default)]
            time_range: TimeRange,
        }
        let q: Q = serde_json::from_str(r#"{"time_range": "medium_term"}"#).unwrap();
        assert_eq!(q.time_range, TimeRange::Medium);
        let q: Q = serde_json::from_str("{}").unwrap();
        assert_eq!(q.time_range, TimeRange::Short);
        assert!(serde_json::from_str::<Q>(r#"{"time_range": "forever"}"#).is_err());
        assert_eq!(TimeRange::Long.as_str(), "long_term");
    }
}
