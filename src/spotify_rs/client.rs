use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;

use crate::spotify_rs::types::{SearchResponse, SnapshotResponse, SpotifyPlaylist};

const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SpotifyApiError {
    #[error("Spotify rejected the access token: {body}")]
    Unauthorized { body: String },
    #[error("Spotify rate limit reached (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },
    #[error("Spotify request failed with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to send http request: {0}")]
    FailedToSendRequest(reqwest::Error),
    #[error("Failed to parse response: {0}")]
    FailedToParseResponse(reqwest::Error),
}

/// Spotify Web API client bound to one access token
pub struct SpotifyWebClient {
    access_token: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CreatePlaylistBody<'a> {
    name: &'a str,
    public: bool,
    description: &'a str,
}

#[derive(Serialize)]
struct AddTracksBody<'a> {
    uris: &'a [String],
    position: u32,
}

impl SpotifyWebClient {
    pub fn new(client: reqwest::Client, access_token: String) -> Self {
        Self {
            access_token,
            client,
        }
    }

    /// Search the catalog for tracks, returning at most `limit` raw track objects.
    pub async fn search_tracks(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<serde_json::Value>, SpotifyApiError> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(format!("{SPOTIFY_API_URL}/search"))
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(SpotifyApiError::FailedToSendRequest)?;

        let page: SearchResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(SpotifyApiError::FailedToParseResponse)?;

        Ok(page.tracks.map(|tracks| tracks.items).unwrap_or_default())
    }

    /// Create a public playlist owned by `user_id`
    pub async fn create_playlist(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
    ) -> Result<SpotifyPlaylist, SpotifyApiError> {
        let response = self
            .client
            .post(format!("{SPOTIFY_API_URL}/users/{user_id}/playlists"))
            .json(&CreatePlaylistBody {
                name,
                public: true,
                description,
            })
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(SpotifyApiError::FailedToSendRequest)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(SpotifyApiError::FailedToParseResponse)
    }

    /// Insert tracks at `position`, returning the new snapshot id
    pub async fn add_tracks(
        &self,
        playlist_id: &str,
        uris: &[String],
        position: u32,
    ) -> Result<String, SpotifyApiError> {
        let response = self
            .client
            .post(format!("{SPOTIFY_API_URL}/playlists/{playlist_id}/tracks"))
            .json(&AddTracksBody { uris, position })
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(SpotifyApiError::FailedToSendRequest)?;

        let snapshot: SnapshotResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(SpotifyApiError::FailedToParseResponse)?;

        Ok(snapshot.snapshot_id)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SpotifyApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        return Err(SpotifyApiError::RateLimited { retry_after });
    }

    let body = response
        .text()
        .await
        .unwrap_or("Failed to get error text".to_string());
    if status == StatusCode::UNAUTHORIZED {
        Err(SpotifyApiError::Unauthorized { body })
    } else {
        Err(SpotifyApiError::Status { status, body })
    }
}
