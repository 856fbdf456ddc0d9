use chrono::{DateTime, Duration, Utc};
use color_eyre::eyre::{OptionExt, Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::config::SpotifyConfig;
use crate::services::cursor::{CursorStore, SPOTIFY_TOKEN, Token};
use crate::spotify_rs::auth::refresh_access_token;
use crate::spotify_rs::types::SpotifyTokenResponse;

/// Refresh this long before Spotify would reject the token.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSpotifyToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredSpotifyToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.access_token.is_empty()
            || self.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) <= now
    }

    /// Apply a token endpoint response. Spotify only sends a refresh token
    /// when it rotates it.
    fn refreshed(&self, response: SpotifyTokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| self.refresh_token.clone()),
            expires_at: now + Duration::seconds(response.expires_in as i64),
        }
    }
}

/// Spotify credentials kept alongside the sweep cursors.
pub struct SpotifyTokenStore {
    cursors: CursorStore,
}

impl SpotifyTokenStore {
    pub fn new(cursors: CursorStore) -> Self {
        Self { cursors }
    }

    pub async fn load(&self) -> Result<Option<StoredSpotifyToken>> {
        let Some(token) = self.cursors.get(SPOTIFY_TOKEN).await? else {
            return Ok(None);
        };
        let stored = token
            .decode()
            .wrap_err("Stored spotify token is unreadable, set a new refresh token")?;
        Ok(Some(stored))
    }

    pub async fn save(&self, stored: &StoredSpotifyToken) -> Result<()> {
        self.cursors
            .set(SPOTIFY_TOKEN, &Token::encode(stored)?)
            .await
    }

    /// Replace the stored credentials with a bare refresh token. The access
    /// token is fetched on next use.
    pub async fn seed_refresh_token(&self, refresh_token: &str) -> Result<()> {
        self.save(&StoredSpotifyToken {
            access_token: String::new(),
            refresh_token: refresh_token.to_string(),
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
        })
        .await?;
        tracing::info!("Stored spotify refresh token");
        Ok(())
    }

    /// A usable access token, refreshing and persisting it when expired.
    pub async fn access_token(
        &self,
        http: &reqwest::Client,
        config: &SpotifyConfig,
    ) -> Result<String> {
        let stored = self
            .load()
            .await?
            .ok_or_eyre("No spotify token stored, run `auth set-refresh-token` first")?;

        let now = Utc::now();
        if !stored.is_expired(now) {
            return Ok(stored.access_token);
        }

        tracing::info!(expires_at = %stored.expires_at, "Refreshing spotify access token");
        let response = refresh_access_token(
            http,
            &config.client_id,
            &config.client_secret,
            &stored.refresh_token,
        )
        .await
        .wrap_err("Failed to refresh spotify access token")?;

        let refreshed = stored.refreshed(response, now);
        self.save(&refreshed).await?;
        Ok(refreshed.access_token)
    }
}
