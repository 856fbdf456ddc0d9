use color_eyre::eyre::{Result, WrapErr};

use crate::config::SpotifyConfig;
use crate::ports::spotify::{SpotifyApiPlaylist, SpotifyApiTrack, SpotifyClient};
use crate::services::spotify::token::SpotifyTokenStore;
use crate::spotify_rs::client::SpotifyWebClient;
use crate::spotify_rs::types::SpotifyTrack;

const PLAYLIST_DESCRIPTION: &str = "Music from the channel, newest first.";

/// Production [`SpotifyClient`] backed by the Spotify Web API.
pub struct SpotifyHttpAdapter {
    web: SpotifyWebClient,
    user_id: String,
}

impl SpotifyHttpAdapter {
    /// Build a client with a fresh access token from the token store.
    pub async fn connect(config: &SpotifyConfig, tokens: &SpotifyTokenStore) -> Result<Self> {
        let http = reqwest::Client::new();
        let access_token = tokens.access_token(&http, config).await?;

        Ok(Self {
            web: SpotifyWebClient::new(http, access_token),
            user_id: config.user_id.clone(),
        })
    }
}

fn to_api_track(raw: serde_json::Value) -> Result<SpotifyApiTrack> {
    let track: SpotifyTrack =
        serde_json::from_value(raw.clone()).wrap_err("Unexpected spotify track object")?;

    Ok(SpotifyApiTrack {
        uri: track.uri,
        name: track.name,
        artists: track.artists.into_iter().map(|artist| artist.name).collect(),
        raw,
    })
}

#[async_trait::async_trait]
impl SpotifyClient for SpotifyHttpAdapter {
    async fn search_track(&self, query: &str) -> Result<Option<SpotifyApiTrack>> {
        let items = self
            .web
            .search_tracks(query, 1)
            .await
            .wrap_err("Failed to search spotify")?;

        items.into_iter().next().map(to_api_track).transpose()
    }

    async fn create_playlist(&self, name: &str) -> Result<SpotifyApiPlaylist> {
        let playlist = self
            .web
            .create_playlist(&self.user_id, name, PLAYLIST_DESCRIPTION)
            .await
            .wrap_err_with(|| format!("Failed to create spotify playlist {name}"))?;

        Ok(SpotifyApiPlaylist {
            id: playlist.id,
            name: playlist.name,
        })
    }

    async fn prepend_track(&self, playlist_id: &str, uri: &str) -> Result<()> {
        let snapshot_id = self
            .web
            .add_tracks(playlist_id, &[uri.to_string()], 0)
            .await
            .wrap_err_with(|| format!("Failed to add {uri} to playlist {playlist_id}"))?;

        tracing::debug!(playlist_id, uri, snapshot_id, "Added track to playlist");
        Ok(())
    }
}
