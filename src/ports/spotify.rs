use color_eyre::eyre::Result;

/// Decoupled representation of a Spotify search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotifyApiTrack {
    pub uri: String,
    pub name: String,
    pub artists: Vec<String>,
    /// The track object exactly as the API returned it.
    pub raw: serde_json::Value,
}

/// Decoupled representation of a playlist created through the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyApiPlaylist {
    pub id: String,
    pub name: String,
}

/// Port trait wrapping the Spotify API capabilities used by the mirror.
///
/// Implementations live in `services::spotify::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SpotifyClient: Send + Sync {
    /// Best catalog hit for a search query, if any.
    async fn search_track(&self, query: &str) -> Result<Option<SpotifyApiTrack>>;

    async fn create_playlist(&self, name: &str) -> Result<SpotifyApiPlaylist>;

    /// Insert a track at the top of a playlist. Not idempotent.
    async fn prepend_track(&self, playlist_id: &str, uri: &str) -> Result<()>;
}
