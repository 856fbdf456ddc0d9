use std::sync::Arc;

use color_eyre::eyre::Result;

use crate::memo::Memo;
use crate::ports::spotify::{SpotifyApiTrack, SpotifyClient};
use crate::ports::track_name::TrackNameParser;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMatch {
    pub uri: String,
    pub artist: String,
    pub title: String,
    pub payload: serde_json::Value,
}

impl From<SpotifyApiTrack> for CatalogMatch {
    fn from(track: SpotifyApiTrack) -> Self {
        Self {
            artist: track.artists.first().cloned().unwrap_or_default(),
            uri: track.uri,
            title: track.name,
            payload: track.raw,
        }
    }
}

/// Build the catalog query for an upload title: a fielded query when the
/// title splits into artist and track, the raw title otherwise.
pub fn search_query(parser: &dyn TrackNameParser, name: &str) -> String {
    match parser.split_artist_title(name) {
        Some((artist, title)) => format!(
            "track:\"{}\" artist:\"{}\"",
            title.replace('"', ""),
            artist.replace('"', "")
        ),
        None => {
            tracing::debug!(name, "Could not split artist and title, searching raw name");
            name.to_string()
        }
    }
}

/// Looks tracks up in the Spotify catalog. Results are cached for the life of
/// the resolver, so build one per invocation.
pub struct MatchResolver<C: SpotifyClient> {
    client: Arc<C>,
    parser: Arc<dyn TrackNameParser>,
    cache: Memo<String, Option<CatalogMatch>>,
}

impl<C: SpotifyClient> MatchResolver<C> {
    pub fn new(client: Arc<C>, parser: Arc<dyn TrackNameParser>) -> Self {
        Self {
            client,
            parser,
            cache: Memo::new(),
        }
    }

    /// Best catalog match for an upload title. Search failures are returned
    /// as-is.
    pub async fn resolve(&mut self, name: &str) -> Result<Option<CatalogMatch>> {
        let query = search_query(self.parser.as_ref(), name);
        let client = self.client.clone();

        self.cache
            .get_or_try_insert_with(query.clone(), || async move {
                let hit = client.search_track(&query).await?;
                Ok::<_, color_eyre::Report>(hit.map(CatalogMatch::from))
            })
            .await
    }
}
