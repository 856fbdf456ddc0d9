use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelBehavior, EntityTrait, Set};

use crate::database::Database;
use crate::entities;

/// Record of which (channel, spotify uri) pairs already sit in a playlist.
///
/// There is no compare-and-swap between [`DuplicateIndex::is_duplicate`] and
/// [`DuplicateIndex::record`]: two overlapping invocations can both pass the
/// check and place the same track twice.
pub struct DuplicateIndex {
    db: Arc<Database>,
}

impl DuplicateIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn is_duplicate(&self, channel_id: &str, spotify_uri: &str) -> Result<bool> {
        let entry = entities::duplicate_track::Entity::find_by_id((
            channel_id.to_string(),
            spotify_uri.to_string(),
        ))
        .one(&self.db.conn)
        .await
        .wrap_err("Failed to check duplicate index")?;

        Ok(entry.is_some())
    }

    /// Overwrites the playlist of an existing entry.
    pub async fn record(
        &self,
        channel_id: &str,
        spotify_uri: &str,
        spotify_playlist_id: &str,
    ) -> Result<()> {
        let entry = entities::duplicate_track::ActiveModel {
            channel_id: Set(channel_id.to_string()),
            spotify_uri: Set(spotify_uri.to_string()),
            spotify_playlist_id: Set(spotify_playlist_id.to_string()),
            ..entities::duplicate_track::ActiveModel::new()
        };

        entities::duplicate_track::Entity::insert(entry)
            .on_conflict(
                OnConflict::columns([
                    entities::duplicate_track::Column::ChannelId,
                    entities::duplicate_track::Column::SpotifyUri,
                ])
                .update_column(entities::duplicate_track::Column::SpotifyPlaylistId)
                .to_owned(),
            )
            .exec_without_returning(&self.db.conn)
            .await
            .wrap_err("Failed to add track to duplicate index")?;

        tracing::debug!(channel_id, spotify_uri, spotify_playlist_id, "Recorded placement");
        Ok(())
    }
}
