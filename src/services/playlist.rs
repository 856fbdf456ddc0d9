use std::sync::Arc;

use chrono::Utc;
use color_eyre::eyre::{OptionExt, Result, WrapErr, eyre};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::ExprTrait;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::database::Database;
use crate::entities;
use crate::ports::spotify::SpotifyClient;

/// Name of the `num`-th managed playlist of a channel.
pub fn playlist_name(channel_name: &str, num: i32) -> String {
    if num <= 1 {
        channel_name.to_string()
    } else {
        format!("{} #{}", channel_name, num)
    }
}

/// Keeps one active Spotify playlist per channel and rolls over to a new one
/// once it holds `max_length` tracks.
pub struct PlaylistAssigner<C: SpotifyClient> {
    db: Arc<Database>,
    client: Arc<C>,
    max_length: i32,
}

impl<C: SpotifyClient> PlaylistAssigner<C> {
    pub fn new(db: Arc<Database>, client: Arc<C>, max_length: i32) -> Self {
        Self {
            db,
            client,
            max_length,
        }
    }

    async fn latest(&self, channel_id: &str) -> Result<Option<entities::channel_playlist::Model>> {
        entities::channel_playlist::Entity::find()
            .filter(entities::channel_playlist::Column::ChannelId.eq(channel_id))
            .order_by_desc(entities::channel_playlist::Column::Num)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch channel playlist")
    }

    /// The playlist new tracks of `channel_id` go into, created on demand.
    pub async fn assign(&self, channel_id: &str) -> Result<entities::channel_playlist::Model> {
        match self.latest(channel_id).await? {
            Some(playlist) if playlist.track_count < self.max_length => Ok(playlist),
            Some(full) => {
                tracing::info!(
                    channel_id,
                    num = full.num,
                    track_count = full.track_count,
                    "Playlist is full, starting a new one"
                );
                self.create(channel_id, full.num + 1).await
            }
            None => self.create(channel_id, 1).await,
        }
    }

    async fn create(&self, channel_id: &str, num: i32) -> Result<entities::channel_playlist::Model> {
        let channel = entities::channel::Entity::find_by_id(channel_id.to_string())
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch channel")?
            .ok_or_eyre("Channel not found")?;

        let created = self
            .client
            .create_playlist(&playlist_name(&channel.name, num))
            .await?;

        let playlist = entities::channel_playlist::ActiveModel {
            channel_id: Set(channel_id.to_string()),
            num: Set(num),
            spotify_playlist_id: Set(created.id),
            ..entities::channel_playlist::ActiveModel::new()
        }
        .insert(&self.db.conn)
        .await
        .wrap_err("Failed to save channel playlist")?;

        tracing::info!(
            channel_id,
            num,
            spotify_playlist_id = %playlist.spotify_playlist_id,
            name = %created.name,
            "Created playlist for channel"
        );
        Ok(playlist)
    }

    /// Put a track at the top of `playlist`. Not counted against the
    /// playlist's capacity until [`PlaylistAssigner::count_placement`].
    pub async fn prepend(
        &self,
        playlist: &entities::channel_playlist::Model,
        spotify_uri: &str,
    ) -> Result<()> {
        self.client
            .prepend_track(&playlist.spotify_playlist_id, spotify_uri)
            .await
    }

    /// Count one more track in `playlist`. A single `UPDATE`, so overlapping
    /// invocations do not lose increments.
    pub async fn count_placement(&self, playlist: &entities::channel_playlist::Model) -> Result<()> {
        let result = entities::channel_playlist::Entity::update_many()
            .col_expr(
                entities::channel_playlist::Column::TrackCount,
                Expr::col(entities::channel_playlist::Column::TrackCount).add(1),
            )
            .col_expr(
                entities::channel_playlist::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(entities::channel_playlist::Column::ChannelId.eq(playlist.channel_id.as_str()))
            .filter(entities::channel_playlist::Column::Num.eq(playlist.num))
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to update playlist track count")?;

        if result.rows_affected == 0 {
            return Err(eyre!(
                "Channel playlist {} #{} not found",
                playlist.channel_id,
                playlist.num
            ));
        }
        Ok(())
    }

    /// [`PlaylistAssigner::prepend`] followed by
    /// [`PlaylistAssigner::count_placement`].
    #[cfg(test)]
    async fn append(
        &self,
        playlist: &entities::channel_playlist::Model,
        spotify_uri: &str,
    ) -> Result<()> {
        self.prepend(playlist, spotify_uri).await?;
        self.count_placement(playlist).await
    }
}
