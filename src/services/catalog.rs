use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr, eyre};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelBehavior, ActiveModelTrait, EntityTrait, Set};

use crate::database::Database;
use crate::entities;
use crate::services::reconcile::TrackChangeEvent;

/// Writes to the source catalog: the channels being mirrored and the tracks
/// seen on them.
pub struct CatalogService {
    db: Arc<Database>,
}

impl CatalogService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Start mirroring a channel. A channel already mirrored keeps its
    /// original name. Returns whether the channel was new.
    pub async fn add_channel(&self, channel_id: &str, name: &str) -> Result<bool> {
        let channel = entities::channel::ActiveModel {
            channel_id: Set(channel_id.to_string()),
            name: Set(name.to_string()),
            ..entities::channel::ActiveModel::new()
        };

        let inserted = entities::channel::Entity::insert(channel)
            .on_conflict(
                OnConflict::column(entities::channel::Column::ChannelId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db.conn)
            .await
            .wrap_err("Failed to save channel")?;

        if inserted == 0 {
            tracing::info!(channel_id, "Channel already mirrored, keeping its name");
            return Ok(false);
        }
        tracing::info!(channel_id, name, "Channel added");
        Ok(true)
    }

    /// Record a track seen on a channel. Returns the change event when the
    /// track is new, `None` when it was already known.
    pub async fn observe_track(
        &self,
        channel_id: &str,
        track_composite: &str,
        name: &str,
    ) -> Result<Option<TrackChangeEvent>> {
        let known_channel = entities::channel::Entity::find_by_id(channel_id.to_string())
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch channel")?;
        if known_channel.is_none() {
            return Err(eyre!("Unknown channel {channel_id}, add it first"));
        }

        let existing = entities::channel_track::Entity::find_by_id((
            channel_id.to_string(),
            track_composite.to_string(),
        ))
        .one(&self.db.conn)
        .await
        .wrap_err("Failed to check for existing track")?;
        if existing.is_some() {
            tracing::debug!(channel_id, track = track_composite, "Track already known");
            return Ok(None);
        }

        entities::channel_track::ActiveModel {
            channel_id: Set(channel_id.to_string()),
            track_composite: Set(track_composite.to_string()),
            name: Set(name.to_string()),
            ..entities::channel_track::ActiveModel::new()
        }
        .insert(&self.db.conn)
        .await
        .wrap_err("Failed to save track")?;

        tracing::info!(channel_id, track = track_composite, name, "New track");
        Ok(Some(TrackChangeEvent {
            channel_id: channel_id.to_string(),
            track_composite: track_composite.to_string(),
            name: name.to_string(),
            spotify_uri: None,
        }))
    }
}
