use std::sync::Arc;

use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::entities;
use crate::entities::channel_track::MatchState;
use crate::services::cursor::Token;
use crate::services::matcher::CatalogMatch;

#[derive(Debug, Serialize, Deserialize)]
struct TrackKey {
    channel_id: String,
    track_composite: String,
}

#[derive(Debug, Clone)]
pub struct TrackBatch {
    pub tracks: Vec<entities::channel_track::Model>,
    /// Set only when more unmatched tracks follow the last one returned.
    pub next: Option<Token>,
}

/// Reads and settles a channel's unmatched tracks.
pub struct TrackBacklog {
    db: Arc<Database>,
}

impl TrackBacklog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Up to `batch_size` unmatched tracks of `channel_id` in `track_composite`
    /// order, strictly after `resume`. A token from another channel, or one
    /// that cannot be read, restarts the channel from its first track.
    pub async fn next_batch(
        &self,
        channel_id: &str,
        resume: Option<&Token>,
        batch_size: u64,
    ) -> Result<TrackBatch> {
        let after = resume.and_then(|token| match token.decode::<TrackKey>() {
            Ok(key) if key.channel_id == channel_id => Some(key.track_composite),
            Ok(key) => {
                tracing::warn!(
                    cursor_channel = %key.channel_id,
                    channel_id,
                    "Track cursor belongs to another channel, starting from first track"
                );
                None
            }
            Err(error) => {
                tracing::warn!(%error, "Discarding unreadable track cursor");
                None
            }
        });

        match &after {
            Some(after) => tracing::info!(after = %after, "Starting from track"),
            None => tracing::info!("Starting from first track"),
        }

        let mut query = entities::channel_track::Entity::find()
            .filter(entities::channel_track::Column::ChannelId.eq(channel_id))
            .filter(entities::channel_track::Column::MatchState.eq(MatchState::Unmatched));
        if let Some(after) = after {
            query = query.filter(entities::channel_track::Column::TrackComposite.gt(after));
        }

        // One extra row tells whether anything is left after this batch
        let mut tracks = query
            .order_by_asc(entities::channel_track::Column::TrackComposite)
            .limit(batch_size + 1)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch unmatched tracks")?;

        let next = if tracks.len() as u64 > batch_size {
            tracks.truncate(batch_size as usize);
            tracks
                .last()
                .map(|last| {
                    Token::encode(&TrackKey {
                        channel_id: last.channel_id.clone(),
                        track_composite: last.track_composite.clone(),
                    })
                })
                .transpose()?
        } else {
            None
        };

        Ok(TrackBatch { tracks, next })
    }

    /// Record the match on a still-unmatched track. Returns false when the
    /// track is missing or was already matched.
    pub async fn mark_matched(
        &self,
        channel_id: &str,
        track_composite: &str,
        catalog_match: &CatalogMatch,
        spotify_playlist_id: &str,
    ) -> Result<bool> {
        let update = entities::channel_track::ActiveModel {
            match_state: Set(MatchState::Matched),
            spotify_uri: Set(Some(catalog_match.uri.clone())),
            spotify_playlist_id: Set(Some(spotify_playlist_id.to_string())),
            spotify_found_at: Set(Some(Utc::now())),
            match_payload: Set(Some(catalog_match.payload.clone())),
            updated_at: Set(Utc::now()),
            // Everything else NotSet so the insert-time columns survive
            ..ActiveModelTrait::default()
        };

        let result = entities::channel_track::Entity::update_many()
            .set(update)
            .filter(entities::channel_track::Column::ChannelId.eq(channel_id))
            .filter(entities::channel_track::Column::TrackComposite.eq(track_composite))
            .filter(entities::channel_track::Column::MatchState.eq(MatchState::Unmatched))
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to mark track as matched")?;

        Ok(result.rows_affected > 0)
    }
}
