use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::entities;
use crate::services::cursor::Token;

#[derive(Debug, Serialize, Deserialize)]
struct ChannelKey {
    channel_id: String,
}

/// One step of the sweep over the channel catalog.
#[derive(Debug, Clone)]
pub struct SourcePage {
    pub channel: entities::channel::Model,
    /// Resumes the sweep after `channel`.
    pub next: Token,
    /// The sweep ran off the end of the catalog and restarted from the first
    /// channel. The persisted channel cursor is stale and must be dropped.
    pub wrapped: bool,
}

/// Walks channels in `channel_id` order, one per call.
pub struct ChannelScanner {
    db: Arc<Database>,
}

impl ChannelScanner {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The first channel strictly after `resume`, wrapping around to the
    /// first channel once the catalog is exhausted. `None` only when there
    /// are no channels at all.
    pub async fn next_source(&self, resume: Option<&Token>) -> Result<Option<SourcePage>> {
        let after = match resume {
            None => None,
            Some(token) => match token.decode::<ChannelKey>() {
                Ok(key) => Some(key.channel_id),
                Err(error) => {
                    tracing::warn!(%error, "Discarding unreadable channel cursor");
                    return self.wrap_around().await;
                }
            },
        };

        match (self.first_channel(after.as_deref()).await?, after) {
            (Some(channel), _) => Ok(Some(page(channel, false)?)),
            (None, Some(after)) => {
                tracing::info!(after = %after, "No next channel, re-initializing cursor");
                self.wrap_around().await
            }
            (None, None) => Ok(None),
        }
    }

    async fn wrap_around(&self) -> Result<Option<SourcePage>> {
        self.first_channel(None)
            .await?
            .map(|channel| page(channel, true))
            .transpose()
    }

    async fn first_channel(&self, after: Option<&str>) -> Result<Option<entities::channel::Model>> {
        let mut query = entities::channel::Entity::find()
            .order_by_asc(entities::channel::Column::ChannelId);
        if let Some(after) = after {
            query = query.filter(entities::channel::Column::ChannelId.gt(after));
        }

        query
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch next channel")
    }
}

fn page(channel: entities::channel::Model, wrapped: bool) -> Result<SourcePage> {
    let next = Token::encode(&ChannelKey {
        channel_id: channel.channel_id.clone(),
    })?;
    Ok(SourcePage {
        channel,
        next,
        wrapped,
    })
}
