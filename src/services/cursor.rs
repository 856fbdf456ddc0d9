use std::sync::Arc;

use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, Set};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::database::Database;
use crate::entities;

/// Position of the rediscovery sweep in the channel catalog.
pub const CHANNEL_CURSOR: &str = "channel_cursor";
/// Position inside the current channel's unmatched backlog.
pub const TRACK_CURSOR: &str = "track_cursor";
/// Spotify credentials, see `services::spotify::token`.
pub const SPOTIFY_TOKEN: &str = "spotify_token";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed continuation token: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Opaque continuation token. Only the component that produced a token
/// knows how to read it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn encode<T: Serialize>(key: &T) -> Result<Self, TokenError> {
        Ok(Self(serde_json::to_string(key)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TokenError> {
        Ok(serde_json::from_str(&self.0)?)
    }

    #[cfg(test)]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Named checkpoints that survive between invocations.
#[derive(Clone)]
pub struct CursorStore {
    db: Arc<Database>,
}

impl CursorStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn get(&self, name: &str) -> Result<Option<Token>> {
        let cursor = entities::cursor::Entity::find_by_id(name.to_string())
            .one(&self.db.conn)
            .await
            .wrap_err_with(|| format!("Failed to read cursor {name}"))?;
        Ok(cursor.map(|cursor| Token(cursor.value)))
    }

    pub async fn set(&self, name: &str, token: &Token) -> Result<()> {
        let cursor = entities::cursor::ActiveModel {
            name: Set(name.to_string()),
            value: Set(token.0.clone()),
            updated_at: Set(Utc::now()),
        };

        entities::cursor::Entity::insert(cursor)
            .on_conflict(
                OnConflict::column(entities::cursor::Column::Name)
                    .update_columns([
                        entities::cursor::Column::Value,
                        entities::cursor::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db.conn)
            .await
            .wrap_err_with(|| format!("Failed to write cursor {name}"))?;

        tracing::debug!(cursor = name, value = token.as_str(), "Saved cursor");
        Ok(())
    }

    /// Removing a cursor that does not exist is not an error.
    pub async fn delete(&self, name: &str) -> Result<()> {
        entities::cursor::Entity::delete_by_id(name.to_string())
            .exec(&self.db.conn)
            .await
            .wrap_err_with(|| format!("Failed to delete cursor {name}"))?;

        tracing::debug!(cursor = name, "Deleted cursor");
        Ok(())
    }
}
