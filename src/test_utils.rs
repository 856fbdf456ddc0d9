use std::sync::Arc;

use sea_orm::{ActiveModelBehavior, ActiveModelTrait, ConnectionTrait, Database as SeaDatabase, Set};

use crate::database::Database;
use crate::entities;

/// Fresh in-memory database with `schema.sql` applied.
pub async fn test_db() -> Arc<Database> {
    let conn = SeaDatabase::connect("sqlite::memory:?mode=rwc").await.unwrap();

    conn.execute_unprepared("PRAGMA foreign_keys = ON")
        .await
        .unwrap();

    // Comments are dropped before splitting so they may contain `;`
    let schema: String = include_str!("../schema.sql")
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    for stmt in schema.split(';') {
        let stmt = stmt.trim();
        if stmt.is_empty() {
            continue;
        }
        conn.execute_unprepared(stmt)
            .await
            .unwrap_or_else(|e| panic!("Failed to execute SQL: {}\nStatement: {}", e, stmt));
    }

    Arc::new(Database { conn })
}

pub async fn insert_channel(db: &Database, channel_id: &str, name: &str) {
    entities::channel::ActiveModel {
        channel_id: Set(channel_id.into()),
        name: Set(name.into()),
        ..entities::channel::ActiveModel::new()
    }
    .insert(&db.conn)
    .await
    .unwrap();
}

pub async fn insert_track(db: &Database, channel_id: &str, track_composite: &str, name: &str) {
    entities::channel_track::ActiveModel {
        channel_id: Set(channel_id.into()),
        track_composite: Set(track_composite.into()),
        name: Set(name.into()),
        ..entities::channel_track::ActiveModel::new()
    }
    .insert(&db.conn)
    .await
    .unwrap();
}

#[cfg(test)]
mod tests {
    use sea_orm::{EntityTrait, PaginatorTrait};

    use super::*;

    #[tokio::test]
    async fn test_db_has_every_table() {
        let db = test_db().await;
        insert_channel(&db, "UC-a", "Channel A").await;
        insert_track(&db, "UC-a", "t1", "Artist - Song").await;

        assert_eq!(entities::channel::Entity::find().count(&db.conn).await.unwrap(), 1);
        assert_eq!(entities::channel_track::Entity::find().count(&db.conn).await.unwrap(), 1);
        assert_eq!(entities::channel_playlist::Entity::find().count(&db.conn).await.unwrap(), 0);
        assert_eq!(entities::duplicate_track::Entity::find().count(&db.conn).await.unwrap(), 0);
        assert_eq!(entities::cursor::Entity::find().count(&db.conn).await.unwrap(), 0);
    }
}
