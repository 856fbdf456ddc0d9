use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Sources, scanned in channel_id order
        manager
            .create_table(
                Table::create()
                    .table("channels")
                    .if_not_exists()
                    .col(
                        ColumnDef::new("channel_id")
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new("name").string().not_null())
                    .col(ColumnDef::new("created_at").timestamp().not_null())
                    .col(ColumnDef::new("updated_at").timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table("channel_tracks")
                    .if_not_exists()
                    .col(ColumnDef::new("channel_id").string().not_null())
                    .col(ColumnDef::new("track_composite").string().not_null())
                    .col(ColumnDef::new("name").string().not_null())
                    .col(
                        ColumnDef::new("match_state")
                            .string()
                            .not_null()
                            .default("unmatched"),
                    )
                    .col(ColumnDef::new("spotify_uri").string())
                    .col(ColumnDef::new("spotify_playlist_id").string())
                    .col(ColumnDef::new("spotify_found_at").timestamp())
                    .col(ColumnDef::new("match_payload").json())
                    .col(ColumnDef::new("created_at").timestamp().not_null())
                    .col(ColumnDef::new("updated_at").timestamp().not_null())
                    .primary_key(
                        Index::create()
                            .col("channel_id")
                            .col("track_composite"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_channel_tracks_channel_id")
                            .from("channel_tracks", "channel_id")
                            .to("channels", "channel_id")
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_channel_tracks_backlog")
                    .table("channel_tracks")
                    .col("channel_id")
                    .col("match_state")
                    .col("track_composite")
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        // Managed playlists, newest assignment has the highest num
        manager
            .create_table(
                Table::create()
                    .table("channel_playlists")
                    .if_not_exists()
                    .col(ColumnDef::new("channel_id").string().not_null())
                    .col(ColumnDef::new("num").integer().not_null())
                    .col(ColumnDef::new("spotify_playlist_id").string().not_null())
                    .col(
                        ColumnDef::new("track_count")
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new("created_at").timestamp().not_null())
                    .col(ColumnDef::new("updated_at").timestamp().not_null())
                    .primary_key(Index::create().col("channel_id").col("num"))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table("duplicate_tracks")
                    .if_not_exists()
                    .col(ColumnDef::new("channel_id").string().not_null())
                    .col(ColumnDef::new("spotify_uri").string().not_null())
                    .col(ColumnDef::new("spotify_playlist_id").string().not_null())
                    .col(ColumnDef::new("created_at").timestamp().not_null())
                    .primary_key(Index::create().col("channel_id").col("spotify_uri"))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table("duplicate_tracks").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table("channel_playlists").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table("channel_tracks").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table("channels").to_owned())
            .await?;

        Ok(())
    }
}
