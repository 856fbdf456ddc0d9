use std::sync::Arc;

use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::database::Database;
use crate::entities::channel_track::MatchState;
use crate::ports::spotify::SpotifyClient;
use crate::ports::track_name::TrackNameParser;
use crate::services::backlog::TrackBacklog;
use crate::services::channel_scanner::ChannelScanner;
use crate::services::cursor::{CHANNEL_CURSOR, CursorStore, TRACK_CURSOR};
use crate::services::duplicates::DuplicateIndex;
use crate::services::matcher::MatchResolver;
use crate::services::playlist::PlaylistAssigner;

/// A track that was just inserted into the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackChangeEvent {
    pub channel_id: String,
    pub track_composite: String,
    pub name: String,
    #[serde(default)]
    pub spotify_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Trigger {
    /// Reconcile these freshly inserted tracks.
    Events(Vec<TrackChangeEvent>),
    /// Continue the sweep over every channel's unmatched backlog.
    Rediscover,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    AlreadyMatched,
    NoMatch,
    Duplicate { spotify_uri: String },
    Placed {
        spotify_uri: String,
        spotify_playlist_id: String,
    },
}

/// What one invocation did. Logged by callers; progress that matters is
/// already persisted by the time this is returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Channel visited by a rediscovery pass.
    pub channel_id: Option<String>,
    pub placed: usize,
    pub no_match: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

impl ReconcileReport {
    fn count(&mut self, outcome: &TrackOutcome) {
        match outcome {
            TrackOutcome::AlreadyMatched => self.skipped += 1,
            TrackOutcome::NoMatch => self.no_match += 1,
            TrackOutcome::Duplicate { .. } => self.duplicates += 1,
            TrackOutcome::Placed { .. } => self.placed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub batch_size: u64,
    pub playlist_max_length: i32,
}

struct PendingTrack<'a> {
    channel_id: &'a str,
    track_composite: &'a str,
    name: &'a str,
    matched: bool,
}

/// Matches catalog tracks against Spotify and files them into per-channel
/// playlists. Holds no state between invocations beyond what is in the
/// database.
pub struct Reconciler<C: SpotifyClient> {
    client: Arc<C>,
    parser: Arc<dyn TrackNameParser>,
    cursors: CursorStore,
    channels: ChannelScanner,
    backlog: TrackBacklog,
    duplicates: DuplicateIndex,
    playlists: PlaylistAssigner<C>,
    batch_size: u64,
}

impl<C: SpotifyClient> Reconciler<C> {
    pub fn new(
        db: Arc<Database>,
        client: Arc<C>,
        parser: Arc<dyn TrackNameParser>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            cursors: CursorStore::new(db.clone()),
            channels: ChannelScanner::new(db.clone()),
            backlog: TrackBacklog::new(db.clone()),
            duplicates: DuplicateIndex::new(db.clone()),
            playlists: PlaylistAssigner::new(db, client.clone(), options.playlist_max_length),
            client,
            parser,
            batch_size: options.batch_size.max(1),
        }
    }

    #[instrument(skip_all)]
    pub async fn handle(&self, trigger: Trigger) -> Result<ReconcileReport> {
        let mut resolver = MatchResolver::new(self.client.clone(), self.parser.clone());

        let report = match trigger {
            Trigger::Events(events) => self.dispatch_reactive(&mut resolver, &events).await?,
            Trigger::Rediscover => self.dispatch_batch(&mut resolver).await?,
        };

        tracing::info!(?report, "Reconciliation finished");
        Ok(report)
    }

    async fn dispatch_reactive(
        &self,
        resolver: &mut MatchResolver<C>,
        events: &[TrackChangeEvent],
    ) -> Result<ReconcileReport> {
        tracing::info!("Process {} tracks just added", events.len());
        let mut report = ReconcileReport::default();

        for event in events {
            if event.spotify_uri.is_some() {
                tracing::debug!(
                    channel_id = %event.channel_id,
                    track = %event.track_composite,
                    "Track already carries a spotify uri"
                );
                report.skipped += 1;
                continue;
            }

            let outcome = self
                .match_track(
                    resolver,
                    PendingTrack {
                        channel_id: &event.channel_id,
                        track_composite: &event.track_composite,
                        name: &event.name,
                        matched: false,
                    },
                )
                .await?;
            report.count(&outcome);
        }

        Ok(report)
    }

    async fn dispatch_batch(&self, resolver: &mut MatchResolver<C>) -> Result<ReconcileReport> {
        let channel_cursor = self.cursors.get(CHANNEL_CURSOR).await?;
        let Some(page) = self.channels.next_source(channel_cursor.as_ref()).await? else {
            tracing::info!("No channels to rediscover");
            return Ok(ReconcileReport::default());
        };
        if page.wrapped {
            self.cursors.delete(CHANNEL_CURSOR).await?;
        }

        let channel = &page.channel;
        tracing::info!(
            channel_id = %channel.channel_id,
            name = %channel.name,
            "Rediscovering channel"
        );

        let track_cursor = self.cursors.get(TRACK_CURSOR).await?;
        let batch = self
            .backlog
            .next_batch(&channel.channel_id, track_cursor.as_ref(), self.batch_size)
            .await?;

        let mut report = ReconcileReport {
            channel_id: Some(channel.channel_id.clone()),
            ..Default::default()
        };
        for track in &batch.tracks {
            let outcome = self
                .match_track(
                    resolver,
                    PendingTrack {
                        channel_id: &track.channel_id,
                        track_composite: &track.track_composite,
                        name: &track.name,
                        matched: track.match_state == MatchState::Matched,
                    },
                )
                .await?;
            report.count(&outcome);
        }

        match &batch.next {
            Some(next) => self.cursors.set(TRACK_CURSOR, next).await?,
            None => {
                tracing::info!(channel_id = %channel.channel_id, "Channel backlog exhausted");
                self.cursors.delete(TRACK_CURSOR).await?;
                self.cursors.set(CHANNEL_CURSOR, &page.next).await?;
            }
        }

        Ok(report)
    }

    async fn match_track(
        &self,
        resolver: &mut MatchResolver<C>,
        track: PendingTrack<'_>,
    ) -> Result<TrackOutcome> {
        if track.matched {
            return Ok(TrackOutcome::AlreadyMatched);
        }

        let Some(found) = resolver.resolve(track.name).await? else {
            tracing::info!(
                channel_id = track.channel_id,
                name = track.name,
                "No match on spotify"
            );
            return Ok(TrackOutcome::NoMatch);
        };

        tracing::info!(
            uri = %found.uri,
            artist = %found.artist,
            title = %found.title,
            name = track.name,
            "Found on spotify"
        );

        // The track stays unmatched in storage; rediscovery will look it up again
        if self
            .duplicates
            .is_duplicate(track.channel_id, &found.uri)
            .await?
        {
            tracing::info!(
                channel_id = track.channel_id,
                uri = %found.uri,
                "Duplicate, not adding to playlist"
            );
            return Ok(TrackOutcome::Duplicate {
                spotify_uri: found.uri,
            });
        }

        let playlist = self.playlists.assign(track.channel_id).await?;
        self.playlists.prepend(&playlist, &found.uri).await?;
        self.duplicates
            .record(track.channel_id, &found.uri, &playlist.spotify_playlist_id)
            .await?;
        self.playlists.count_placement(&playlist).await?;

        if !self
            .backlog
            .mark_matched(
                track.channel_id,
                track.track_composite,
                &found,
                &playlist.spotify_playlist_id,
            )
            .await?
        {
            tracing::warn!(
                channel_id = track.channel_id,
                track = track.track_composite,
                "Placed track has no unmatched record to update"
            );
        }

        Ok(TrackOutcome::Placed {
            spotify_uri: found.uri,
            spotify_playlist_id: playlist.spotify_playlist_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sea_orm::{EntityTrait, PaginatorTrait};

    use super::*;
    use crate::entities;
    use crate::ports::spotify::{MockSpotifyClient, SpotifyApiPlaylist, SpotifyApiTrack};
    use crate::ports::track_name::SeparatorParser;
    use crate::test_utils::{insert_channel, insert_track, test_db};

    type Placements = Arc<Mutex<Vec<(String, String)>>>;

    /// Mock catalog: `hits` maps track names to uris; everything else has no match.
    fn catalog(hits: &[(&str, &str)]) -> (MockSpotifyClient, Placements) {
        let parser = SeparatorParser::new().unwrap();
        let by_query: HashMap<String, String> = hits
            .iter()
            .map(|(name, uri)| {
                (
                    crate::services::matcher::search_query(&parser, name),
                    uri.to_string(),
                )
            })
            .collect();

        let mut client = MockSpotifyClient::new();
        client.expect_search_track().returning(move |query| {
            if query.contains("boom") {
                return Err(color_eyre::eyre::eyre!("search unavailable"));
            }
            Ok(by_query.get(query).map(|uri| SpotifyApiTrack {
                uri: uri.clone(),
                name: "Song".into(),
                artists: vec!["Artist".into()],
                raw: serde_json::json!({ "uri": uri }),
            }))
        });

        let created = AtomicUsize::new(0);
        client.expect_create_playlist().returning(move |name| {
            let n = created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SpotifyApiPlaylist {
                id: format!("pl-{n}"),
                name: name.to_string(),
            })
        });

        let placements: Placements = Arc::new(Mutex::new(Vec::new()));
        let recorded = placements.clone();
        client
            .expect_prepend_track()
            .returning(move |playlist_id, uri| {
                recorded
                    .lock()
                    .unwrap()
                    .push((playlist_id.to_string(), uri.to_string()));
                Ok(())
            });

        (client, placements)
    }

    fn reconciler(
        db: &Arc<Database>,
        client: MockSpotifyClient,
        batch_size: u64,
        playlist_max_length: i32,
    ) -> Reconciler<MockSpotifyClient> {
        Reconciler::new(
            db.clone(),
            Arc::new(client),
            Arc::new(SeparatorParser::new().unwrap()),
            ReconcileOptions {
                batch_size,
                playlist_max_length,
            },
        )
    }

    async fn track(db: &Database, channel_id: &str, key: &str) -> entities::channel_track::Model {
        entities::channel_track::Entity::find_by_id((channel_id.to_string(), key.to_string()))
            .one(&db.conn)
            .await
            .unwrap()
            .unwrap()
    }

    fn event(channel_id: &str, key: &str, name: &str) -> TrackChangeEvent {
        TrackChangeEvent {
            channel_id: channel_id.into(),
            track_composite: key.into(),
            name: name.into(),
            spotify_uri: None,
        }
    }

    #[tokio::test]
    async fn test_first_rediscovery_of_channel() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        insert_track(&db, "S1", "T1", "no match").await;
        insert_track(&db, "S1", "T2", "Artist – Song").await;

        let (client, placements) = catalog(&[("Artist – Song", "spotify:track:abc")]);
        let reconciler = reconciler(&db, client, 10, 100);

        let report = reconciler.handle(Trigger::Rediscover).await.unwrap();

        assert_eq!(report.channel_id.as_deref(), Some("S1"));
        assert_eq!(report.placed, 1);
        assert_eq!(report.no_match, 1);
        assert_eq!(
            *placements.lock().unwrap(),
            vec![("pl-1".to_string(), "spotify:track:abc".to_string())]
        );

        let t1 = track(&db, "S1", "T1").await;
        assert_eq!(t1.match_state, MatchState::Unmatched);
        let t2 = track(&db, "S1", "T2").await;
        assert_eq!(t2.match_state, MatchState::Matched);
        assert_eq!(t2.spotify_uri.as_deref(), Some("spotify:track:abc"));
        assert_eq!(t2.spotify_playlist_id.as_deref(), Some("pl-1"));

        let duplicates = DuplicateIndex::new(db.clone());
        assert!(duplicates.is_duplicate("S1", "spotify:track:abc").await.unwrap());

        let playlist = entities::channel_playlist::Entity::find_by_id(("S1".to_string(), 1))
            .one(&db.conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(playlist.spotify_playlist_id, "pl-1");

        let cursors = CursorStore::new(db.clone());
        assert!(cursors.get(TRACK_CURSOR).await.unwrap().is_none());
        let channel_cursor = cursors.get(CHANNEL_CURSOR).await.unwrap().unwrap();
        // Cursor points past S1, so a lone channel wraps on the next pass
        let scanner = ChannelScanner::new(db.clone());
        let next = scanner.next_source(Some(&channel_cursor)).await.unwrap().unwrap();
        assert!(next.wrapped);
    }

    #[tokio::test]
    async fn test_backlog_resumes_across_invocations() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        insert_channel(&db, "S2", "Channel Two").await;
        let names: Vec<String> = (1..=5).map(|i| format!("Artist{i} - Song{i}")).collect();
        for (i, name) in names.iter().enumerate() {
            insert_track(&db, "S1", &format!("T{i}"), name).await;
        }
        let uris: Vec<String> = (1..=5).map(|i| format!("spotify:track:{i}")).collect();
        let hits: Vec<(&str, &str)> = names
            .iter()
            .zip(&uris)
            .map(|(name, uri)| (name.as_str(), uri.as_str()))
            .collect();

        let (client, placements) = catalog(&hits);
        let reconciler = reconciler(&db, client, 2, 100);
        let cursors = CursorStore::new(db.clone());

        // ceil(5 / 2) invocations
        for expected in [2, 2, 1] {
            let report = reconciler.handle(Trigger::Rediscover).await.unwrap();
            assert_eq!(report.channel_id.as_deref(), Some("S1"));
            assert_eq!(report.placed, expected);
        }

        assert!(cursors.get(TRACK_CURSOR).await.unwrap().is_none());
        let mut placed: Vec<String> = placements
            .lock()
            .unwrap()
            .iter()
            .map(|(_, uri)| uri.clone())
            .collect();
        placed.sort();
        assert_eq!(placed, uris);

        // The sweep moves on to the next channel
        let report = reconciler.handle(Trigger::Rediscover).await.unwrap();
        assert_eq!(report.channel_id.as_deref(), Some("S2"));
    }

    #[tokio::test]
    async fn test_track_cursor_kept_mid_backlog() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        for key in ["T1", "T2", "T3"] {
            insert_track(&db, "S1", key, "no match").await;
        }

        let (client, _) = catalog(&[]);
        let reconciler = reconciler(&db, client, 2, 100);
        let cursors = CursorStore::new(db.clone());

        reconciler.handle(Trigger::Rediscover).await.unwrap();
        assert!(cursors.get(TRACK_CURSOR).await.unwrap().is_some());
        assert!(cursors.get(CHANNEL_CURSOR).await.unwrap().is_none());

        // Unmatched tracks are not revisited within the same sweep
        let report = reconciler.handle(Trigger::Rediscover).await.unwrap();
        assert_eq!(report.no_match, 1);
        assert!(cursors.get(TRACK_CURSOR).await.unwrap().is_none());
        assert!(cursors.get(CHANNEL_CURSOR).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_wraps_to_first_channel() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        insert_channel(&db, "S2", "Channel Two").await;
        insert_track(&db, "S1", "T1", "A - One").await;
        insert_track(&db, "S2", "T1", "B - Two").await;

        let (client, placements) =
            catalog(&[("A - One", "spotify:track:1"), ("B - Two", "spotify:track:2")]);
        let reconciler = reconciler(&db, client, 10, 100);

        let first = reconciler.handle(Trigger::Rediscover).await.unwrap();
        let second = reconciler.handle(Trigger::Rediscover).await.unwrap();
        assert_eq!(first.channel_id.as_deref(), Some("S1"));
        assert_eq!(second.channel_id.as_deref(), Some("S2"));

        // Already-matched tracks are filtered out, so the re-scan is empty
        let third = reconciler.handle(Trigger::Rediscover).await.unwrap();
        assert_eq!(third.channel_id.as_deref(), Some("S1"));
        assert_eq!(third.placed + third.no_match + third.duplicates, 0);
        assert_eq!(placements.lock().unwrap().len(), 2);

        let fourth = reconciler.handle(Trigger::Rediscover).await.unwrap();
        assert_eq!(fourth.channel_id.as_deref(), Some("S2"));
    }

    #[tokio::test]
    async fn test_wrapped_pass_clears_channel_cursor_first() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        insert_track(&db, "S1", "T1", "boom - One").await;

        // Sweep already past the last channel
        let scanner = ChannelScanner::new(db.clone());
        let past_last = scanner.next_source(None).await.unwrap().unwrap().next;
        let cursors = CursorStore::new(db.clone());
        cursors.set(CHANNEL_CURSOR, &past_last).await.unwrap();

        let (client, _) = catalog(&[]);
        let reconciler = reconciler(&db, client, 10, 100);

        assert!(reconciler.handle(Trigger::Rediscover).await.is_err());
        assert!(cursors.get(CHANNEL_CURSOR).await.unwrap().is_none());
        assert!(cursors.get(TRACK_CURSOR).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rediscover_empty_catalog() {
        let db = test_db().await;
        let mut client = MockSpotifyClient::new();
        client.expect_search_track().never();
        let reconciler = reconciler(&db, client, 10, 100);

        let report = reconciler.handle(Trigger::Rediscover).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
    }

    #[tokio::test]
    async fn test_same_event_twice_places_once() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        insert_track(&db, "S1", "T1", "Artist - Song").await;

        let (client, placements) = catalog(&[("Artist - Song", "spotify:track:abc")]);
        let reconciler = reconciler(&db, client, 10, 100);
        let events = vec![event("S1", "T1", "Artist - Song")];

        let first = reconciler
            .handle(Trigger::Events(events.clone()))
            .await
            .unwrap();
        let second = reconciler.handle(Trigger::Events(events)).await.unwrap();

        assert_eq!(first.placed, 1);
        assert_eq!(second.placed, 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(placements.lock().unwrap().len(), 1);
        let entries = entities::duplicate_track::Entity::find()
            .count(&db.conn)
            .await
            .unwrap();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn test_event_with_uri_is_skipped() {
        let db = test_db().await;
        let mut client = MockSpotifyClient::new();
        client.expect_search_track().never();
        client.expect_prepend_track().never();
        let reconciler = reconciler(&db, client, 10, 100);

        let mut with_uri = event("S1", "T1", "Artist - Song");
        with_uri.spotify_uri = Some("spotify:track:abc".into());

        let report = reconciler
            .handle(Trigger::Events(vec![with_uri]))
            .await
            .unwrap();
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_reactive_does_not_touch_cursors() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        insert_track(&db, "S1", "T1", "no match").await;

        let (client, _) = catalog(&[]);
        let reconciler = reconciler(&db, client, 10, 100);

        let report = reconciler
            .handle(Trigger::Events(vec![event("S1", "T1", "no match")]))
            .await
            .unwrap();

        assert_eq!(report.no_match, 1);
        let cursors = CursorStore::new(db.clone());
        assert!(cursors.get(CHANNEL_CURSOR).await.unwrap().is_none());
        assert!(cursors.get(TRACK_CURSOR).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_track_stays_unmatched() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        insert_track(&db, "S1", "T1", "Artist - Song").await;
        insert_track(&db, "S1", "T2", "Artist - Song (Official Video)").await;

        let (client, placements) = catalog(&[("Artist - Song", "spotify:track:abc")]);
        let reconciler = reconciler(&db, client, 10, 100);

        let report = reconciler.handle(Trigger::Rediscover).await.unwrap();
        assert_eq!(report.placed, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(placements.lock().unwrap().len(), 1);

        // Left unmatched, so every sweep resolves and rejects it again
        assert_eq!(
            track(&db, "S1", "T2").await.match_state,
            MatchState::Unmatched
        );
        let again = reconciler.handle(Trigger::Rediscover).await.unwrap();
        assert_eq!(again.duplicates, 1);
        assert_eq!(placements.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_full_playlist_rolls_over() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        insert_track(&db, "S1", "T1", "A - One").await;
        insert_track(&db, "S1", "T2", "B - Two").await;
        insert_track(&db, "S1", "T3", "C - Three").await;

        let (client, placements) = catalog(&[
            ("A - One", "spotify:track:1"),
            ("B - Two", "spotify:track:2"),
            ("C - Three", "spotify:track:3"),
        ]);
        let reconciler = reconciler(&db, client, 10, 2);

        reconciler.handle(Trigger::Rediscover).await.unwrap();

        assert_eq!(
            *placements.lock().unwrap(),
            vec![
                ("pl-1".to_string(), "spotify:track:1".to_string()),
                ("pl-1".to_string(), "spotify:track:2".to_string()),
                ("pl-2".to_string(), "spotify:track:3".to_string()),
            ]
        );
        let playlists = entities::channel_playlist::Entity::find()
            .all(&db.conn)
            .await
            .unwrap();
        assert_eq!(playlists.len(), 2);
        assert_eq!(track(&db, "S1", "T3").await.spotify_playlist_id.as_deref(), Some("pl-2"));
    }

    #[tokio::test]
    async fn test_failure_keeps_cursors_and_progress() {
        let db = test_db().await;
        insert_channel(&db, "S1", "Channel One").await;
        insert_track(&db, "S1", "T1", "A - One").await;
        insert_track(&db, "S1", "T2", "boom - Two").await;

        let (client, _) = catalog(&[("A - One", "spotify:track:1")]);
        let reconciler = reconciler(&db, client, 10, 100);

        let error = reconciler.handle(Trigger::Rediscover).await.unwrap_err();
        assert!(error.to_string().contains("search unavailable"));

        let cursors = CursorStore::new(db.clone());
        assert!(cursors.get(CHANNEL_CURSOR).await.unwrap().is_none());
        assert!(cursors.get(TRACK_CURSOR).await.unwrap().is_none());
        // Work done before the failure is durable
        assert_eq!(
            track(&db, "S1", "T1").await.match_state,
            MatchState::Matched
        );
        assert_eq!(
            track(&db, "S1", "T2").await.match_state,
            MatchState::Unmatched
        );
    }
}
