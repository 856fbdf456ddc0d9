use std::sync::Arc;

use color_eyre::eyre::Result;

use crate::config::Config;
use crate::database::Database;
use crate::ports::track_name::SeparatorParser;
use crate::services::cursor::CursorStore;
use crate::services::reconcile::{ReconcileOptions, Reconciler};
use crate::services::spotify::client::SpotifyHttpAdapter;
use crate::services::spotify::token::SpotifyTokenStore;

pub fn reconcile_options(config: &Config) -> ReconcileOptions {
    ReconcileOptions {
        batch_size: config.batch_size,
        playlist_max_length: config.playlist_max_length,
    }
}

/// Wire the production reconciler: Spotify over HTTP with credentials from
/// the token store.
pub async fn build_reconciler(
    db: Arc<Database>,
    config: &Config,
) -> Result<Reconciler<SpotifyHttpAdapter>> {
    let spotify_config = config.spotify_config()?;
    let tokens = SpotifyTokenStore::new(CursorStore::new(db.clone()));
    let client = SpotifyHttpAdapter::connect(&spotify_config, &tokens).await?;

    Ok(Reconciler::new(
        db,
        Arc::new(client),
        Arc::new(SeparatorParser::new()?),
        reconcile_options(config),
    ))
}
