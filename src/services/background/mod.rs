use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;

use crate::app;
use crate::config::Config;
use crate::database::Database;
use crate::services::reconcile::Trigger;

/// Keep the rediscovery sweep going until ctrl-c. Failed invocations are
/// logged and the next one starts after the usual interval.
pub async fn run_rediscovery_loop(db: Arc<Database>, config: Config) -> Result<()> {
    let interval = Duration::from_secs(config.rediscover_interval_secs);
    tracing::info!(interval_secs = interval.as_secs(), "Rediscovery loop started");

    loop {
        if let Err(e) = rediscover_once(&db, &config).await {
            tracing::error!("Rediscovery failed: {:?}", e);
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Rediscovery loop stopped");
                return Ok(());
            }
            _ = tokio::time::sleep(interval) => {
                tracing::debug!("Rediscovery woken by timer");
            }
        }
    }
}

async fn rediscover_once(db: &Arc<Database>, config: &Config) -> Result<()> {
    // Connect per invocation so an expired access token is refreshed
    let reconciler = app::build_reconciler(db.clone(), config).await?;
    reconciler.handle(Trigger::Rediscover).await?;
    Ok(())
}
