//! Background eviction of expired records.

use crate::config::SweeperConfig;
use cairn_core::{Datastore, Disposition, Record, RecordOutcome, Result, Timestamp};
use std::sync::Arc;
use tokio::time::{Duration, interval};

/// Spawn the periodic sweep task. It runs until the runtime shuts down.
pub fn spawn_sweeper_task(
    store: Arc<dyn Datastore>,
    config: SweeperConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(config.interval_secs));
        loop {
            tick.tick().await;
            match sweep_expired(store.as_ref(), Timestamp::now(), config.max_per_tick).await {
                Ok(0) => {}
                Ok(evicted) => tracing::info!("evicted {} expired records", evicted),
                Err(e) => tracing::warn!("expiry sweep failed: {}", e),
            }
        }
    })
}

/// Discard up to `limit` records that expired before `now`, oldest first.
pub async fn sweep_expired(store: &dyn Datastore, now: Timestamp, limit: usize) -> Result<usize> {
    let mut evicted = 0usize;

    while evicted < limit {
        let outcome = store
            .get_expiration(now, Box::new(|_: &Record| Disposition::Discard))
            .await?;
        match outcome {
            RecordOutcome::Found(record) => {
                tracing::debug!("evicted uid={} expiry={}", record.uid, record.expiry);
                evicted += 1;
            }
            RecordOutcome::NotFound => break,
        }
    }

    Ok(evicted)
}
