use chrono::Utc;
use dialogue::config::WorkerConfig;
use dialogue::repos::{ContextRepository, Store};
use tracing::{debug, error, info};
use uuid::Uuid;

pub(crate) async fn purge_expired_contexts(
    store: &Store,
    config: &WorkerConfig,
    worker_id: Uuid,
) -> u64 {
    let now = Utc::now();
    let purged_rows = match store
        .purge_expired(now, i64::from(config.purge_batch_size))
        .await
    {
        Ok(purged_rows) => purged_rows,
        Err(err) => {
            error!(
                worker_id = %worker_id,
                "failed to purge expired conversation contexts: {err}"
            );
            return 0;
        }
    };

    if purged_rows > 0 {
        info!(
            worker_id = %worker_id,
            purged_rows,
            batch_size = config.purge_batch_size,
            "conversation context purge tick"
        );
    } else {
        debug!(
            worker_id = %worker_id,
            batch_size = config.purge_batch_size,
            "conversation context purge tick found no expired rows"
        );
    }

    purged_rows
}
