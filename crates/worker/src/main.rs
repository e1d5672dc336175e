use dialogue::config::WorkerConfig;
use dialogue::repos::Store;
use tokio::signal;
use tokio::time::{self, Duration};
use tracing::{error, info};
use uuid::Uuid;

mod context_purge;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "worker=debug".to_string()))
        .init();

    let config = match WorkerConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read worker config: {err}");
            std::process::exit(1);
        }
    };

    let store = match Store::connect(&config.database_url, config.database_max_connections).await {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to postgres: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = store.run_migrations().await {
        error!("failed to run migrations: {err}");
        std::process::exit(1);
    }

    let worker_id = Uuid::new_v4();
    info!(
        worker_id = %worker_id,
        "context purge worker starting (tick every {} seconds)",
        config.tick_seconds
    );

    let mut ticker = time::interval(Duration::from_secs(config.tick_seconds));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                context_purge::purge_expired_contexts(&store, &config, worker_id).await;
            }
        }
    }
}
