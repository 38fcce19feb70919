use std::sync::Arc;

use festival_brackets::competition::spawn_deadline_sweeper;
use festival_brackets::config::Config;
use festival_brackets::db::Database;
use festival_brackets::events::{spawn_event_logger, EventBus};
use festival_brackets::{metrics, Engine};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::connect(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to initialize database");
    let events = EventBus::new(config.event_buffer);
    let engine = Engine::new(Arc::new(db), events.clone(), config.engine_settings());

    if config.run_once {
        match engine.sweep_deadlines().await {
            Ok(report) => tracing::info!(
                "sweep finished: {} opened, {} closed, {} failed",
                report.opened,
                report.closed,
                report.failed
            ),
            Err(e) => {
                tracing::error!("sweep failed: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let logger = spawn_event_logger(&events);
    let sweeper = spawn_deadline_sweeper(engine, config.sweep_interval);
    tracing::info!(
        "festival-brackets running, sweeping every {}s",
        config.sweep_interval.as_secs()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
    tracing::info!("shutting down");
    sweeper.abort();
    logger.abort();
    tracing::debug!("{}", metrics::gather_metrics());
}
