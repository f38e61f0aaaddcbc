//! Event Storage worker
//!
//! Runs the poll and cleanup loops of every enabled table until Ctrl+C.
//! Outbox events of the `WebHook` provider are delivered over HTTP; events
//! without a handler are postponed by a day.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use event_storage::adapters::postgres::{create_pool, PostgresEventRepository};
use event_storage::adapters::{
    CleanupService, EventsProcessorService, WebhookConfig, WebhookEventPublisher,
};
use event_storage::application::{shutdown, DispatchConfig, DispatchManager, ProviderRegistry};
use event_storage::config::{AppConfig, EventBoxConfig, LoggingConfig};
use event_storage::domain::event_box::{EventBoxKind, EventProvider, Inbox, Outbox};
use event_storage::domain::foundation::{DomainError, ErrorCode};
use event_storage::ports::EventRepository;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    setup_logging(&config.logging);
    config.validate()?;

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let mut tasks = Vec::new();

    if config.outbox.is_enabled {
        let registry = ProviderRegistry::<Outbox>::builder()
            .add_global_publisher(
                EventProvider::WebHook,
                WebhookEventPublisher::new(WebhookConfig::default())?,
            )
            .build();
        tasks.extend(start_table(&config, &config.outbox, registry, &shutdown_rx).await?);
    }

    if config.inbox.is_enabled {
        let registry = ProviderRegistry::<Inbox>::builder().build();
        tasks.extend(start_table(&config, &config.inbox, registry, &shutdown_rx).await?);
    }

    if tasks.is_empty() {
        tracing::warn!("Neither the inbox nor the outbox is enabled, nothing to run");
        return Ok(());
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to setup signal handler: {}", e);
    }
    tracing::info!("Shutting down gracefully...");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task ended abnormally");
        }
    }

    Ok(())
}

/// Setup logging; `RUST_LOG` wins over the configured level.
fn setup_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

/// Create the table of one direction and spawn its processor and cleanup loops.
async fn start_table<K: EventBoxKind>(
    config: &AppConfig,
    box_config: &EventBoxConfig,
    registry: ProviderRegistry<K>,
    shutdown: &watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, DomainError> {
    let url = config.connection_url(box_config).ok_or_else(|| {
        DomainError::new(
            ErrorCode::ConfigurationError,
            format!("No connection string configured for the {} table", K::NAME),
        )
    })?;
    let pool = create_pool(&config.database, url).await?;
    let repository: Arc<dyn EventRepository> =
        Arc::new(PostgresEventRepository::new(pool, box_config.table_name.clone())?);

    let manager = Arc::new(DispatchManager::with_config(
        repository.clone(),
        Arc::new(registry),
        DispatchConfig::from(box_config),
    ));
    let processor = EventsProcessorService::new(manager, box_config.poll_delay());
    processor.start().await?;

    let cleanup = CleanupService::new(
        repository,
        box_config.retention(),
        box_config.cleanup_interval(),
    );

    let processor_shutdown = shutdown.clone();
    let cleanup_shutdown = shutdown.clone();
    Ok(vec![
        tokio::spawn(async move { processor.run(processor_shutdown).await }),
        tokio::spawn(async move { cleanup.run(cleanup_shutdown).await }),
    ])
}
