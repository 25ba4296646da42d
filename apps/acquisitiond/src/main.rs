//! Acquisition daemon.
//!
//! Connects to PostgreSQL and redis, recovers any jobs orphaned by a
//! previous run, and runs the acquisition scheduler until SIGINT.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use damwatch_acquisition::{
    AcquisitionConfig, AcquisitionScheduler, JobProcessor, JobQueue, JobService,
};
use damwatch_db::{run_migrations, DbPool};
use damwatch_telemetry::{TelemetryClient, TelemetryCredentials};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match AcquisitionConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        collection_start = %config.collection_start_date,
        "Starting acquisition daemon"
    );

    let db = match DbPool::connect(&config.database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to connect to PostgreSQL");
            std::process::exit(1);
        }
    };

    if let Err(e) = run_migrations(db.inner()).await {
        error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }

    let queue = match JobQueue::connect(&config.redis_url).await {
        Ok(queue) => queue,
        Err(e) => {
            error!(error = %e, "Failed to connect to redis");
            std::process::exit(1);
        }
    };

    let credentials = TelemetryCredentials {
        username: config.telemetry_username.clone(),
        password: config.telemetry_password.clone(),
    };
    let telemetry = match TelemetryClient::new(&config.telemetry_base_url, credentials) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build telemetry client");
            std::process::exit(1);
        }
    };

    let service = Arc::new(JobService::new(
        db.inner().clone(),
        queue,
        config.collection_start_date,
    ));
    let processor = JobProcessor::new(db.inner().clone(), Arc::clone(&service), telemetry);

    // Re-offer anything a previous run left behind before taking work.
    match service.recover_orphaned_jobs().await {
        Ok(count) if count > 0 => info!(count, "Recovered jobs from previous run"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Orphan recovery failed, continuing"),
    }

    if let Err(e) = processor.verify_credentials().await {
        // Not fatal: the service may be down right now and back before
        // the first job runs.
        warn!(error = %e, "Telemetry credential check failed");
    }

    let scheduler = Arc::new(AcquisitionScheduler::new(
        Arc::clone(&service),
        processor,
        config.scheduler.clone(),
    ));

    let runner = Arc::clone(&scheduler);
    let handle = tokio::spawn(async move { runner.run().await });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    scheduler.shutdown();
    if let Err(e) = handle.await {
        error!(error = %e, "Scheduler task panicked");
    }

    info!("Acquisition daemon stopped");
}
