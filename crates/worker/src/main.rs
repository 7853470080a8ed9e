use std::process::ExitCode;
use std::sync::Arc;

use adgen_db::PgRecordStore;
use adgen_events::EventBus;
use adgen_imagegen::HttpImageGenerator;
use adgen_pipeline::{ArchiveBuilder, Orchestrator};
use adgen_storage::LocalBlobStore;
use adgen_worker::config::WorkerConfig;
use adgen_worker::runner::{run_campaign, CampaignRequest};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let Some(request_path) = std::env::args().nth(1) else {
        eprintln!("usage: adgen-worker <campaign-request.json>");
        return ExitCode::from(2);
    };

    match run(&request_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Worker failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adgen_worker=debug,adgen_pipeline=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn run(request_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let raw = tokio::fs::read(request_path).await?;
    let request: CampaignRequest = serde_json::from_slice(&raw)?;
    let config = WorkerConfig::from_env()?;

    let pool = adgen_db::create_pool(&config.database_url).await?;
    adgen_db::run_migrations(&pool).await?;
    adgen_db::health_check(&pool).await?;
    tracing::info!("Database ready");

    let records = Arc::new(PgRecordStore::new(pool));
    let blobs = Arc::new(LocalBlobStore::new(
        config.blob_root.clone(),
        config.blob_public_base_url.clone(),
    ));
    let generator = Arc::new(HttpImageGenerator::new(
        config.imagegen_api_url.clone(),
        config.imagegen_api_key.clone(),
        config.imagegen_model.clone(),
    ));

    let bus = Arc::new(EventBus::default());
    let logger = tokio::spawn(log_events(bus.clone()));

    let orchestrator = Orchestrator::new(
        generator,
        blobs.clone(),
        records.clone(),
        config.pipeline.clone(),
    )
    .with_events(bus.clone());
    let archives =
        ArchiveBuilder::new(blobs, records.clone(), config.pipeline.clone()).with_events(bus);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let report = run_campaign(
        &orchestrator,
        &archives,
        records.as_ref(),
        request,
        &cancel,
    )
    .await?;

    // Dropping the builders closes the bus and ends the logger.
    drop(orchestrator);
    drop(archives);
    let _ = logger.await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Mirror campaign events into the log until the bus is dropped.
async fn log_events(bus: Arc<EventBus>) {
    let mut rx = bus.subscribe();
    drop(bus);
    loop {
        match rx.recv().await {
            Ok(event) => tracing::info!(
                event_type = %event.event_type,
                campaign_id = event.campaign_id,
                payload = %event.payload,
                "Campaign event",
            ),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Resolve on SIGINT or SIGTERM so the in-flight run can wind down.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), cancelling run");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, cancelling run");
        }
    }
}
