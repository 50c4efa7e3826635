//! eip-operator: Elastic IP reconciliation controller.
//!
//! Seeds the store from a manifest, reconciles every object against the
//! provider until Ctrl-C, then prints the final status of every object.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use eip_operator::{
    Controller, Eip, EipReconciler, EipStore, EventRecorder, InMemoryGateway, InMemoryStore,
    OperatorConfig, StoreError,
};

/// Elastic IP operator
#[derive(Parser, Debug)]
#[command(name = "eip-operator", version, about)]
struct Args {
    /// Path to the operator config file (YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// YAML list of EIP objects to create at startup
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Region to operate in (overrides the config file)
    #[arg(long)]
    region: Option<String>,

    /// Number of concurrent reconcile workers (overrides the config file)
    #[arg(long)]
    workers: Option<usize>,
}

fn load_config(args: &Args) -> Result<OperatorConfig> {
    let mut config = match &args.config {
        Some(path) => OperatorConfig::read(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None if args.region.is_some() => OperatorConfig::default(),
        None => bail!("either --config or --region is required"),
    };

    if let Some(region) = &args.region {
        config.region_id = region.clone();
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn seed(store: &InMemoryStore, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let objects: Vec<Eip> = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))?;

    for eip in objects {
        let name = eip.name().to_string();
        match store.create(eip).await {
            Ok(_) => info!(%name, "EIP object created from manifest"),
            Err(e @ StoreError::Invalid(_)) => warn!(%name, error = %e, "Rejected EIP object"),
            Err(e) => return Err(e).with_context(|| format!("Failed to create EIP {name}")),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eip_operator=info,events=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    info!("Starting eip-operator");
    info!(region = %config.region_id, workers = config.workers, "Configuration loaded");

    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(InMemoryGateway::new(config.region_id.clone()));
    info!(region = %gateway.region_id(), "Using in-memory EIP gateway");
    let recorder = Arc::new(EventRecorder::new());

    if let Some(manifest) = &args.manifest {
        seed(&store, manifest).await?;
    }

    let reconciler = Arc::new(EipReconciler::new(
        store.clone(),
        gateway.clone(),
        recorder,
        config.clone(),
    ));
    let controller = Controller::new(store.clone(), reconciler, config.workers);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(controller.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down");
    let _ = shutdown_tx.send(true);

    match handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Controller failed"),
        Err(e) => error!(error = %e, "Controller task panicked"),
    }

    let objects = store.list().await?;
    info!(
        objects = objects.len(),
        remote_eips = gateway.snapshots().await.len(),
        "Final state"
    );
    println!("{}", serde_json::to_string_pretty(&objects)?);
    Ok(())
}
