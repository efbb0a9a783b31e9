//! Lattice Connector - reconciles object-storage resources and validates their admission

use std::future::Future;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt};

use lattice_connector::adapter::{BucketAdapter, HttpBucketAdapter, InMemoryBucketAdapter};
use lattice_connector::config::{AdapterConfig, ControllerConfig, WebhookConfig};
use lattice_connector::controller::bucket::{self, bucket_reconciler, Context, CONTROLLER_NAME};
use lattice_connector::crd::{AccessKey, ObjectBucket};
use lattice_connector::events::KubeEventPublisher;
use lattice_connector::store::{KubeStore, FIELD_MANAGER};
use lattice_connector::telemetry::{init_telemetry, TelemetryConfig};
use lattice_connector::webhook;

/// Lattice Connector - Kubernetes operator for cloud object storage
#[derive(Parser, Debug)]
#[command(name = "lattice-connector", version, about, long_about = None)]
struct Cli {
    /// Print CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ObjectBucket controller only
    Controller(ControllerArgs),

    /// Run the validating admission webhook only
    Webhook(WebhookArgs),

    /// Run controller and webhook in one process (default)
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct ControllerArgs {
    #[command(flatten)]
    controller: ControllerConfig,

    #[command(flatten)]
    adapter: AdapterConfig,
}

#[derive(Parser, Debug)]
struct WebhookArgs {
    #[command(flatten)]
    webhook: WebhookConfig,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    controller: ControllerConfig,

    #[command(flatten)]
    adapter: AdapterConfig,

    #[command(flatten)]
    webhook: WebhookConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [ObjectBucket::crd(), AccessKey::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(TelemetryConfig::from_env("lattice-connector")?)?;

    let command = match cli.command {
        Some(command) => command,
        None => Commands::Run(RunArgs::parse_from(["lattice-connector"])),
    };

    match command {
        Commands::Controller(args) => run_controller(args.controller, args.adapter).await,
        Commands::Webhook(args) => run_webhook(args.webhook).await,
        Commands::Run(args) => {
            run_until_first_exit(
                run_controller(args.controller, args.adapter),
                run_webhook(args.webhook),
            )
            .await
        }
    }
}

/// Run the controller and webhook side by side until either stops
///
/// Each half handles SIGTERM on its own; whichever finishes first (cleanly or
/// not) ends the process, so a controller that fails at startup never leaves a
/// healthy-looking webhook behind.
async fn run_until_first_exit(
    controller: impl Future<Output = anyhow::Result<()>>,
    webhook: impl Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    tokio::select! {
        result = controller => {
            match &result {
                Ok(()) => tracing::info!("controller stopped"),
                Err(e) => tracing::error!(error = %e, "controller failed"),
            }
            result
        }
        result = webhook => {
            match &result {
                Ok(()) => tracing::info!("webhook server stopped"),
                Err(e) => tracing::error!(error = %e, "webhook server failed"),
            }
            result
        }
    }
}

/// Build the storage adapter from configuration
fn build_adapter(config: &AdapterConfig) -> anyhow::Result<Arc<dyn BucketAdapter>> {
    if config.is_remote() {
        tracing::info!(endpoint = %config.endpoint, "using storage API adapter");
        Ok(Arc::new(HttpBucketAdapter::new(config)?))
    } else {
        tracing::warn!("STORAGE_API_ENDPOINT not set, buckets are kept in memory");
        Ok(Arc::new(InMemoryBucketAdapter::new()))
    }
}

/// Run the ObjectBucket controller until shutdown
async fn run_controller(config: ControllerConfig, adapter: AdapterConfig) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let store = Arc::new(KubeStore::<ObjectBucket>::new(client.clone()));
    let reconciler = bucket_reconciler(store, build_adapter(&adapter)?);
    let ctx = Context::new(reconciler, config)
        .with_events(Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME)));

    bucket::run(client, Arc::new(ctx)).await;
    Ok(())
}

/// Serve the admission webhook until shutdown
async fn run_webhook(config: WebhookConfig) -> anyhow::Result<()> {
    webhook::serve(webhook::default_registry(), config.bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Webhook server failed: {}", e))
}

/// Ensure the connector CRDs are installed
///
/// CRDs are applied on startup with server-side apply so their schema always
/// matches the running binary.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in [ObjectBucket::crd(), AccessKey::crd()] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("all connector CRDs installed/updated");
    Ok(())
}
