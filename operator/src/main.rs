use clap::{Parser, Subcommand};
use kube::client::Client;

mod capacity;
mod inference;
mod models;
mod util;

#[cfg(feature = "metrics")]
mod metrics;

/// Top-level CLI configuration for the binary. Any command line
/// flags should go in here.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Prometheus metrics server scrape port. Disabled by default.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

/// List of subcommands for the binary. Clap will convert the
/// name of each enum variant to kebab-case for the CLI.
/// e.g. `ManageCapacityReservations` becomes `manage-capacity-reservations`.
#[derive(Subcommand)]
enum Command {
    ManageCapacityReservations,
    ManageModels,
    ManageInferenceServices,
}

/// Secondary entrypoint that runs the appropriate subcommand.
async fn run(client: Client) {
    let cli = Cli::parse();

    #[cfg(feature = "metrics")]
    if let Some(metrics_port) = cli.metrics_port {
        tokio::spawn(metrics::run_server(metrics_port));
    }

    match cli.command {
        Command::ManageCapacityReservations => run_capacity_reservations(client).await,
        Command::ManageModels => run_models(client).await,
        Command::ManageInferenceServices => run_inference_services(client).await,
    }
    .unwrap();

    panic!("exited unexpectedly");
}

/// Loads the operator's `ome-operator-config` `ConfigMap` from its own
/// namespace; a missing or malformed document is fatal at startup (spec.md
/// §6 "Configuration"), since there is no safe default for the
/// cluster-queue inactivity threshold.
async fn load_config(client: Client) -> util::config::Config {
    let namespace = util::operator_namespace();
    util::config::load(client, &namespace)
        .await
        .unwrap_or_else(|e| panic!("failed to load operator configuration: {e}"))
}

async fn run_capacity_reservations(client: Client) -> Result<(), util::Error> {
    let config = load_config(client.clone()).await;
    let threshold = config.cluster_queue.creation_failed_time_threshold_seconds;
    util::leader::run_leader_elected(
        client,
        "ome-capacity-reservation-lock",
        "capacity-reservation",
        move |client| async move {
            if let Err(e) = capacity::run(client, threshold).await {
                eprintln!("ClusterCapacityReservation controller exited with error: {e}");
            }
        },
    )
    .await;
    Ok(())
}

async fn run_models(client: Client) -> Result<(), util::Error> {
    let namespaced = util::leader::run_leader_elected(
        client.clone(),
        "ome-basemodel-lock",
        "basemodel",
        |client| async move {
            if let Err(e) = models::run_namespaced(client).await {
                eprintln!("BaseModel controller exited with error: {e}");
            }
        },
    );
    let cluster = util::leader::run_leader_elected(
        client,
        "ome-clusterbasemodel-lock",
        "clusterbasemodel",
        |client| async move {
            if let Err(e) = models::run_cluster(client).await {
                eprintln!("ClusterBaseModel controller exited with error: {e}");
            }
        },
    );
    tokio::join!(namespaced, cluster);
    Ok(())
}

async fn run_inference_services(client: Client) -> Result<(), util::Error> {
    let config = load_config(client.clone()).await;
    let cluster_allows_serverless = config.inference_service.allow_serverless;
    util::leader::run_leader_elected(
        client,
        "ome-inferenceservice-lock",
        "inferenceservice",
        move |client| async move {
            if let Err(e) = inference::run(client, cluster_allows_serverless).await {
                eprintln!("InferenceService controller exited with error: {e}");
            }
        },
    )
    .await;
    Ok(())
}

/// Main entrypoint that sets up the environment before running the secondary entrypoint `run`.
#[tokio::main]
async fn main() {
    // Set the panic hook to exit the process with a non-zero exit code
    // when a panic occurs on any thread. This is desired behavior when
    // running in a container, as the metrics server or controller may
    // panic and we always want to restart the container in that case.
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_panic(info);
        std::process::exit(1);
    }));

    // Create a kubernetes client using the default configuration.
    // In-cluster, the kubeconfig will be set by the service account.
    let client: Client = Client::try_default()
        .await
        .expect("Expected a valid KUBECONFIG environment variable.");

    // Run the secondary entrypoint.
    run(client).await;

    // This is an unreachable branch. The controllers and metrics
    // servers should never exit without a panic.
    panic!("exited prematurely");
}
