use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobmesh::catalog::InMemoryJobCatalog;
use jobmesh::cluster::{ClusterMetadata, CopySetBuilder, NodeId};
use jobmesh::config::ClusterConfig;
use jobmesh::registry::{InMemoryRegistry, MetadataStore};
use jobmesh::shutdown::cancel_on_signal;
use jobmesh::{ClusterCoordinator, Collaborators};

#[derive(Parser, Debug)]
#[command(name = "jobmesh")]
#[command(version)]
#[command(about = "Copy-set placement and range sharding for a distributed job scheduler")]
#[command(propagate_version = true)]
struct Args {
    /// Log filter used when RUST_LOG is unset (e.g. "info", "jobmesh=debug")
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the copy sets built for a node list as JSON
    Copysets(CopysetArgs),

    /// Run an in-process cluster until the first layout is applied on every node
    Simulate(SimulateArgs),
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct CopysetArgs {
    /// Node ids (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    nodes: Vec<NodeId>,

    /// Members per copy set
    #[arg(short = 'r', long, default_value = "2")]
    replicas: usize,

    /// Distinct peers per node, itself included
    #[arg(short = 's', long, default_value = "2")]
    scatter_width: usize,

    /// Permutation seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Number of nodes to start
    #[arg(long, default_value = "4")]
    nodes: usize,

    /// Number of jobs in the catalog (ids 1..=N)
    #[arg(long, default_value = "100")]
    jobs: u64,

    /// Members per copy set
    #[arg(short = 'r', long, default_value = "2")]
    replicas: usize,

    /// Distinct peers per node, itself included
    #[arg(short = 's', long, default_value = "2")]
    scatter_width: usize,

    /// Permutation seed
    #[arg(long)]
    seed: Option<u64>,

    /// Write the published metadata as JSON to this file
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Commands::Copysets(args) => print_copysets(args),
        Commands::Simulate(args) => simulate(args).await,
    }
}

fn print_copysets(args: CopysetArgs) -> anyhow::Result<()> {
    let seed = args.seed.unwrap_or(ClusterConfig::default().copyset_seed);
    let copy_sets = CopySetBuilder::new(seed).build(&args.nodes, args.replicas, args.scatter_width)?;
    println!("{}", serde_json::to_string_pretty(&copy_sets)?);
    Ok(())
}

async fn simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let registry = Arc::new(InMemoryRegistry::new());
    let catalog = Arc::new(InMemoryJobCatalog::with_ids(1..=args.jobs));
    let shutdown = CancellationToken::new();
    let signal_task = cancel_on_signal(shutdown.clone())?;

    let mut coordinators = Vec::with_capacity(args.nodes);
    for i in 1..=args.nodes {
        let node_id = format!("node-{}", i);
        registry.join(node_id.clone()).await;

        let mut config = ClusterConfig::new(node_id)
            .with_replication(args.replicas, args.scatter_width)
            .with_min_running_nodes(args.nodes);
        if let Some(seed) = args.seed {
            config = config.with_seed(seed);
        }
        let collaborators = Collaborators::from_registry(registry.clone(), catalog.clone());
        coordinators.push(Arc::new(ClusterCoordinator::new(config, collaborators)?));
    }

    for coordinator in &coordinators {
        coordinator.start().await?;
    }

    let metadata = tokio::select! {
        _ = shutdown.cancelled() => None,
        metadata = wait_for_convergence(&registry, &coordinators) => Some(metadata),
    };

    if let Some(metadata) = metadata {
        print_layout(&metadata, &coordinators).await;
        if let Some(path) = &args.output {
            metadata.save(path).await?;
            tracing::info!(path = %path.display(), "Metadata written");
        }
    }

    for coordinator in &coordinators {
        coordinator.stop().await;
    }
    signal_task.abort();
    Ok(())
}

/// Wait until every coordinator has applied the latest published snapshot.
async fn wait_for_convergence(
    registry: &InMemoryRegistry,
    coordinators: &[Arc<ClusterCoordinator>],
) -> Arc<ClusterMetadata> {
    let mut interval = tokio::time::interval(Duration::from_millis(50));
    loop {
        interval.tick().await;
        let Ok(Some(metadata)) = registry.latest_metadata().await else {
            continue;
        };
        let mut converged = true;
        for coordinator in coordinators {
            if coordinator.applied_version().await != Some(metadata.version()) {
                converged = false;
                break;
            }
        }
        if converged {
            return metadata;
        }
    }
}

async fn print_layout(metadata: &ClusterMetadata, coordinators: &[Arc<ClusterCoordinator>]) {
    println!(
        "Term {} generation {}: {} nodes, {} slots",
        metadata.term,
        metadata.generation,
        metadata.nodes.len(),
        metadata.copy_sets.len()
    );
    println!("{:<6} {:<24} {:<12} INTERVAL", "SLOT", "SERVERS", "LEADER");
    for copy_set in &metadata.copy_sets {
        let interval = copy_set
            .data_interval
            .map(|i| i.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<6} {:<24} {:<12} {}",
            copy_set.id,
            copy_set.servers.join(","),
            copy_set.leader.as_deref().unwrap_or("-"),
            interval
        );
    }

    println!();
    for coordinator in coordinators {
        let registry = coordinator.scheduler_registry();
        println!(
            "{}: active [{}] standby [{}]",
            coordinator.node_id(),
            registry.active_schedulers().await.join(", "),
            registry.standby_schedulers().await.join(", ")
        );
    }
}
