//! Stratus CLI - bootstrap an MPI cluster and dispatch jobs across it

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stratus::bootstrap::{Bootstrap, BootstrapConfig, DEFAULT_CONCURRENCY};
use stratus::vm::MultipassDriver;
use stratus::{job, Error};

/// Stratus - ad-hoc MPI compute clusters on Multipass VMs
#[derive(Parser, Debug)]
#[command(name = "stratus", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision a cluster and wire it into a trusted mesh
    ///
    /// Creates one coordinator and SIZE-1 workers, configures name
    /// resolution and mutual SSH trust between all nodes, exports an NFS
    /// share from the coordinator, and publishes the host list. Safe to
    /// re-run against a partially bootstrapped cluster.
    Bootstrap(BootstrapArgs),

    /// Compile or run an MPI program on a bootstrapped cluster
    Dispatch(DispatchArgs),
}

/// Bootstrap mode arguments
#[derive(Args, Debug)]
struct BootstrapArgs {
    /// Total cluster size, coordinator included
    #[arg(value_name = "SIZE")]
    size: usize,

    /// Number of CPUs for each node
    #[arg(long, default_value = "1")]
    cpus: u32,

    /// Amount of RAM in MB for each node
    #[arg(long = "memory", default_value = "1024")]
    memory_mb: u64,

    /// Cloud-init profile applied to every node at launch
    #[arg(long, default_value = "cloud-init.yaml")]
    cloud_init: PathBuf,

    /// Bound for concurrent remote operations within a phase
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,
}

/// Dispatch mode arguments
#[derive(Args, Debug)]
#[command(group = clap::ArgGroup::new("operation").required(true).multiple(false))]
struct DispatchArgs {
    /// Path to the C source file to compile on the coordinator
    #[arg(long, short = 'c', value_name = "PATH", group = "operation")]
    compile: Option<PathBuf>,

    /// Name of a compiled artifact to run across the cluster
    #[arg(long, short = 'r', value_name = "NAME", group = "operation")]
    run: Option<String>,

    /// Number of processes to run with; omitted, the runtime infers it
    /// from the host list
    #[arg(long, short = 'n', requires = "run")]
    processes: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    MultipassDriver::check_available().await?;
    let driver = MultipassDriver::new();

    match cli.command {
        Commands::Bootstrap(args) => run_bootstrap(&driver, args).await?,
        Commands::Dispatch(args) => run_dispatch(&driver, args).await?,
    }

    Ok(())
}

/// Run the full bootstrap pipeline, aborting cleanly on Ctrl-C.
///
/// Abort stops issuing new remote calls but leaves completed steps in place;
/// re-running bootstrap resumes from wherever it stopped.
async fn run_bootstrap(driver: &MultipassDriver, args: BootstrapArgs) -> Result<(), Error> {
    let bootstrap = Bootstrap::new(BootstrapConfig {
        size: args.size,
        cpus: args.cpus,
        memory_mb: args.memory_mb,
        cloud_init: Some(args.cloud_init),
        concurrency: args.concurrency,
    })?;

    let topology = tokio::select! {
        result = bootstrap.run(driver) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; completed steps are kept, re-run bootstrap to resume");
            return Err(Error::Aborted);
        }
    };

    println!("Cluster ready: {}", topology.names().join(", "));
    Ok(())
}

/// Run one dispatch operation (compile or run, mutually exclusive)
async fn run_dispatch(driver: &MultipassDriver, args: DispatchArgs) -> Result<(), Error> {
    if let Some(source) = args.compile {
        let artifact = job::compile(driver, &source).await?;
        println!("Compiled '{}' on the coordinator", artifact);
        println!("Run it with: stratus dispatch --run {}", artifact);
    } else if let Some(artifact) = args.run {
        let stdout = job::run(driver, &artifact, args.processes).await?;
        print!("{}", stdout);
    }
    Ok(())
}
