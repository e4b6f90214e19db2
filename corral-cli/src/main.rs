//! Corral CLI - run a supervised process tree

mod services;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use corral_core::{BootstrapParams, CorralConfig, LaunchContext, ProcessRole};
use corral_supervisor::{
    ParentLink, ProcessSpawner, Runtime, ServiceConfig, ServiceHost, signals,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Subcommand children are re-executed with
const BOOTSTRAP_COMMAND: &str = "bootstrap";

#[derive(Parser)]
#[command(name = "corral")]
#[command(about = "Master/agent/worker process supervisor", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the master process: the gateway agent plus a worker pool
    Run {
        /// Number of workers (defaults to the number of CPUs)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Service hosted by every worker
        #[arg(long)]
        worker_service: Option<String>,

        /// Do not launch the gateway agent
        #[arg(long)]
        no_gateway: bool,

        /// Working directory handed to children
        #[arg(short = 'C', long)]
        working_dir: Option<PathBuf>,

        /// Environment name handed to children
        #[arg(short, long)]
        environment: Option<String>,
    },
    /// Child process entry point; launched by a supervisor, not by hand
    #[command(hide = true)]
    Bootstrap {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// List the services a child can host
    Services,
    /// Version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the parent channel in children, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            workers,
            worker_service,
            no_gateway,
            working_dir,
            environment,
        } => {
            let mut config = CorralConfig::load()?;
            if let Some(workers) = workers {
                config.master.workers = Some(workers);
            }
            if let Some(service) = worker_service {
                config.master.worker_service = service;
            }
            if no_gateway {
                config.master.gateway = false;
            }
            if working_dir.is_some() {
                config.master.working_dir = working_dir;
            }
            if let Some(environment) = environment {
                config.environment = environment;
            }
            config.validate()?;

            let code = run_master(config).await?;
            std::process::exit(code);
        }
        Commands::Bootstrap { args } => {
            let code = run_child(args).await?;
            std::process::exit(code);
        }
        Commands::Services => {
            for name in services::registry().names() {
                println!("{}", name);
            }
        }
        Commands::Version => {
            println!("corral {}", env!("CARGO_PKG_VERSION"));
            println!("corral-core {}", corral_core::VERSION);
        }
    }

    Ok(())
}

async fn run_master(config: CorralConfig) -> Result<i32> {
    let context = LaunchContext::from_env(Some(ProcessRole::Master));
    let spawner = Arc::new(ProcessSpawner::current_exe(BOOTSTRAP_COMMAND)?);
    let runtime = Runtime::new(&context, &config, spawner)?;
    let handle = runtime.handle();

    info!(
        "Starting master (environment: {}, workers: {:?})",
        config.environment, config.master.workers
    );

    let service = services::master::MasterService::new(config.master.clone());
    let host = Arc::new(ServiceHost::new(Box::new(service), handle.clone()));
    signals::install(handle);

    let outcome = runtime.run(host).await;
    Ok(outcome.exit_code())
}

async fn run_child(args: Vec<String>) -> Result<i32> {
    let params = BootstrapParams::from_args(&args)?;
    let mut config = CorralConfig::load()?;
    config.environment = params.environment.clone();

    let spawner = Arc::new(ProcessSpawner::current_exe(BOOTSTRAP_COMMAND)?);
    let runtime = Runtime::new(&LaunchContext::from_env(None), &config, spawner)?;
    if runtime.role() == ProcessRole::Master {
        bail!("{} must be launched by a corral supervisor", BOOTSTRAP_COMMAND);
    }

    let service = services::registry().build(&params.service, &ServiceConfig::from_params(&params))?;
    let runtime = runtime.with_parent(ParentLink::stdio());
    let handle = runtime.handle();
    info!("Starting {} hosting {}", handle.role(), params.service);

    let host = Arc::new(ServiceHost::new(service, handle.clone()));
    signals::install(handle);

    let outcome = runtime.run(host).await;
    Ok(outcome.exit_code())
}
