use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::ResourceExt;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pgfleet::crd::types::DbOpsOperation;
use pgfleet::crd::PgDbOps;
use pgfleet::dbops::{ClusterRestartJob, DbOpsLauncher, JobRegistry, LauncherConfig};
use pgfleet::resource::{KubePodScanner, KubeResourceStore};
use pgfleet::watch::{namespaced_watch_factory, WatcherMonitor};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Launch a database operation and wait for it to finish
    Run(RunArgs),
    /// Watch PgDbOps resources with automatic reconnection
    Watch(WatchArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Name of the PgDbOps resource to launch
    #[arg(long, env = "DB_OPS_NAME")]
    db_ops_name: String,

    /// Namespace of the PgDbOps resource
    #[arg(long, env = "DB_OPS_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Holder identity recorded in the cluster lock; defaults to the
    /// hostname
    #[arg(long, env = "POD_NAME")]
    pod_name: Option<String>,

    /// Seconds after which an abandoned lock may be taken over
    #[arg(long, env = "DB_OPS_LOCK_TIMEOUT", default_value_t = 60)]
    lock_timeout: u64,

    /// Seconds between lock refreshes while the operation runs
    #[arg(long, env = "DB_OPS_LOCK_POLL_INTERVAL", default_value_t = 5)]
    lock_poll_interval: u64,
}

#[derive(Parser, Debug)]
struct WatchArgs {
    /// Namespace to watch
    #[arg(long, env = "DB_OPS_NAMESPACE", default_value = "default")]
    namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("pgfleet-jobs v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_db_op(run_args).await,
        Commands::Watch(watch_args) => run_watch(watch_args).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

fn pod_name(configured: Option<String>) -> String {
    configured.unwrap_or_else(|| {
        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "pgfleet-jobs".to_string())
    })
}

async fn run_db_op(args: RunArgs) -> anyhow::Result<()> {
    init_tracing();

    let client = kube::Client::try_default()
        .await
        .context("failed to initialize the Kubernetes client")?;
    let store = Arc::new(KubeResourceStore::new(client.clone()));
    let pods = Arc::new(KubePodScanner::new(client));

    // The restart-style operations share the cluster restart executor;
    // the remaining operation types are registered by their own jobs.
    let restart_job = Arc::new(ClusterRestartJob::new(pods));
    let mut jobs = JobRegistry::new();
    for operation in [
        DbOpsOperation::Restart,
        DbOpsOperation::SecurityUpgrade,
        DbOpsOperation::MinorVersionUpgrade,
    ] {
        jobs.register(operation, restart_job.clone());
    }

    let launcher = DbOpsLauncher::new(
        store.clone(),
        store,
        jobs,
        LauncherConfig {
            pod_name: pod_name(args.pod_name),
            lock_timeout: Duration::from_secs(args.lock_timeout),
            lock_poll_interval: Duration::from_secs(args.lock_poll_interval),
        },
    );

    launcher
        .launch_db_op(&args.db_ops_name, &args.namespace)
        .await?;
    info!("Operation {} completed", args.db_ops_name);
    Ok(())
}

async fn run_watch(args: WatchArgs) -> anyhow::Result<()> {
    init_tracing();

    let client = kube::Client::try_default()
        .await
        .context("failed to initialize the Kubernetes client")?;

    let gave_up = Arc::new(tokio::sync::Notify::new());
    let factory = namespaced_watch_factory::<PgDbOps, _>(
        client,
        &args.namespace,
        |action, db_ops: &PgDbOps| {
            info!(
                "PgDbOps {}/{} {:?} (op: {})",
                db_ops.namespace().unwrap_or_default(),
                db_ops.name_any(),
                action,
                db_ops.spec.op
            );
        },
    );

    let monitor = {
        let gave_up = gave_up.clone();
        WatcherMonitor::new(factory, move || {
            error!("Giving up on the PgDbOps watch after repeated failures");
            gave_up.notify_one();
        })?
    };

    info!("Watching PgDbOps resources in namespace {}", args.namespace);
    tokio::select! {
        _ = gave_up.notified() => {
            anyhow::bail!("watch gave up after repeated failures");
        }
        _ = tokio::signal::ctrl_c() => {
            monitor.close();
            info!("Watch closed");
        }
    }
    Ok(())
}
