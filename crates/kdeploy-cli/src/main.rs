//! kdeploy - run an App's deploy step by hand
//!
//! Usage:
//!   kdeploy deploy --app app.yaml --manifest out.yaml
//!   kdeploy delete --app app.yaml
//!   kdeploy inspect --app app.yaml
//!   kdeploy metadata --app app.yaml

mod host;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kdeploy_core::prelude::*;

use crate::host::FileAppHost;

#[derive(Parser)]
#[command(name = "kdeploy")]
#[command(about = "Deploy stage of the App controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy rendered manifests for an App
    Deploy {
        #[command(flatten)]
        common: CommonArgs,

        /// Rendered manifests (file path, or '-' for stdin)
        #[arg(long, short = 'f')]
        manifest: String,
    },

    /// Delete everything deployed for an App
    Delete {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Show resources deployed for an App
    Inspect {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Print the metadata kapp recorded for an App
    Metadata {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// App resource (YAML); re-read while running, so setting
    /// `spec.canceled: true` cancels the operation
    #[arg(long)]
    app: PathBuf,

    /// Controller config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Kubeconfig to connect with; defaults to the in-cluster service
    /// account, then $KUBECONFIG
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// Context within --kubeconfig
    #[arg(long, requires = "kubeconfig")]
    context: Option<String>,

    /// Namespace holding the controller's cluster config to overlay
    #[arg(long)]
    controller_namespace: Option<String>,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kdeploy=debug,kdeploy_core=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(cli.command))
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Deploy { common, manifest } => {
            let manifest = read_manifest(&manifest)?;
            let (orchestrator, host) = setup(&common).await?;
            let app = host.current_app().await?;
            let result = orchestrator.deploy(&app, &manifest, log_progress()).await;
            report(result)
        }
        Commands::Delete { common } => {
            let (orchestrator, host) = setup(&common).await?;
            let app = host.current_app().await?;
            let result = orchestrator.delete(&app, log_progress()).await;
            report(result)
        }
        Commands::Inspect { common } => {
            let (orchestrator, host) = setup(&common).await?;
            let app = host.current_app().await?;
            let result = orchestrator.inspect(&app).await;
            report(result)
        }
        Commands::Metadata { common } => {
            let (orchestrator, host) = setup(&common).await?;
            let app = host.current_app().await?;
            let meta = orchestrator.metadata(&app).await?;
            print!(
                "{}",
                serde_yaml_ng::to_string(&meta).context("Failed to render metadata")?
            );
            Ok(())
        }
    }
}

async fn setup(common: &CommonArgs) -> Result<(AppOrchestrator, Arc<FileAppHost>)> {
    let store = match &common.config {
        Some(path) => ConfigStore::from_path(path.clone()),
        None => ConfigStore::from_default_path()?,
    };
    let mut config = store.load()?;

    let api: Arc<dyn CoreApi> = match &common.kubeconfig {
        Some(path) => Arc::new(KubeCoreApi::from_kubeconfig(path, common.context.clone()).await?),
        None => Arc::new(KubeCoreApi::infer().await?),
    };

    if let Some(namespace) = &common.controller_namespace {
        if let Some(cluster_config) = ClusterConfigSource::new(Arc::clone(&api))
            .fetch(namespace)
            .await?
        {
            config.apply_cluster_config(cluster_config);
        }
    }

    let host = Arc::new(FileAppHost::new(common.app.clone()));
    host.cancel_on_interrupt();

    let factory = DeployFactory::new(&config, api, Arc::new(ProcessRunner));
    let orchestrator = AppOrchestrator::new(factory, host.clone())
        .with_cancel_poll_interval(config.cancel_poll_interval());

    Ok((orchestrator, host))
}

fn read_manifest(source: &str) -> Result<String> {
    if source == "-" {
        let mut manifest = String::new();
        std::io::stdin()
            .read_to_string(&mut manifest)
            .context("Failed to read manifest from stdin")?;
        return Ok(manifest);
    }
    std::fs::read_to_string(source).with_context(|| format!("Failed to read manifest {}", source))
}

fn log_progress() -> ChangedFn {
    Arc::new(|partial: &CmdRunResult| {
        tracing::debug!(
            stdout_bytes = partial.stdout.len(),
            stderr_bytes = partial.stderr.len(),
            "kapp progress"
        );
    })
}

fn report(result: CmdRunResult) -> Result<()> {
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);

    match result.error {
        Some(e) => bail!(e),
        None => Ok(()),
    }
}
