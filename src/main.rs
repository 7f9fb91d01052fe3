use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use parallel_drain::{
    config::DrainConfig,
    controller::{self, ControllerState},
    drain::{DrainOptions, KubeDrainer},
    inventory::KubeInventory,
    Error,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Continuously drains multiple nodes of a specific version in parallel
#[derive(Parser, Debug)]
#[command(name = "parallel-drain", author, version, about, long_about = None)]
struct Args {
    /// Number of nodes to drain in parallel
    #[arg(short = 'c', long, env = "DRAIN_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Label selector to filter nodes
    #[arg(short = 'l', long, env = "NODE_SELECTOR", default_value = "")]
    selector: String,

    /// The Kubernetes version to match and drain (e.g. v1.32.0)
    #[arg(long = "old-k8s-version", env = "OLD_K8S_VERSION", default_value = "")]
    old_k8s_version: String,

    /// Interval to check for nodes to drain
    #[arg(long, env = "CHECK_INTERVAL", default_value = "10s", value_parser = humantime::parse_duration)]
    interval: Duration,

    /// Grace period in seconds given to each evicted pod; negative uses the pod's own
    #[arg(long, env = "DRAIN_GRACE_PERIOD", default_value_t = 30, allow_negative_numbers = true)]
    grace_period: i64,

    /// Give up draining a single node after this long (0 waits indefinitely)
    #[arg(long, env = "DRAIN_TIMEOUT", default_value = "0s", value_parser = humantime::parse_duration)]
    drain_timeout: Duration,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn drain_config(&self) -> Result<DrainConfig, Error> {
        let config = DrainConfig::new(self.old_k8s_version.clone())
            .with_selector(self.selector.clone())
            .with_concurrency(self.concurrency)
            .with_interval(self.interval);
        config.validate()?;
        Ok(config)
    }

    fn drain_options(&self) -> Result<DrainOptions, Error> {
        let grace_period_seconds = if self.grace_period < 0 {
            None
        } else {
            Some(u32::try_from(self.grace_period).map_err(|_| {
                Error::ConfigError(format!("--grace-period {} is too large", self.grace_period))
            })?)
        };

        Ok(DrainOptions {
            grace_period_seconds,
            timeout: (!self.drain_timeout.is_zero()).then_some(self.drain_timeout),
            ..Default::default()
        })
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    init_tracing(args.log_format);

    // Validate everything before touching the cluster
    let config = args.drain_config()?;
    let options = args.drain_options()?;

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let state = Arc::new(ControllerState::new(
        Arc::new(KubeInventory::new(client.clone())),
        Arc::new(KubeDrainer::new(client, options)),
        config,
    ));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    controller::run_drain_loop(state, cancel).await?;
    Ok(())
}

/// Cancel the run on Ctrl+C or SIGTERM. In-progress drains are allowed to finish.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, stopping after in-progress nodes"),
        () = terminate => info!("Received SIGTERM, stopping after in-progress nodes"),
    }
    cancel.cancel();
}
