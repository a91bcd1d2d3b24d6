//! nat64d: a stateless NAT64 translator on a TUN device.

#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tun::Tun;
use xlat::Translator;

mod config;
mod worker;

fn main() -> ExitCode {
    let cli = Cli::parse();

    #[expect(clippy::print_stderr, reason = "No logger has been set up yet")]
    #[cfg(target_os = "linux")]
    if !has_necessary_permissions() && !cli.no_check {
        eprintln!(
            "nat64d needs to be executed as `root` or with the `CAP_NET_ADMIN` capability."
        );
        return ExitCode::FAILURE;
    }

    match try_main(cli) {
        Ok(()) => {
            tracing::info!("Goodbye!");

            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:#}");

            ExitCode::FAILURE
        }
    }
}

#[must_use]
#[cfg(target_os = "linux")]
fn has_necessary_permissions() -> bool {
    let is_root = nix::unistd::Uid::current().is_root();
    let has_net_admin = caps::has_cap(
        None,
        caps::CapSet::Effective,
        caps::Capability::CAP_NET_ADMIN,
    )
    .is_ok_and(|b| b);

    is_root || has_net_admin
}

fn try_main(cli: Cli) -> Result<()> {
    setup_logging(cli.log_format).context("Failed to set up logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "`nat64d` started logging"
    );

    let file = config::load(&cli.config)?;

    if cli.print_config {
        tracing::info!(?file, "Configuration is valid");
        return Ok(());
    }

    let table = file.build_table()?;

    let queues = Tun::open(&file.device, cli.workers.get())
        .with_context(|| format!("Failed to open TUN device `{}`", file.device))?;

    let mtu = match file.mtu {
        Some(mtu) => mtu,
        None => tun::interface_mtu(&file.device)?,
    };
    anyhow::ensure!(
        mtu >= ip_packet::IPV6_MIN_MTU,
        "MTU {mtu} is below the IPv6 minimum of 1280"
    );

    let translator = Arc::new(Translator::new(file.xlat_config(mtu), table));

    tracing::info!(
        device = %file.device,
        mtu,
        workers = queues.len(),
        mappings = translator.table().len(),
        "Translating"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let threads = queues
        .into_iter()
        .enumerate()
        .map(|(i, queue)| {
            let translator = Arc::clone(&translator);
            let shutdown = shutdown_rx.clone();

            std::thread::Builder::new()
                .name(format!("nat64d-worker-{i}"))
                .spawn(move || worker::run(queue, translator, shutdown))
        })
        .collect::<std::io::Result<Vec<_>>>()
        .context("Failed to spawn workers")?;

    wait_for_shutdown(&translator)?;

    tracing::info!("Shutting down");
    shutdown_tx.send(true).ok();

    for thread in threads {
        match thread.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Worker failed: {e:#}"),
            Err(_) => tracing::warn!("Worker panicked"),
        }
    }

    tracing::info!(stats = ?translator.stats().snapshot(), "Final counters");

    Ok(())
}

/// Blocks until SIGINT, logging counters once a minute along the way.
fn wait_for_shutdown(translator: &Translator) -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?
        .block_on(async {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            tick.tick().await; // the first tick fires immediately

            loop {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        result.context("Failed to listen for SIGINT")?;
                        break;
                    }
                    _ = tick.tick() => {
                        tracing::debug!(stats = ?translator.stats().snapshot(), "Counters");
                    }
                }
            }

            anyhow::Ok(())
        })
}

fn setup_logging(format: LogFormat) -> Result<()> {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_owned());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("Failed to parse `{directives}`"))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Json => builder.json().flatten_event(true).init(),
        LogFormat::Human => builder.init(),
    }

    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, env = "NAT64D_CONFIG", default_value = "/etc/nat64d.toml")]
    config: PathBuf,

    /// Number of worker threads; each one owns its own TUN queue.
    #[arg(short, long, env = "NAT64D_WORKERS", default_value_t = NonZeroUsize::MIN)]
    workers: NonZeroUsize,

    #[arg(long, env = "NAT64D_LOG_FORMAT", default_value_t = LogFormat::Human)]
    log_format: LogFormat,

    /// Validate the configuration and exit.
    #[arg(long, default_value_t = false)]
    print_config: bool,

    /// Don't preemptively check permissions.
    #[arg(long, default_value_t = false)]
    no_check: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogFormat {
    Json,
    Human,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => write!(f, "json"),
            LogFormat::Human => write!(f, "human"),
        }
    }
}
