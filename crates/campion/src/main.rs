//! The campion server binary.

use anyhow::Context as _;
use campion::handler::CampionHandler;
use campion::logging;
use campion_cache::{CacheConfig, ForwardCache};
use campion_config::watch::ConfigWatcher;
use campion_config::Config;
use campion_filter::{Blocklist, SharedBlocklist};
use campion_resolver::{ForwardConfig, Forwarder};
use campion_server::{DnsServer, ServerConfig};
use campion_zone::{SharedZone, ZoneTable};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "campion", version, about = "Local-zone DNS server with upstream forwarding")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the configured log level.
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Suppress the startup banner.
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server (the default).
    Run,
    /// Load and validate the configuration, then exit.
    Validate,
    /// Print the version and exit.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Validate) => validate(&cli.config),
        Some(Command::Version) => {
            println!("campion {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Command::Run) | None => run(cli).await,
    }
}

fn validate(path: &Path) -> anyhow::Result<()> {
    let config = Config::from_file(path)
        .with_context(|| format!("loading {}", path.display()))?;
    let table = ZoneTable::from_config(&config).context("building zone table")?;
    let blocklist = Blocklist::from_config(&config.banned).context("building blocklist")?;

    println!(
        "configuration ok: {} zone(s), {} record(s), {} banned name(s)",
        table.suffixes().len(),
        table.record_count(),
        blocklist.len()
    );
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    logging::init(&config.logging, cli.log_level.as_deref());

    // The whole configuration, record values included, is validated
    // before any socket is bound.
    let table = ZoneTable::from_config(&config).context("building zone table")?;
    let zone = Arc::new(SharedZone::new(table));
    let banned = Arc::new(SharedBlocklist::new(
        Blocklist::from_config(&config.banned).context("building blocklist")?,
    ));

    if !cli.quiet {
        print_banner(&config);
    }

    let cache = Arc::new(ForwardCache::new(CacheConfig {
        min_ttl: Duration::from_secs(config.cache.min_ttl),
        max_ttl: Duration::from_secs(config.cache.max_ttl),
        max_entries: config.cache.max_entries,
    }));
    let forwarder = Arc::new(Forwarder::new(
        ForwardConfig {
            upstream: config.upstream_addr().context("upstream address")?,
            timeout: config.forward.timeout(),
            retries: config.forward.retries,
        },
        cache,
    ));
    let handler = Arc::new(CampionHandler::new(zone.clone(), banned.clone(), forwarder));

    let server = DnsServer::new(
        ServerConfig {
            udp: config.listen,
            tcp: config.tcp.then_some(config.listen),
            // In-flight requests block on the forwarder at most; give
            // them that long to finish on shutdown.
            drain_timeout: config.forward.timeout(),
        },
        handler,
    );

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("shutdown signal received");
        let _ = shutdown.send(());
    });

    spawn_reload_task(cli.config.clone(), zone, banned, config.watch_config);

    server.run().await.context("server failed")?;
    info!("server stopped");
    Ok(())
}

async fn wait_for_termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Watches for SIGHUP and configuration file changes; either rebuilds
/// the zone table and blocklist and swaps them in atomically. A failed
/// reload keeps the previous state.
fn spawn_reload_task(
    path: PathBuf,
    zone: Arc<SharedZone>,
    banned: Arc<SharedBlocklist>,
    watch: bool,
) {
    let watcher = if watch {
        match ConfigWatcher::new(&path) {
            Ok(watcher) => Some(watcher),
            Err(error) => {
                warn!(%error, "config watch unavailable, reload via SIGHUP only");
                None
            }
        }
    } else {
        None
    };

    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sighup = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::hangup()).ok()
        };

        let mut tick = tokio::time::interval(Duration::from_secs(2));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            #[cfg(unix)]
            let triggered = match sighup.as_mut() {
                Some(sighup) => {
                    tokio::select! {
                        _ = sighup.recv() => {
                            info!("SIGHUP received");
                            true
                        }
                        _ = tick.tick() => watcher.as_ref().is_some_and(ConfigWatcher::changed),
                    }
                }
                None => {
                    tick.tick().await;
                    watcher.as_ref().is_some_and(ConfigWatcher::changed)
                }
            };
            #[cfg(not(unix))]
            let triggered = {
                tick.tick().await;
                watcher.as_ref().is_some_and(ConfigWatcher::changed)
            };

            if triggered {
                reload(&path, &zone, &banned);
            }
        }
    });
}

fn reload(path: &Path, zone: &SharedZone, banned: &SharedBlocklist) {
    info!(path = %path.display(), "reloading configuration");
    let rebuilt = Config::from_file(path)
        .map_err(|e| e.to_string())
        .and_then(|config| {
            let table = ZoneTable::from_config(&config).map_err(|e| e.to_string())?;
            let blocklist = Blocklist::from_config(&config.banned).map_err(|e| e.to_string())?;
            Ok((table, blocklist))
        });
    match rebuilt {
        Ok((table, blocklist)) => {
            info!(
                records = table.record_count(),
                banned = blocklist.len(),
                "configuration replaced"
            );
            zone.swap(table);
            banned.swap(blocklist);
        }
        Err(error) => {
            warn!(%error, "reload failed, keeping previous configuration");
        }
    }
}

fn print_banner(config: &Config) {
    use console::style;

    println!("{} {}", style("campion").green().bold(), env!("CARGO_PKG_VERSION"));
    println!("  listen    {} (udp{})", config.listen, if config.tcp { "+tcp" } else { "" });
    println!("  upstream  {}", config.upstream);
    for zone in &config.zones {
        println!("  zone      {} ({} records)", zone.suffix, zone.records.len());
    }
    if !config.banned.lists.is_empty() {
        println!(
            "  banned    {} list(s), {} match",
            config.banned.lists.len(),
            config.banned.mode
        );
    }
    println!();
}
