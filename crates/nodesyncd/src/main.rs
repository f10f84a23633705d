// # nodesyncd - Node DNS Synchronizer Daemon
//
// Thin integration layer: all synchronization logic lives in nodesync-core.
//
// The daemon is responsible for:
// 1. Reading configuration from flags and environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the Kubernetes inventory, the Cloudflare provider and (optionally)
//    the independent resolver into the engine
// 4. Running the engine until SIGTERM/SIGINT
//
// ## Configuration
//
// Every flag can also be set through its environment variable:
//
// - `--dns-name` / `DNS_NAME`: Comma-separated record names to manage
// - `--ttl` / `DNS_TTL`: Record TTL in seconds (default 300)
// - `--zone-id` / `ZONE_ID` (or `HOSTEDZONE_ID`): Zone to write to; discovered when unset
// - `--use-internal-ip` / `USE_INTERNAL_IP`: Also consider internal node addresses
// - `--address-mode` / `ADDRESS_MODE`: `direct` or `fallback`
// - `--node-selector` / `NODE_SELECTOR`: Kubernetes label selector
// - `--enable-dns-access` / `ENABLE_DNS_ACCESS`: Verify changes through public DNS
// - `--log-level` / `NODESYNC_LOG_LEVEL`: Log level when `RUST_LOG` is unset
// - `--dry-run` / `NODESYNC_DRY_RUN`: Read from Cloudflare but never write
// - `CLOUDFLARE_API_TOKEN`: Cloudflare API token
//
// ## Example
//
// ```bash
// export CLOUDFLARE_API_TOKEN=your_token
// nodesyncd --dns-name nodes.example.com --node-selector role=edge --ttl 60
// ```

use anyhow::{Context, Result};
use clap::Parser;
use clap::builder::FalseyValueParser;
use nodesync_core::config::{AddressMode, AddressPolicy, SyncConfig, parse_ttl};
use nodesync_core::{AddressResolver, EngineEvent, SyncEngine};
use nodesync_inventory_kube::KubeMemberSource;
use nodesync_provider_cloudflare::CloudflareProvider;
use nodesync_resolver_hickory::HickoryResolver;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodesyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<NodesyncExitCode> for ExitCode {
    fn from(code: NodesyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Keep a DNS record in step with the ready nodes of a Kubernetes cluster
#[derive(Parser)]
#[command(name = "nodesyncd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Record names to manage (comma separated)
    #[arg(long, env = "DNS_NAME", value_delimiter = ',', required = true)]
    dns_name: Vec<String>,

    /// Record TTL in seconds
    #[arg(long, env = "DNS_TTL")]
    ttl: Option<String>,

    /// Zone to write to (discovered from the record name when unset)
    #[arg(long, env = "ZONE_ID")]
    zone_id: Option<String>,

    /// Also consider internal node addresses
    #[arg(long, env = "USE_INTERNAL_IP", value_parser = FalseyValueParser::new())]
    use_internal_ip: bool,

    /// How internal addresses are combined with external ones (direct, fallback)
    #[arg(long, env = "ADDRESS_MODE", default_value = "direct")]
    address_mode: String,

    /// Kubernetes label selector for the nodes to publish
    #[arg(long, env = "NODE_SELECTOR", default_value = "")]
    node_selector: String,

    /// Verify changes and detect drift through public DNS
    #[arg(long, env = "ENABLE_DNS_ACCESS", value_parser = FalseyValueParser::new())]
    enable_dns_access: bool,

    /// Seconds between unconditional resync passes (0 disables)
    #[arg(long, env = "NODESYNC_RESYNC_INTERVAL", default_value_t = 60)]
    resync_interval: u64,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "NODESYNC_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Read from Cloudflare but only log intended writes
    #[arg(long, env = "NODESYNC_DRY_RUN", value_parser = FalseyValueParser::new())]
    dry_run: bool,

    /// Cloudflare API token
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    cloudflare_api_token: String,
}

impl Args {
    /// Build the engine configuration
    fn sync_config(&self, legacy_zone_id: Option<String>) -> Result<SyncConfig> {
        let mode: AddressMode = self.address_mode.parse()?;

        let mut config = SyncConfig::new(self.dns_name.iter().map(|n| n.trim()).filter(|n| !n.is_empty()))
            .with_ttl(parse_ttl(self.ttl.as_deref()))
            .with_addresses(AddressPolicy::from_flags(self.use_internal_ip, mode))
            .with_verify_with_dns(self.enable_dns_access)
            .with_member_selector(self.node_selector.trim())
            .with_resync_interval_secs(self.resync_interval);

        if let Some(zone_id) = pick_zone_id(self.zone_id.clone(), legacy_zone_id) {
            config = config.with_zone_id(zone_id);
        }

        config.validate()?;
        Ok(config)
    }
}

/// `ZONE_ID` wins over the older `HOSTEDZONE_ID` spelling
fn pick_zone_id(zone_id: Option<String>, legacy: Option<String>) -> Option<String> {
    zone_id
        .filter(|z| !z.trim().is_empty())
        .or_else(|| legacy.filter(|z| !z.trim().is_empty()))
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level '{}'", log_level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                NodesyncExitCode::ConfigError.into()
            } else {
                NodesyncExitCode::CleanShutdown.into()
            };
        }
    };

    if let Err(e) = init_tracing(&args.log_level) {
        eprintln!("Configuration error: {:#}", e);
        return NodesyncExitCode::ConfigError.into();
    }

    let config = match args.sync_config(std::env::var("HOSTEDZONE_ID").ok()) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration validation error: {:#}", e);
            return NodesyncExitCode::ConfigError.into();
        }
    };

    info!(
        records = ?config.records,
        ttl = config.ttl,
        selector = %config.member_selector,
        verify_with_dns = config.verify_with_dns,
        dry_run = args.dry_run,
        "Starting nodesyncd"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return NodesyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let daemon = match Daemon::start(args, config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return NodesyncExitCode::ConfigError;
            }
        };

        match daemon.serve().await {
            Ok(()) => NodesyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                NodesyncExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Wired engine, ready to run
struct Daemon {
    engine: SyncEngine,
    events: mpsc::Receiver<EngineEvent>,
    shutdown_grace: Duration,
}

impl Daemon {
    /// Connect the collaborators and build the engine
    async fn start(args: Args, config: SyncConfig) -> Result<Self> {
        let source = KubeMemberSource::connect(&config.member_selector)
            .await
            .context("connecting to the Kubernetes API")?;

        let provider = CloudflareProvider::new(args.cloudflare_api_token, args.dry_run)
            .context("creating the Cloudflare provider")?;

        let resolver: Option<Arc<dyn AddressResolver>> = if config.verify_with_dns {
            let resolver = HickoryResolver::from_system_conf()
                .context("creating the DNS resolver")?;
            Some(Arc::new(resolver))
        } else {
            None
        };

        let shutdown_grace = config.engine.shutdown_grace();
        let (engine, events) = SyncEngine::new(Arc::new(source), Arc::new(provider), resolver, config)?;

        Ok(Self {
            engine,
            events,
            shutdown_grace,
        })
    }

    /// Run until a shutdown signal arrives or the engine stops on its own
    async fn serve(self) -> Result<()> {
        let Daemon {
            engine,
            events,
            shutdown_grace,
        } = self;

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let mut engine_task = tokio::spawn(async move { engine.run(run_cancel).await });
        let events_task = tokio::spawn(log_events(events));

        let result: Result<()> = tokio::select! {
            signal = wait_for_shutdown_signal() => {
                let signal = signal?;
                info!("Received shutdown signal: {}", signal);
                cancel.cancel();

                match tokio::time::timeout(shutdown_grace, &mut engine_task).await {
                    Ok(joined) => joined.context("engine task panicked")?.map_err(Into::into),
                    Err(_) => {
                        engine_task.abort();
                        Err(anyhow::anyhow!(
                            "engine did not stop within {:?}",
                            shutdown_grace
                        ))
                    }
                }
            }
            joined = &mut engine_task => {
                warn!("Engine stopped without a shutdown signal");
                joined.context("engine task panicked")?.map_err(Into::into)
            }
        };

        let _ = events_task.await;
        info!("nodesyncd shutdown complete");
        result
    }
}

/// Drain engine events so the channel never fills up
async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        debug!(?event, "Engine event");
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
