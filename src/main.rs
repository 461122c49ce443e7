use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

use toolgate::config::{EngineKind, GatewayConfig, LogSection};
use toolgate::{run_server, Gateway};
use toolgate_cdp_adapter::{
    detect_chrome_executable, AutomationEngine, CdpEngine, EngineConfig, ScriptedEngine,
};

#[derive(Parser)]
#[command(name = "toolgate", version, about = "Browser automation tool gateway")]
struct Cli {
    /// Configuration file (defaults to the per-user config when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server
    Serve(ServeArgs),
    /// Print the tool catalog as JSON and exit
    Tools,
}

#[derive(Args)]
struct ServeArgs {
    /// Listen address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Maximum concurrent tool executions
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Engine backend
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,

    /// Run the browser with a visible window
    #[arg(long)]
    headed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = GatewayConfig::load(cli.config.as_ref())?;
    let _log_guard = init_tracing(&config.log)?;

    match cli.command {
        Command::Serve(args) => {
            if let Some(bind) = args.bind {
                config.server.bind = bind;
            }
            if let Some(max_concurrent) = args.max_concurrent {
                if max_concurrent == 0 {
                    bail!("--max-concurrent must be at least 1");
                }
                config.admission.max_concurrent = max_concurrent;
            }
            if let Some(engine) = args.engine {
                config.engine.kind = engine;
            }
            if args.headed {
                config.engine.headless = false;
            }
            serve(config).await
        }
        Command::Tools => {
            let gateway = Gateway::new(&config, Arc::new(ScriptedEngine::new()))?;
            println!("{}", serde_json::to_string_pretty(&gateway.list_tools())?);
            Ok(())
        }
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    info!(
        max_concurrent = config.admission.max_concurrent,
        call_timeout = %humantime::format_duration(config.admission.call_timeout()),
        "admission configured"
    );
    let engine = build_engine(&config).await?;
    let gateway = Gateway::new(&config, engine)?;

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    run_server(gateway, config.server.bind, shutdown).await
}

async fn build_engine(config: &GatewayConfig) -> Result<Arc<dyn AutomationEngine>> {
    match config.engine.kind {
        EngineKind::Scripted => {
            info!("using the scripted in-memory engine");
            Ok(Arc::new(ScriptedEngine::new()))
        }
        EngineKind::Chromium => {
            let mut engine_cfg = EngineConfig {
                headless: config.engine.headless,
                command_deadline_ms: config.engine.command_deadline_ms,
                ..EngineConfig::default()
            };
            if let Some(executable) = &config.engine.executable {
                engine_cfg.executable = executable.clone();
            } else if let Some(detected) = detect_chrome_executable() {
                engine_cfg.executable = detected;
            }
            if let Some(user_data_dir) = &config.engine.user_data_dir {
                engine_cfg.user_data_dir = user_data_dir.clone();
            }

            let engine = Arc::new(CdpEngine::new(engine_cfg));
            engine
                .start()
                .await
                .context("failed to start the chromium engine")?;
            Ok(engine)
        }
    }
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut terminate =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received ctrl-c, draining"),
                _ = terminate.recv() => info!("received SIGTERM, draining"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received ctrl-c, draining");
        }
        shutdown.cancel();
    });
}

fn init_tracing(log: &LogSection) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("toolgate=info,tower_http=warn"));

    let registry = tracing_subscriber::registry().with(filter);

    let mut guard = None;
    let file_layer = match &log.directory {
        Some(directory) => {
            if let Err(err) = std::fs::create_dir_all(directory) {
                warn!(?err, "failed to create log directory, file logging disabled");
                None
            } else {
                let appender = tracing_appender::rolling::daily(directory, "toolgate.log");
                let (writer, file_guard) = tracing_appender::non_blocking(appender);
                guard = Some(file_guard);
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
            }
        }
        None => None,
    };

    let console_layer = if log.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    registry.with(console_layer).with(file_layer).init();

    Ok(guard)
}
