mod console;
mod sessions_commands;
mod sink;

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    switchboard_approval::{ApprovalCoordinator, SessionAllowlist},
    switchboard_channels::{ChannelRegistry, EventSink, RegistryOptions, SinkApprovalNotifier},
    switchboard_config::SwitchboardConfig,
    switchboard_gateway::GatewayState,
    switchboard_sessions::ResumeStore,
    switchboard_terminal::{PtySpawner, SpawnOptions},
    tokio::sync::watch,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::{console::Console, sink::ConsoleSink};

#[derive(Parser)]
#[command(name = "switchboard", about = "Switchboard: chat channels onto agent shells")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in ./ and the user config dir).
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,
    /// Address to bind to (overrides config value).
    #[arg(long, global = true, env = "SWITCHBOARD_BIND")]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true, env = "SWITCHBOARD_PORT")]
    port: Option<u16>,
    /// Do not read chat commands from stdin.
    #[arg(long, global = true, default_value_t = false)]
    no_console: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway and console (default when no subcommand is provided).
    Serve,
    /// Stored resume ids.
    Sessions {
        #[command(subcommand)]
        action: sessions_commands::SessionAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so the console's stdout stays readable.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SwitchboardConfig> {
    let config = match &cli.config {
        Some(path) => switchboard_config::load_config(path)?,
        None => switchboard_config::discover_and_load(),
    };
    let problems = config.problems();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("config: {problem}");
        }
        anyhow::bail!("invalid configuration ({} problem(s))", problems.len());
    }
    Ok(config)
}

fn spawn_options(config: &SwitchboardConfig) -> SpawnOptions {
    SpawnOptions {
        shell: config.terminal.shell.clone(),
        working_dir: config.terminal.working_dir.clone(),
        cols: config.terminal.cols,
        rows: config.terminal.rows,
        ring_capacity: config.terminal.ring_capacity,
        ..SpawnOptions::default()
    }
}

async fn serve(cli: &Cli, config: SwitchboardConfig) -> anyhow::Result<()> {
    let store_path = switchboard_config::resume_store_path(&config);
    if let Some(parent) = store_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(ResumeStore::load(store_path)?);
    let sink: Arc<dyn EventSink> = Arc::new(ConsoleSink);

    let registry = ChannelRegistry::new(
        Arc::new(PtySpawner::new(spawn_options(&config))),
        store,
        Arc::clone(&sink),
        RegistryOptions::from_config(&config),
    );
    let approvals = Arc::new(ApprovalCoordinator::new(
        Arc::clone(&registry) as Arc<dyn SessionAllowlist>,
        Arc::new(SinkApprovalNotifier::new(Arc::clone(&sink))),
        Duration::from_secs(config.approval.timeout_secs),
    ));
    let state = GatewayState::new(Arc::clone(&registry), Arc::clone(&approvals), sink);

    let bind = cli.bind.clone().unwrap_or(config.server.bind);
    let port = cli.port.unwrap_or(config.server.port);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut gateway = tokio::spawn(async move {
        switchboard_gateway::start_gateway(&bind, port, state, async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await
    });

    if !cli.no_console {
        let console = Console::new(
            Arc::clone(&registry),
            approvals,
            config.agent.credential_env.clone(),
        );
        println!("switchboard ready, /help for commands");
        tokio::spawn(console.run());
    }

    tokio::select! {
        result = &mut gateway => {
            return match result {
                Ok(inner) => inner,
                Err(e) => Err(e.into()),
            };
        },
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
        },
    }

    for session in registry.snapshot().await {
        registry.teardown(&session.channel_id).await;
    }
    let _ = shutdown_tx.send(true);
    gateway.await??;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mut cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "switchboard starting");

    let config = load_config(&cli)?;
    match cli.command.take() {
        None | Some(Commands::Serve) => serve(&cli, config).await,
        Some(Commands::Sessions { action }) => {
            sessions_commands::handle_sessions(&config, action)
        },
    }
}
