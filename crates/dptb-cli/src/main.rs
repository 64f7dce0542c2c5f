mod config;

use config::{FileConfig, Overrides, Settings};
use dptb_agent::{AgentFactory, AgentMode, LlmClient, LlmRunner};
use dptb_gateway::{AppState, GatewayConfig, GatewayServer};
use dptb_session::FileTranscriptStore;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dptb-agent", about = "DeePTB agent web front-end", version)]
struct Cli {
    /// Port to listen on [default: 50005]
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to [default: 0.0.0.0]
    #[arg(short = 'l', long)]
    host: Option<String>,

    /// SSE URL of the DeePTB MCP tools [default: http://0.0.0.0:50001/sse]
    #[arg(long = "mcp-tools", alias = "mcp_tools")]
    mcp_tools: Option<String>,

    /// Where project files live: `local` or `bohr` (Bohrium) [default: local]
    #[arg(short, long)]
    mode: Option<String>,

    /// Request a public share link (not supported, logged and ignored)
    #[arg(short, long)]
    share: bool,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,

    /// LLM API key (overrides DEEPSEEK_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Path to config file [default: dptb-agent.toml, if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for chat transcripts [default: ./chat_history]
    #[arg(long)]
    history_dir: Option<PathBuf>,

    /// Write logs to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(debug: bool, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).json();

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|e| {
                anyhow::anyhow!("Failed to open log file '{}': {}", path.display(), e)
            })?;
            builder.with_writer(std::sync::Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_file.as_ref())?;

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Environment loaded from .env"),
        Err(_) => info!("No .env file loaded"),
    }

    let file = FileConfig::load(cli.config.as_deref()).await?;
    let settings = Settings::merge(
        file,
        Overrides {
            host: cli.host,
            port: cli.port,
            tool_endpoint: cli.mcp_tools,
            mode: cli.mode,
            history_dir: cli.history_dir,
            api_key: cli.api_key,
        },
    );

    let mode: AgentMode = settings.mode.parse()?;
    let model = settings.model.resolve()?;
    if cli.share {
        warn!("--share is not supported; serving on the local address only");
    }

    info!(
        host = %settings.host,
        port = settings.port,
        mode = %mode,
        tools = %settings.tool_endpoint,
        model = %model.model_id,
        history = %settings.history_dir.display(),
        "Starting DeePTB agent"
    );

    let factory = AgentFactory::new(LlmClient::new(model), settings.resources);
    let state = AppState::new(
        GatewayConfig {
            tool_endpoint: settings.tool_endpoint,
            mode,
        },
        factory,
        Arc::new(FileTranscriptStore::new(settings.history_dir)),
        Arc::new(LlmRunner::new()),
    );
    let app = GatewayServer::build(state.clone());

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    info!("DeePTB agent listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown();
    info!("DeePTB agent stopped");
    Ok(())
}
