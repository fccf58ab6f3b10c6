use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use gateway_core::config::parse_origins;
use gateway_core::GatewayConfig;

#[derive(Parser)]
#[command(
    name = "claude-gateway",
    about = "OpenAI-compatible HTTP gateway for the Claude CLI",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve(ServeArgs),

    /// Resolve the Claude CLI and report whether it is usable
    Check {
        /// Explicit path to the claude binary
        #[arg(long, env = "CLAUDE_BIN")]
        claude_bin: Option<PathBuf>,

        /// Output as JSON
        #[arg(long, short = 'j')]
        json: bool,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value = "8000", env = "PORT")]
    port: u16,

    /// Allowed CORS origins, comma-separated (`*` for any)
    #[arg(long, default_value = "*", env = "CORS_ORIGINS")]
    cors_origins: String,

    /// Per-request deadline in milliseconds
    #[arg(long, default_value = "600000", env = "MAX_TIMEOUT")]
    max_timeout: u64,

    /// Require this bearer key on every endpoint except /health
    #[arg(long, env = "API_KEY")]
    api_key: Option<String>,

    /// Explicit path to the claude binary
    #[arg(long, env = "CLAUDE_BIN")]
    claude_bin: Option<PathBuf>,

    /// Session time-to-live in seconds
    #[arg(long, default_value = "3600", env = "SESSION_TTL_SECONDS")]
    session_ttl: u64,

    /// Sweeper period in seconds
    #[arg(long, default_value = "300", env = "SESSION_CLEANUP_INTERVAL_SECONDS")]
    session_cleanup_interval: u64,

    /// SSE heartbeat period in seconds
    #[arg(long, default_value = "15", env = "STREAM_HEARTBEAT_SECONDS")]
    heartbeat: u64,

    /// Log compatibility reports and request detail
    #[arg(long, env = "DEBUG_MODE")]
    debug: bool,

    /// Raise log verbosity to info
    #[arg(long, env = "VERBOSE")]
    verbose: bool,
}

impl ServeArgs {
    fn into_config(self) -> GatewayConfig {
        GatewayConfig {
            port: self.port,
            cors_origins: parse_origins(&self.cors_origins),
            max_timeout_ms: self.max_timeout,
            api_key: self.api_key.filter(|k| !k.is_empty()),
            debug_mode: self.debug,
            verbose: self.verbose,
            claude_binary: self.claude_bin,
            session_ttl: Duration::from_secs(self.session_ttl),
            session_cleanup_interval: Duration::from_secs(self.session_cleanup_interval),
            heartbeat_interval: Duration::from_secs(self.heartbeat),
        }
    }
}

fn init_tracing(verbose: bool, debug: bool) {
    let default_level = if debug {
        tracing::Level::DEBUG
    } else if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => {
            init_tracing(args.verbose, args.debug);
            let config = args.into_config();
            let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            rt.block_on(gateway_server::serve(config))
                .map_err(|e| anyhow::anyhow!("{e}"))
        }
        Commands::Check { claude_bin, json } => {
            init_tracing(false, false);
            let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
            rt.block_on(check(claude_bin, json))
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn check(claude_bin: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let client = claude_client::ClaudeClient::new(claude_bin);
    let status = client.verify().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if status.available {
        println!(
            "claude cli available (version {})",
            status.version.as_deref().unwrap_or("unknown")
        );
    } else {
        println!(
            "claude cli NOT available: {}",
            status.error.as_deref().unwrap_or("unknown error")
        );
    }

    if status.available {
        Ok(())
    } else {
        Err(anyhow::anyhow!("claude cli is not usable"))
    }
}
