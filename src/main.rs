//! Goose Plugins MCP Server - Entry Point
//!
//! Modes:
//! - Default: MCP server over stdio
//! - --stream-log / -s: follow the Goose session log

use goose_plugins::{session_log, Config, McpServer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let stream_mode = args.iter().any(|a| a == "--stream-log" || a == "-s");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("Goose Plugins MCP Server v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: goose-plugins-mcp [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --stream-log, -s   Follow the current Goose session log");
        println!("  --help, -h         Show this help");
        println!();
        println!("Default: Run as MCP server (stdio)");
        println!();
        println!("Environment variables:");
        println!("  ANTHROPIC_API_KEY          Claude API key (analysis and background tasks)");
        println!("  OPENAI_API_KEY             Image generation key");
        println!("  OPENAI_HOST                Images API base URL");
        println!("  SERPER_API_KEY             Web search key");
        println!("  GOOSE_HOME                 State directory (default: ~/.goose)");
        println!("  GOOSE_LOOP_INTERVAL_SECS   Pause between loop iterations (default: 20)");
        println!("  GOOSE_DESKTOP_NOTIFY       Desktop dialog when a task ends (default: true)");
        return Ok(());
    }

    // Setup logging based on mode
    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(if stream_mode { Level::WARN } else { Level::INFO });

    if stream_mode {
        // Interactive mode - log to stderr with colors, stdout carries the stream
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        // MCP mode - log to stderr as JSON
        let subscriber = FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let config = Config::from_env()?;

    if stream_mode {
        println!("Starting log stream for the current Goose session...");
        session_log::stream_log(&config.session_log_path()).await?;
    } else {
        info!("Goose Plugins MCP Server v{}", env!("CARGO_PKG_VERSION"));

        let server = McpServer::new(config).await?;
        server.run().await?;
    }

    Ok(())
}
