use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod chat;
mod render;
mod stream;

use studi_core::{CompletionFacade, CompletionOptions, Message};
use studi_gateway::ChatServer;

#[derive(Parser)]
#[command(name = "studi")]
#[command(version)]
#[command(about = "studi — campus chatbot gateway and terminal client")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat gateway
    Serve {
        /// Listen address
        #[arg(long, env = "STUDI_BIND", default_value = "127.0.0.1:8787")]
        bind: SocketAddr,
    },

    /// Interactive streamed chat against a running gateway
    Chat {
        /// Gateway base URL
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        url: String,
    },

    /// One-shot question straight through the provider layer
    Ask {
        /// The question to send
        message: String,

        /// Use the BACKEND_-prefixed configuration scope
        #[arg(long)]
        backend: bool,
    },

    /// Show gateway status
    Status {
        /// Gateway base URL
        #[arg(long, default_value = "http://127.0.0.1:8787")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Serve { bind } => cmd_serve(bind).await,
        Commands::Chat { url } => chat::run_chat(&url).await,
        Commands::Ask { message, backend } => cmd_ask(&message, backend).await,
        Commands::Status { url } => cmd_status(&url).await,
    }
}

async fn cmd_serve(bind: SocketAddr) -> Result<()> {
    let facade = CompletionFacade::from_env().context("Failed to configure the chat provider")?;
    info!("Chat provider: {}", facade.provider_name());
    ChatServer::new(bind, Arc::new(facade)).run().await
}

async fn cmd_ask(message: &str, backend: bool) -> Result<()> {
    let facade = CompletionFacade::from_env().context("Failed to configure the chat provider")?;
    let options = CompletionOptions::default().with_backend(backend);
    let completion = facade
        .chat_completion(&[Message::user(message)], &options)
        .await?;
    println!("{}", completion.content);
    Ok(())
}

async fn cmd_status(url: &str) -> Result<()> {
    let status: serde_json::Value =
        reqwest::get(format!("{}/api/status", url.trim_end_matches('/')))
            .await
            .context("Failed to reach the gateway")?
            .json()
            .await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
