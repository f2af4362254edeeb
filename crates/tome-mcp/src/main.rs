//! Tome MCP Server
//!
//! This binary runs Tome as an MCP server over stdio, exposing tools that let
//! AI assistants inspect files too large to read in one go.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rmcp::ServiceExt;
use tome::{EncodingPolicy, FileAccess, ReadLimits};
use tome_mcp::TomeServer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Tome MCP Server - bounded reads of large files over stdio
#[derive(Parser, Debug)]
#[command(name = "tome-mcp")]
#[command(about = "MCP server providing bounded access to large files")]
struct Args {
    /// JSON file with read limits; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fail on invalid UTF-8 instead of substituting replacement characters
    #[arg(long)]
    strict_encoding: bool,
}

fn load_limits(args: &Args) -> anyhow::Result<ReadLimits> {
    let mut limits = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ReadLimits::from_json(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ReadLimits::default(),
    };
    if args.strict_encoding {
        limits.encoding_policy = EncodingPolicy::Strict;
    }
    Ok(limits)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing - output to stderr so it doesn't interfere with MCP stdio
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let limits = load_limits(&args)?;
    tracing::info!(?limits, "Starting Tome MCP server");

    let server = TomeServer::new(FileAccess::new(limits));

    // Serve over stdio
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("Failed to start MCP service: {}", e);
        })?;

    tracing::info!("Tome MCP server running");

    service.waiting().await?;

    tracing::info!("Tome MCP server shutting down");

    Ok(())
}
