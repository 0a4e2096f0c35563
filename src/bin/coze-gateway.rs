// ABOUTME: Gateway server binary: loads configuration, wires resources, and serves HTTP
// ABOUTME: Command-line flags override the matching environment variables
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Coze Gateway Server Binary
//!
//! Starts the backend-for-frontend gateway: user accounts, agent records,
//! conversation history, and streamed relays to the Coze agent API.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use coze_gateway::{
    config::environment::{DatabaseUrl, ServerConfig},
    logging,
    resources::ServerResources,
    server,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "coze-gateway")]
#[command(about = "Backend-for-frontend gateway relaying conversations to the Coze agent API")]
pub struct Args {
    /// Override HTTP port
    #[arg(long = "port", env = "HTTP_PORT")]
    http_port: Option<u16>,

    /// Override database URL
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(database_url) = args.database_url {
        config.database = DatabaseUrl::parse_url(&database_url);
    }
    config.validate()?;

    info!(
        environment = ?config.environment,
        database = %config.database.to_connection_string(),
        "Starting Coze gateway"
    );

    let resources = match ServerResources::from_config(config).await {
        Ok(resources) => Arc::new(resources),
        Err(e) => {
            error!("Failed to initialize server resources: {e}");
            return Err(e.into());
        }
    };

    if let Err(e) = server::serve(resources).await {
        error!("Server error: {e:#}");
        return Err(e);
    }
    Ok(())
}
