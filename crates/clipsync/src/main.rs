//! # clipsync
//!
//! ClipSync hub binary. Loads settings, connects the backbone and serves
//! `/ws`, `/health` and `/metrics` until Ctrl-C.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipsync_auth::{JwtValidator, issue_token};
use clipsync_core::{UserId, init_subscriber};
use clipsync_server::metrics::install_recorder;
use clipsync_server::shutdown::DEFAULT_DRAIN_TIMEOUT;
use clipsync_server::{ClipSyncServer, ServerConfig, connect_backbone};
use clipsync_settings::ClipSyncSettings;

/// Real-time clipboard sync hub.
#[derive(Parser, Debug)]
#[command(name = "clipsync", about = "Real-time clipboard sync hub")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.clipsync/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mint a connection token for a user with the configured secret.
    Token {
        /// User the token authenticates.
        user_id: String,

        /// Token lifetime in seconds (defaults to `auth.tokenTtlSecs`).
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

/// Settings file, CLI overrides, then validation.
fn resolve_settings(cli: &Cli) -> Result<ClipSyncSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(clipsync_settings::settings_path);
    let mut settings = load_from(&path)?;
    apply_cli_overrides(&mut settings, cli.host.as_deref(), cli.port);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

fn load_from(path: &Path) -> Result<ClipSyncSettings> {
    clipsync_settings::load_settings_from_path(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn apply_cli_overrides(settings: &mut ClipSyncSettings, host: Option<&str>, port: Option<u16>) {
    if let Some(host) = host {
        settings.server.host = host.to_string();
    }
    if let Some(port) = port {
        settings.server.port = port;
    }
}

fn mint_token(settings: &ClipSyncSettings, user_id: &str, ttl_secs: Option<u64>) -> Result<String> {
    let ttl_secs = ttl_secs.unwrap_or(settings.auth.token_ttl_secs);
    let ttl = chrono::Duration::try_seconds(i64::try_from(ttl_secs).context("TTL out of range")?)
        .context("TTL out of range")?;
    issue_token(
        settings.auth.jwt_secret.as_bytes(),
        &UserId::from(user_id),
        ttl,
    )
    .context("Failed to sign token")
}

async fn serve(settings: ClipSyncSettings) -> Result<()> {
    let backbone = connect_backbone(&settings.backbone)
        .await
        .context("Failed to connect backbone")?;
    tracing::info!(kind = ?settings.backbone.kind, "backbone connected");

    let validator = Arc::new(JwtValidator::new(settings.auth.jwt_secret.as_bytes()));
    let config = ServerConfig::from_settings(&settings.server, &settings.backbone.channel_prefix);
    let mut server = ClipSyncServer::new(config, backbone, validator);
    match install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("ClipSync hub listening on ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let mut tasks = vec![handle];
    tasks.extend(server.take_hub_task());
    if !server.shutdown().drain(tasks, DEFAULT_DRAIN_TIMEOUT).await {
        tracing::warn!("some tasks did not finish before the drain deadline");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    if let Some(Command::Token { user_id, ttl_secs }) = &cli.command {
        println!("{}", mint_token(&settings, user_id, *ttl_secs)?);
        return Ok(());
    }

    init_subscriber(&settings.logging.level, settings.logging.format);
    serve(settings).await
}
