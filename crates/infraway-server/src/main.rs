// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! infraway webhook server binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use infraway_deploy::SourceControl;
use infraway_github::GithubAppClient;
use infraway_server::api::github_client_config;
use infraway_server::{create_app_state, create_router};
use infraway_server_config::LogFormat;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod version;

/// infraway server - preview environments from GitHub events.
#[derive(Parser, Debug)]
#[command(name = "infraway-server", about = "Preview environment webhook server", version)]
struct Args {
	/// TOML configuration file (default: /etc/infraway/server.toml)
	#[arg(long, env = "INFRAWAY_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => infraway_server_config::load_config_with_file(path)?,
		None => infraway_server_config::load_config()?,
	};

	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());
	let (text_layer, json_layer) = match config.logging.format {
		LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
		LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
	};
	tracing_subscriber::registry()
		.with(filter)
		.with(text_layer)
		.with(json_layer)
		.init();

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		chart_repo = %config.deploy.chart_repo,
		"starting infraway-server"
	);

	let github_app = config
		.github_app
		.as_ref()
		.ok_or("GitHub App is not configured (set INFRAWAY_GITHUB_APP_ID)")?;
	let client = GithubAppClient::new(github_client_config(github_app))?;
	let scm: Arc<dyn SourceControl> = Arc::new(client);

	let state = create_app_state(&config, scm);
	let scheduler = Arc::clone(state.scheduler());

	let app = create_router(state).layer(
		CorsLayer::new()
			.allow_origin(Any)
			.allow_methods(Any)
			.allow_headers(Any),
	);

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	if let Err(e) = axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await
	{
		tracing::error!(error = %e, "Server error");
	}

	tracing::info!("Shutting down job scheduler...");
	scheduler.shutdown().await;

	tracing::info!("Server shutdown complete");
	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::error!(error = %e, "Failed to listen for Ctrl-C");
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				tracing::error!(error = %e, "Failed to listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	tracing::info!("Received shutdown signal");
}
