// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the infraway server.
//!
//! Layers are read from built-in defaults, a TOML file and `INFRAWAY_*`
//! environment variables, then merged by precedence and validated.
//!
//! ```ignore
//! use infraway_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub github_app: Option<GitHubAppConfig>,
	pub logging: LoggingConfig,
	pub deploy: DeployConfig,
}

impl ServerConfig {
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Precedence, highest first: `INFRAWAY_*` variables,
/// `/etc/infraway/server.toml`, built-in defaults.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Same as [`load_config`] with the TOML file at `config_path`.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();
	let deploy = layer.deploy.unwrap_or_default().finalize()?;
	let github_app = match layer.github_app {
		Some(l) => l.build()?,
		None => None,
	};

	info!(
		host = %http.host,
		port = http.port,
		github_app_configured = github_app.is_some(),
		chart_repo = %deploy.chart_repo,
		config_sources = deploy.config_sources.len(),
		"Server configuration loaded"
	);

	Ok(ServerConfig {
		http,
		github_app,
		logging,
		deploy,
	})
}
