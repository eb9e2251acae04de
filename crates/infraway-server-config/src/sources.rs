// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use infraway_common_config::load_secret_env;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DeployConfigLayer, GitHubAppConfigLayer, HttpConfigLayer, LogFormat, LoggingConfigLayer,
};

/// Higher precedence overrides lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// A TOML file. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/infraway/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variables.
///
/// Convention: `INFRAWAY_<SECTION>_<FIELD>`. Secrets also accept a `_FILE`
/// variant.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			github_app: Some(load_github_app_from_env()?),
			logging: Some(load_logging_from_env()?),
			deploy: Some(load_deploy_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v
			.parse()
			.map(Some)
			.map_err(|_| ConfigError::invalid(name, format!("invalid u16 value '{v}'"))),
		None => Ok(None),
	}
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	match env_var(name) {
		Some(v) => v
			.parse()
			.map(Some)
			.map_err(|_| ConfigError::invalid(name, format!("invalid u64 value '{v}'"))),
		None => Ok(None),
	}
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|s| {
		s.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	})
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("INFRAWAY_HOST"),
		port: env_u16("INFRAWAY_PORT")?,
	})
}

fn load_github_app_from_env() -> Result<GitHubAppConfigLayer, ConfigError> {
	Ok(GitHubAppConfigLayer {
		app_id: env_u64("INFRAWAY_GITHUB_APP_ID")?,
		private_key_pem: load_secret_env("INFRAWAY_GITHUB_APP_PRIVATE_KEY")
			.map_err(|e| ConfigError::Secret(e.to_string()))?,
		webhook_secret: load_secret_env("INFRAWAY_GITHUB_APP_WEBHOOK_SECRET")
			.map_err(|e| ConfigError::Secret(e.to_string()))?,
		base_url: env_var("INFRAWAY_GITHUB_APP_BASE_URL"),
		request_timeout_secs: env_u64("INFRAWAY_GITHUB_APP_REQUEST_TIMEOUT_SECS")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("INFRAWAY_LOG_FORMAT") {
		Some(raw) => Some(
			raw.parse::<LogFormat>()
				.map_err(|message| ConfigError::invalid("INFRAWAY_LOG_FORMAT", message))?,
		),
		None => None,
	};

	Ok(LoggingConfigLayer {
		level: env_var("INFRAWAY_LOG_LEVEL"),
		format,
	})
}

fn load_deploy_from_env() -> Result<DeployConfigLayer, ConfigError> {
	Ok(DeployConfigLayer {
		chart_repo: env_var("INFRAWAY_DEPLOY_CHART_REPO"),
		chart_ref: env_var("INFRAWAY_DEPLOY_CHART_REF"),
		config_sources: env_list("INFRAWAY_DEPLOY_CONFIG_SOURCES"),
		refresh_interval_secs: env_u64("INFRAWAY_DEPLOY_REFRESH_INTERVAL_SECS")?,
		sweep_interval_secs: env_u64("INFRAWAY_DEPLOY_SWEEP_INTERVAL_SECS")?,
		publish_context_marker: env_var("INFRAWAY_DEPLOY_PUBLISH_CONTEXT_MARKER"),
	})
}
