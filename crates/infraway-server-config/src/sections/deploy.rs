// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deployment engine settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_CHART_REPO: &str = "charts";
const DEFAULT_INTERVAL_SECS: u64 = 20 * 60;
const DEFAULT_PUBLISH_MARKER: &str = "publish";
const DEFAULT_CONFIG_SOURCES: [&str; 2] =
	[".infraway:config.yaml", "charts:.infraway/config.yaml"];

/// A `repository:path` pair naming where an account keeps its deploy config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
	pub repository: String,
	pub path: String,
}

impl FromStr for ConfigLocation {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (repository, path) = s.trim().split_once(':').ok_or_else(|| {
			ConfigError::invalid(
				"deploy.config_sources",
				format!("'{s}' is not repository:path"),
			)
		})?;
		let (repository, path) = (repository.trim(), path.trim());
		if repository.is_empty() || path.is_empty() {
			return Err(ConfigError::invalid(
				"deploy.config_sources",
				format!("'{s}' has an empty repository or path"),
			));
		}
		Ok(Self {
			repository: repository.to_string(),
			path: path.to_string(),
		})
	}
}

impl fmt::Display for ConfigLocation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.repository, self.path)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeployConfigLayer {
	/// Repository receiving deployment requests.
	pub chart_repo: Option<String>,
	/// Ref deployed in `chart_repo`; its default branch when unset.
	pub chart_ref: Option<String>,
	/// Tried in order, first hit wins.
	pub config_sources: Option<Vec<String>>,
	pub refresh_interval_secs: Option<u64>,
	pub sweep_interval_secs: Option<u64>,
	pub publish_context_marker: Option<String>,
}

impl DeployConfigLayer {
	pub fn merge(&mut self, other: DeployConfigLayer) {
		if other.chart_repo.is_some() {
			self.chart_repo = other.chart_repo;
		}
		if other.chart_ref.is_some() {
			self.chart_ref = other.chart_ref;
		}
		if other.config_sources.is_some() {
			self.config_sources = other.config_sources;
		}
		if other.refresh_interval_secs.is_some() {
			self.refresh_interval_secs = other.refresh_interval_secs;
		}
		if other.sweep_interval_secs.is_some() {
			self.sweep_interval_secs = other.sweep_interval_secs;
		}
		if other.publish_context_marker.is_some() {
			self.publish_context_marker = other.publish_context_marker;
		}
	}

	pub fn finalize(self) -> Result<DeployConfig, ConfigError> {
		let config_sources = match self.config_sources {
			Some(raw) if !raw.is_empty() => raw
				.iter()
				.map(|s| s.parse())
				.collect::<Result<Vec<ConfigLocation>, _>>()?,
			Some(_) => {
				return Err(ConfigError::invalid(
					"deploy.config_sources",
					"at least one source is required",
				))
			}
			None => DEFAULT_CONFIG_SOURCES
				.iter()
				.map(|s| s.parse())
				.collect::<Result<Vec<ConfigLocation>, _>>()?,
		};

		Ok(DeployConfig {
			chart_repo: self
				.chart_repo
				.filter(|s| !s.trim().is_empty())
				.unwrap_or_else(|| DEFAULT_CHART_REPO.to_string()),
			chart_ref: self.chart_ref.filter(|s| !s.trim().is_empty()),
			config_sources,
			refresh_interval: interval("deploy.refresh_interval_secs", self.refresh_interval_secs)?,
			sweep_interval: interval("deploy.sweep_interval_secs", self.sweep_interval_secs)?,
			publish_context_marker: self
				.publish_context_marker
				.unwrap_or_else(|| DEFAULT_PUBLISH_MARKER.to_string()),
		})
	}
}

fn interval(key: &str, secs: Option<u64>) -> Result<Duration, ConfigError> {
	match secs.unwrap_or(DEFAULT_INTERVAL_SECS) {
		0 => Err(ConfigError::invalid(key, "must be greater than zero")),
		secs => Ok(Duration::from_secs(secs)),
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeployConfig {
	pub chart_repo: String,
	pub chart_ref: Option<String>,
	pub config_sources: Vec<ConfigLocation>,
	pub refresh_interval: Duration,
	pub sweep_interval: Duration,
	pub publish_context_marker: String,
}

impl Default for DeployConfig {
	fn default() -> Self {
		Self {
			chart_repo: DEFAULT_CHART_REPO.to_string(),
			chart_ref: None,
			config_sources: vec![
				ConfigLocation {
					repository: ".infraway".to_string(),
					path: "config.yaml".to_string(),
				},
				ConfigLocation {
					repository: "charts".to_string(),
					path: ".infraway/config.yaml".to_string(),
				},
			],
			refresh_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
			sweep_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
			publish_context_marker: DEFAULT_PUBLISH_MARKER.to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn empty_layer_matches_default() {
		let config = DeployConfigLayer::default().finalize().unwrap();
		assert_eq!(config, DeployConfig::default());
		assert_eq!(config.refresh_interval, Duration::from_secs(1200));
	}

	#[test]
	fn parses_location() {
		let location: ConfigLocation = "charts:.infraway/config.yaml".parse().unwrap();
		assert_eq!(location.repository, "charts");
		assert_eq!(location.path, ".infraway/config.yaml");
		assert_eq!(location.to_string(), "charts:.infraway/config.yaml");
	}

	#[test]
	fn rejects_location_without_path() {
		assert!("charts".parse::<ConfigLocation>().is_err());
		assert!("charts:".parse::<ConfigLocation>().is_err());
		assert!(":config.yaml".parse::<ConfigLocation>().is_err());
	}

	#[test]
	fn explicit_empty_source_list_is_rejected() {
		let layer = DeployConfigLayer {
			config_sources: Some(vec![]),
			..Default::default()
		};
		assert!(layer.finalize().is_err());
	}

	#[test]
	fn zero_interval_is_rejected() {
		let layer = DeployConfigLayer {
			sweep_interval_secs: Some(0),
			..Default::default()
		};
		let err = layer.finalize().unwrap_err();
		assert!(err.to_string().contains("deploy.sweep_interval_secs"));
	}

	#[test]
	fn blank_chart_ref_means_default_branch() {
		let layer = DeployConfigLayer {
			chart_ref: Some("  ".to_string()),
			..Default::default()
		};
		assert!(layer.finalize().unwrap().chart_ref.is_none());
	}

	#[test]
	fn parses_from_toml() {
		let layer: DeployConfigLayer = toml::from_str(
			r#"
			chart_repo = "helm"
			config_sources = ["ops:infraway.yaml"]
			publish_context_marker = "ci/publish"
			"#,
		)
		.unwrap();
		let config = layer.finalize().unwrap();
		assert_eq!(config.chart_repo, "helm");
		assert_eq!(config.config_sources.len(), 1);
		assert_eq!(config.publish_context_marker, "ci/publish");
	}

	proptest! {
		#[test]
		fn location_round_trips(repo in "[a-z.][a-z0-9._-]{0,20}", path in "[a-z0-9._/-]{1,30}") {
			let raw = format!("{repo}:{path}");
			let location: ConfigLocation = raw.parse().unwrap();
			prop_assert_eq!(location.to_string(), raw);
		}
	}
}
