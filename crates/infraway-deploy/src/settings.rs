// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

/// Where an account's YAML configuration is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
	pub repository: String,
	pub path: String,
}

impl ConfigLocation {
	pub fn new(repository: impl Into<String>, path: impl Into<String>) -> Self {
		Self {
			repository: repository.into(),
			path: path.into(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeploySettings {
	/// Repository that receives the deployment requests.
	pub chart_repo: String,
	/// Ref to deploy; the chart repository's default branch when `None`.
	pub chart_ref: Option<String>,
	/// Tried in order, first parseable file wins.
	pub config_sources: Vec<ConfigLocation>,
	pub refresh_interval: Duration,
	pub sweep_interval: Duration,
	/// Substring a successful commit status context must contain to deploy.
	pub publish_context_marker: String,
}

impl Default for DeploySettings {
	fn default() -> Self {
		Self {
			chart_repo: "charts".to_string(),
			chart_ref: None,
			config_sources: vec![
				ConfigLocation::new(".infraway", "config.yaml"),
				ConfigLocation::new("charts", ".infraway/config.yaml"),
			],
			refresh_interval: Duration::from_secs(20 * 60),
			sweep_interval: Duration::from_secs(20 * 60),
			publish_context_marker: "publish".to_string(),
		}
	}
}
