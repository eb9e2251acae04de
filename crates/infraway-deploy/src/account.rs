// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-account deploy configuration.
//!
//! Each account keeps one YAML file describing which repositories deploy
//! which charts:
//!
//! ```yaml
//! domain: preview.example.com
//! deploy:
//!   - name: web
//!     components:
//!       - name: api
//!         chart: api
//!         needs: [worker]
//!       - name: worker
//!         version: release
//! stale_cleanup:
//!   enabled: true
//!   idle_duration: 7d
//! events:
//!   push: deploy
//!   pull_request: ignore
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::DeployError;

/// Idle time after which a pull request's environment is swept.
pub const DEFAULT_IDLE_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountConfig {
	pub domain: String,
	#[serde(default, rename = "deploy")]
	pub deploy_targets: Vec<DeployTarget>,
	#[serde(default)]
	pub stale_cleanup: StaleCleanup,
	#[serde(default, rename = "events")]
	pub event_policy: EventPolicy,
}

impl AccountConfig {
	pub fn from_yaml(raw: &str) -> Result<Self, DeployError> {
		let config: AccountConfig =
			serde_yaml::from_str(raw).map_err(|e| DeployError::InvalidConfig(e.to_string()))?;
		if config.domain.trim().is_empty() {
			return Err(DeployError::InvalidConfig("domain is empty".to_string()));
		}
		Ok(config)
	}

	/// First target declared for `repo`.
	pub fn target(&self, repo: &str) -> Option<&DeployTarget> {
		self.deploy_targets.iter().find(|t| t.repo_name == repo)
	}

	pub fn idle_duration(&self) -> Duration {
		self
			.stale_cleanup
			.idle_duration
			.unwrap_or(DEFAULT_IDLE_DURATION)
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeployTarget {
	#[serde(rename = "name")]
	pub repo_name: String,
	#[serde(default)]
	pub components: Vec<ComponentSpec>,
}

impl DeployTarget {
	/// Chart declared by the component, or inherited from the first sibling
	/// that lists it under `needs`. Inheritance stops at that sibling even
	/// when it has no chart of its own.
	pub fn effective_chart<'a>(&'a self, component: &'a ComponentSpec) -> Option<&'a str> {
		if let Some(chart) = component.chart.as_deref() {
			return Some(chart);
		}
		self
			.components
			.iter()
			.find(|sibling| {
				sibling
					.depends_on_owner_chart
					.iter()
					.any(|needed| needed == &component.name)
			})
			.and_then(|sibling| sibling.chart.as_deref())
	}
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentSpec {
	pub name: String,
	#[serde(default)]
	pub chart: Option<String>,
	#[serde(default, deserialize_with = "scalar_string")]
	pub version: Option<String>,
	/// Sibling components deployed with this component's chart.
	#[serde(default, rename = "needs")]
	pub depends_on_owner_chart: Vec<String>,
	#[serde(default, rename = "addon")]
	pub is_addon: bool,
	#[serde(default, rename = "values")]
	pub values_override: Option<String>,
	/// Repository whose releases back `version: release`. Defaults to a
	/// repository named after the component.
	#[serde(default)]
	pub repository: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StaleCleanup {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default, deserialize_with = "humantime_duration")]
	pub idle_duration: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
	#[default]
	Deploy,
	Ignore,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventPolicy {
	#[serde(default, rename = "push")]
	pub on_push: EventAction,
	#[serde(default, rename = "pull_request")]
	pub on_pull_request: EventAction,
}

/// YAML reads `version: 1.2` as a float; keep it as the text the user wrote.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error;

	match Option::<serde_yaml::Value>::deserialize(deserializer)? {
		None | Some(serde_yaml::Value::Null) => Ok(None),
		Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
		Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
		Some(serde_yaml::Value::Bool(b)) => Ok(Some(b.to_string())),
		Some(other) => Err(D::Error::custom(format!(
			"expected a scalar version, got {other:?}"
		))),
	}
}

fn humantime_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error;

	Option::<String>::deserialize(deserializer)?
		.map(|raw| humantime::parse_duration(raw.trim()).map_err(D::Error::custom))
		.transpose()
}

/// The GitHub App installation through which an owner's calls are made.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Account {
	pub owner: String,
	pub installation_id: i64,
}

impl Account {
	pub fn new(owner: impl Into<String>, installation_id: i64) -> Self {
		Self {
			owner: owner.into(),
			installation_id,
		}
	}
}

/// What caused a deploy. Addons only deploy on an explicit comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
	Comment,
	Push,
	PullRequest,
}

impl fmt::Display for TriggerKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			TriggerKind::Comment => "comment",
			TriggerKind::Push => "push",
			TriggerKind::PullRequest => "pull_request",
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const FULL: &str = r#"
domain: preview.example.com
deploy:
  - name: web
    components:
      - name: api
        chart: api-chart
        needs: [worker, cron]
      - name: worker
        version: release
        repository: worker-service
      - name: cron
      - name: metrics
        chart: prometheus
        addon: true
        values: metrics-values
        version: 1.10
  - name: web
    components: []
stale_cleanup:
  enabled: true
  idle_duration: 36h
events:
  push: ignore
"#;

	#[test]
	fn parses_full_config() {
		let config = AccountConfig::from_yaml(FULL).unwrap();
		assert_eq!(config.domain, "preview.example.com");
		assert_eq!(config.deploy_targets.len(), 2);

		let web = config.target("web").unwrap();
		assert_eq!(web.components.len(), 4);
		assert_eq!(web.components[0].depends_on_owner_chart, vec!["worker", "cron"]);
		assert_eq!(web.components[1].repository.as_deref(), Some("worker-service"));
		assert!(web.components[3].is_addon);
		assert_eq!(web.components[3].values_override.as_deref(), Some("metrics-values"));

		assert!(config.stale_cleanup.enabled);
		assert_eq!(config.idle_duration(), Duration::from_secs(36 * 60 * 60));
		assert_eq!(config.event_policy.on_push, EventAction::Ignore);
		assert_eq!(config.event_policy.on_pull_request, EventAction::Deploy);
	}

	#[test]
	fn numeric_version_is_kept_as_text() {
		let config = AccountConfig::from_yaml(FULL).unwrap();
		let metrics = &config.target("web").unwrap().components[3];
		assert_eq!(metrics.version.as_deref(), Some("1.1"));
	}

	#[test]
	fn first_target_wins() {
		let config = AccountConfig::from_yaml(FULL).unwrap();
		assert_eq!(config.target("web").unwrap().components.len(), 4);
		assert!(config.target("other").is_none());
	}

	#[test]
	fn missing_sections_use_defaults() {
		let config = AccountConfig::from_yaml("domain: example.com").unwrap();
		assert!(config.deploy_targets.is_empty());
		assert!(!config.stale_cleanup.enabled);
		assert_eq!(config.idle_duration(), DEFAULT_IDLE_DURATION);
		assert_eq!(config.event_policy, EventPolicy::default());
	}

	#[test]
	fn rejects_missing_domain() {
		assert!(AccountConfig::from_yaml("deploy: []").is_err());
		assert!(AccountConfig::from_yaml("domain: ''").is_err());
	}

	#[test]
	fn rejects_bad_idle_duration() {
		let err = AccountConfig::from_yaml(
			"domain: example.com\nstale_cleanup:\n  enabled: true\n  idle_duration: soon",
		)
		.unwrap_err();
		assert!(matches!(err, DeployError::InvalidConfig(_)));
	}

	#[test]
	fn chart_inheritance() {
		let config = AccountConfig::from_yaml(FULL).unwrap();
		let web = config.target("web").unwrap();
		let chart = |i: usize| web.effective_chart(&web.components[i]);

		assert_eq!(chart(0), Some("api-chart"));
		assert_eq!(chart(1), Some("api-chart"));
		assert_eq!(chart(2), Some("api-chart"));
		assert_eq!(chart(3), Some("prometheus"));
	}

	#[test]
	fn inheritance_stops_at_first_chartless_owner() {
		let config = AccountConfig::from_yaml(
			r#"
domain: example.com
deploy:
  - name: web
    components:
      - name: bundle
        needs: [worker]
      - name: api
        chart: api
        needs: [worker]
      - name: worker
"#,
		)
		.unwrap();
		let web = config.target("web").unwrap();
		assert_eq!(web.effective_chart(&web.components[2]), None);
	}
}
