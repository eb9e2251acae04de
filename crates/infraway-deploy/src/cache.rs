// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-account configuration cache.
//!
//! The first event for an account fetches its configuration and registers a
//! refresh job. Later events read the cached value. A failed refresh keeps
//! the previous configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use infraway_jobs::{Job, JobContext, JobError, JobOutput, JobScheduler};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::account::{Account, AccountConfig};
use crate::scm::SourceControl;
use crate::settings::ConfigLocation;

#[derive(Debug, Default)]
struct CacheEntry {
	installation_id: i64,
	config: Option<Arc<AccountConfig>>,
}

pub struct ConfigCache {
	scm: Arc<dyn SourceControl>,
	scheduler: Arc<JobScheduler>,
	sources: Vec<ConfigLocation>,
	refresh_interval: Duration,
	entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ConfigCache {
	pub fn new(
		scm: Arc<dyn SourceControl>,
		scheduler: Arc<JobScheduler>,
		sources: Vec<ConfigLocation>,
		refresh_interval: Duration,
	) -> Self {
		Self {
			scm,
			scheduler,
			sources,
			refresh_interval,
			entries: RwLock::new(HashMap::new()),
		}
	}

	/// Cached configuration for the account, fetching it on first use.
	///
	/// Never fails: a missing or unreadable configuration is `None`.
	#[instrument(skip(self), fields(owner = %account.owner))]
	pub async fn ensure_fresh(self: &Arc<Self>, account: &Account) -> Option<Arc<AccountConfig>> {
		let cached = {
			let mut entries = self.entries.write().await;
			let entry = entries.entry(account.owner.clone()).or_default();
			entry.installation_id = account.installation_id;
			entry.config.clone()
		};

		let config = match cached {
			Some(config) => Some(config),
			None => match self.fetch(account).await {
				Some(fetched) => {
					let fetched = Arc::new(fetched);
					let mut entries = self.entries.write().await;
					entries.entry(account.owner.clone()).or_default().config =
						Some(Arc::clone(&fetched));
					Some(fetched)
				}
				None => None,
			},
		};

		let job = Arc::new(ConfigRefreshJob::new(Arc::clone(self), &account.owner));
		if self
			.scheduler
			.register_periodic(job, self.refresh_interval)
			.await
		{
			info!(interval_secs = self.refresh_interval.as_secs(), "Config refresh scheduled");
		}

		config
	}

	pub async fn cached(&self, owner: &str) -> Option<Arc<AccountConfig>> {
		let entries = self.entries.read().await;
		entries.get(owner).and_then(|e| e.config.clone())
	}

	/// The account with the installation id seen most recently.
	pub async fn account(&self, owner: &str) -> Option<Account> {
		let entries = self.entries.read().await;
		entries
			.get(owner)
			.map(|e| Account::new(owner, e.installation_id))
	}

	/// Refetch and replace the configuration. Returns `false`, keeping the
	/// previous value, when nothing usable was found.
	pub async fn refresh(&self, owner: &str) -> bool {
		let Some(account) = self.account(owner).await else {
			return false;
		};
		let Some(fetched) = self.fetch(&account).await else {
			return false;
		};

		let mut entries = self.entries.write().await;
		entries.entry(owner.to_string()).or_default().config = Some(Arc::new(fetched));
		true
	}

	/// First source that can be fetched and parsed.
	async fn fetch(&self, account: &Account) -> Option<AccountConfig> {
		for source in &self.sources {
			let raw = match self
				.scm
				.file_contents(account, &source.repository, &source.path)
				.await
			{
				Ok(raw) => raw,
				Err(e) => {
					debug!(
						repository = %source.repository,
						path = %source.path,
						error = %e,
						"Config source unavailable"
					);
					continue;
				}
			};

			match AccountConfig::from_yaml(&raw) {
				Ok(config) => {
					info!(
						owner = %account.owner,
						repository = %source.repository,
						path = %source.path,
						targets = config.deploy_targets.len(),
						"Account configuration loaded"
					);
					return Some(config);
				}
				Err(e) => warn!(
					repository = %source.repository,
					path = %source.path,
					error = %e,
					"Ignoring unparseable account configuration"
				),
			}
		}

		warn!(owner = %account.owner, "No account configuration found");
		None
	}
}

pub fn refresh_job_id(owner: &str) -> String {
	format!("config-refresh:{owner}")
}

/// Periodically refetches one account's configuration.
pub struct ConfigRefreshJob {
	id: String,
	owner: String,
	cache: Arc<ConfigCache>,
}

impl ConfigRefreshJob {
	pub fn new(cache: Arc<ConfigCache>, owner: &str) -> Self {
		Self {
			id: refresh_job_id(owner),
			owner: owner.to_string(),
			cache,
		}
	}
}

#[async_trait]
impl Job for ConfigRefreshJob {
	fn id(&self) -> &str {
		&self.id
	}

	fn name(&self) -> &str {
		"Config Refresh"
	}

	fn description(&self) -> &str {
		"Refetch an account's deploy configuration"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let refreshed = self.cache.refresh(&self.owner).await;
		let message = if refreshed {
			"Configuration refreshed"
		} else {
			"No configuration found, keeping cached value"
		};
		Ok(JobOutput::new(message).with_metadata(serde_json::json!({
			"owner": self.owner,
			"refreshed": refreshed,
		})))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock::{MockSourceControl, ScmCall};
	use crate::settings::DeploySettings;
	use infraway_jobs::{JobHistory, TriggerSource};

	const CONFIG_V1: &str = "domain: v1.example.com\ndeploy: []";
	const CONFIG_V2: &str = "domain: v2.example.com\ndeploy: []";

	struct Harness {
		scm: Arc<MockSourceControl>,
		scheduler: Arc<JobScheduler>,
		cache: Arc<ConfigCache>,
	}

	fn harness(scm: MockSourceControl) -> Harness {
		let scm = Arc::new(scm);
		let scheduler = Arc::new(JobScheduler::new(Arc::new(JobHistory::default())));
		let cache = Arc::new(ConfigCache::new(
			scm.clone(),
			Arc::clone(&scheduler),
			DeploySettings::default().config_sources,
			Duration::from_secs(1200),
		));
		Harness {
			scm,
			scheduler,
			cache,
		}
	}

	fn account() -> Account {
		Account::new("acme", 7)
	}

	#[tokio::test]
	async fn first_call_fetches_and_registers_refresh() {
		let h = harness(MockSourceControl::new().with_file(".infraway", "config.yaml", CONFIG_V1));

		let config = h.cache.ensure_fresh(&account()).await.unwrap();
		assert_eq!(config.domain, "v1.example.com");
		assert!(h.scheduler.is_registered("config-refresh:acme").await);
		assert_eq!(
			h.scheduler.interval("config-refresh:acme").await,
			Some(Duration::from_secs(1200))
		);
		h.scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn falls_back_to_second_source() {
		let h = harness(
			MockSourceControl::new().with_file("charts", ".infraway/config.yaml", CONFIG_V2),
		);

		let config = h.cache.ensure_fresh(&account()).await.unwrap();
		assert_eq!(config.domain, "v2.example.com");
		assert_eq!(
			h.scm.calls().await,
			vec![
				ScmCall::FileContents {
					repo: ".infraway".to_string(),
					path: "config.yaml".to_string()
				},
				ScmCall::FileContents {
					repo: "charts".to_string(),
					path: ".infraway/config.yaml".to_string()
				},
			]
		);
		h.scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn unparseable_first_source_is_skipped() {
		let h = harness(
			MockSourceControl::new()
				.with_file(".infraway", "config.yaml", "deploy: [")
				.with_file("charts", ".infraway/config.yaml", CONFIG_V2),
		);

		let config = h.cache.ensure_fresh(&account()).await.unwrap();
		assert_eq!(config.domain, "v2.example.com");
		h.scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn missing_config_is_none_but_still_scheduled() {
		let h = harness(MockSourceControl::new());

		assert!(h.cache.ensure_fresh(&account()).await.is_none());
		assert!(h.scheduler.is_registered("config-refresh:acme").await);
		h.scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn second_call_uses_cache_and_single_job() {
		let h = harness(MockSourceControl::new().with_file(".infraway", "config.yaml", CONFIG_V1));

		h.cache.ensure_fresh(&account()).await.unwrap();
		h.scm.set_file(".infraway", "config.yaml", CONFIG_V2).await;
		let config = h.cache.ensure_fresh(&account()).await.unwrap();

		assert_eq!(config.domain, "v1.example.com");
		assert_eq!(h.scm.calls().await.len(), 1);
		assert_eq!(h.scheduler.job_ids().await, vec!["config-refresh:acme".to_string()]);
		h.scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn installation_id_follows_latest_event() {
		let h = harness(MockSourceControl::new().with_file(".infraway", "config.yaml", CONFIG_V1));

		h.cache.ensure_fresh(&account()).await;
		h.cache.ensure_fresh(&Account::new("acme", 99)).await;

		assert_eq!(h.cache.account("acme").await, Some(Account::new("acme", 99)));
		h.scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn refresh_replaces_config() {
		let h = harness(MockSourceControl::new().with_file(".infraway", "config.yaml", CONFIG_V1));
		h.cache.ensure_fresh(&account()).await;

		h.scm.set_file(".infraway", "config.yaml", CONFIG_V2).await;
		assert!(h.cache.refresh("acme").await);
		assert_eq!(h.cache.cached("acme").await.unwrap().domain, "v2.example.com");
		h.scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn failed_refresh_keeps_previous_config() {
		let h = harness(MockSourceControl::new().with_file(".infraway", "config.yaml", CONFIG_V1));
		h.cache.ensure_fresh(&account()).await;

		h.scm.remove_file(".infraway", "config.yaml").await;
		assert!(!h.cache.refresh("acme").await);
		assert_eq!(h.cache.cached("acme").await.unwrap().domain, "v1.example.com");
		h.scheduler.shutdown().await;
	}

	#[tokio::test]
	async fn refresh_of_unknown_owner_is_noop() {
		let h = harness(MockSourceControl::new());
		assert!(!h.cache.refresh("nobody").await);
		assert!(h.scm.calls().await.is_empty());
	}

	#[tokio::test]
	async fn refresh_job_reports_outcome() {
		let h = harness(MockSourceControl::new().with_file(".infraway", "config.yaml", CONFIG_V1));
		h.cache.ensure_fresh(&account()).await;
		h.scm.set_file(".infraway", "config.yaml", CONFIG_V2).await;

		h.scheduler
			.trigger_job("config-refresh:acme", TriggerSource::Manual)
			.await
			.unwrap();

		assert_eq!(h.cache.cached("acme").await.unwrap().domain, "v2.example.com");
		let last = h.scheduler.history().last_run("config-refresh:acme").await.unwrap();
		assert_eq!(last.metadata.unwrap()["refreshed"], serde_json::json!(true));
		h.scheduler.shutdown().await;
	}
}
