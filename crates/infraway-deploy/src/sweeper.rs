// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tears down environments of pull requests nobody has touched in a while.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infraway_github::PullRequest;
use infraway_jobs::{Job, JobContext, JobError, JobOutput};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cache::ConfigCache;
use crate::executor::DeploymentExecutor;
use crate::payload::Payload;
use crate::resolver::resolve_delete_payloads;
use crate::scm::SourceControl;

/// Pulls last updated strictly before `now - idle`.
pub fn select_stale(
	pulls: &[PullRequest],
	now: DateTime<Utc>,
	idle: Duration,
) -> Vec<&PullRequest> {
	let Some(cutoff) = chrono::Duration::from_std(idle)
		.ok()
		.and_then(|idle| now.checked_sub_signed(idle))
	else {
		return Vec::new();
	};
	pulls.iter().filter(|p| p.updated_at < cutoff).collect()
}

pub fn sweep_job_id(owner: &str) -> String {
	format!("stale-sweep:{owner}")
}

#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
	pub swept: Vec<String>,
	pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Serialize)]
pub struct SweepFailure {
	pub repo: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub pull_number: Option<u64>,
	pub error: String,
}

pub struct StaleSweepJob {
	id: String,
	owner: String,
	scm: Arc<dyn SourceControl>,
	cache: Arc<ConfigCache>,
	executor: Arc<DeploymentExecutor>,
}

impl StaleSweepJob {
	pub fn new(
		owner: &str,
		scm: Arc<dyn SourceControl>,
		cache: Arc<ConfigCache>,
		executor: Arc<DeploymentExecutor>,
	) -> Self {
		Self {
			id: sweep_job_id(owner),
			owner: owner.to_string(),
			scm,
			cache,
			executor,
		}
	}

	/// One pass over every target repository. `None` when cleanup is off or
	/// the account has no configuration.
	#[instrument(skip(self, ctx), fields(owner = %self.owner))]
	pub async fn sweep(
		&self,
		ctx: &JobContext,
		now: DateTime<Utc>,
	) -> Result<Option<SweepReport>, JobError> {
		let (Some(config), Some(account)) = (
			self.cache.cached(&self.owner).await,
			self.cache.account(&self.owner).await,
		) else {
			return Ok(None);
		};
		if !config.stale_cleanup.enabled {
			return Ok(None);
		}

		let idle = config.idle_duration();
		let mut report = SweepReport::default();

		for target in &config.deploy_targets {
			let pulls = match self.scm.list_open_pulls(&account, &target.repo_name).await {
				Ok(pulls) => pulls,
				Err(e) => {
					warn!(repo = %target.repo_name, error = %e, "Failed to list open pull requests");
					report.failures.push(SweepFailure {
						repo: target.repo_name.clone(),
						pull_number: None,
						error: e.to_string(),
					});
					continue;
				}
			};

			for pull in select_stale(&pulls, now, idle) {
				if ctx.cancellation_token.is_cancelled() {
					return Err(JobError::Cancelled);
				}

				let payloads: Vec<Payload> =
					resolve_delete_payloads(&config, &target.repo_name, pull.number)
						.into_iter()
						.map(Payload::from)
						.collect();
				let Some(environment) = payloads.first().map(|p| p.environment_name().to_string())
				else {
					continue;
				};

				match self.executor.execute(&account, &payloads).await {
					Ok(_) => {
						info!(
							repo = %target.repo_name,
							pull_number = pull.number,
							updated_at = %pull.updated_at,
							"Swept stale environment"
						);
						report.swept.push(environment);
					}
					Err(e) => {
						warn!(
							repo = %target.repo_name,
							pull_number = pull.number,
							error = %e,
							"Failed to sweep stale environment"
						);
						report.failures.push(SweepFailure {
							repo: target.repo_name.clone(),
							pull_number: Some(pull.number),
							error: e.to_string(),
						});
					}
				}
			}
		}

		Ok(Some(report))
	}
}

#[async_trait]
impl Job for StaleSweepJob {
	fn id(&self) -> &str {
		&self.id
	}

	fn name(&self) -> &str {
		"Stale Environment Sweep"
	}

	fn description(&self) -> &str {
		"Delete environments of pull requests idle past the configured threshold"
	}

	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		let Some(report) = self.sweep(ctx, Utc::now()).await? else {
			return Ok(JobOutput::new("Stale cleanup disabled"));
		};

		let message = format!(
			"Swept {} environments, {} failures",
			report.swept.len(),
			report.failures.len()
		);
		let metadata =
			serde_json::to_value(&report).map_err(|e| JobError::permanent(e.to_string()))?;
		Ok(JobOutput::new(message).with_metadata(metadata))
	}
}
