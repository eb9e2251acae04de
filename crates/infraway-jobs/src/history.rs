// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory record of job runs.
//!
//! Nothing survives a restart; the history only backs the health endpoint.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::types::{JobRun, JobStatus};

/// Runs kept per job before the oldest are dropped.
pub const DEFAULT_RUNS_PER_JOB: usize = 50;

#[derive(Debug)]
pub struct JobHistory {
	runs: RwLock<HashMap<String, VecDeque<JobRun>>>,
	runs_per_job: usize,
}

impl Default for JobHistory {
	fn default() -> Self {
		Self::new(DEFAULT_RUNS_PER_JOB)
	}
}

impl JobHistory {
	pub fn new(runs_per_job: usize) -> Self {
		Self {
			runs: RwLock::new(HashMap::new()),
			runs_per_job: runs_per_job.max(1),
		}
	}

	pub async fn record_run_start(&self, run: &JobRun) {
		let mut runs = self.runs.write().await;
		let job_runs = runs.entry(run.job_id.clone()).or_default();
		job_runs.push_front(run.clone());
		job_runs.truncate(self.runs_per_job);
	}

	/// Close out a run started with [`Self::record_run_start`]. Unknown run
	/// ids are ignored.
	pub async fn record_run_complete(
		&self,
		job_id: &str,
		run_id: &str,
		status: JobStatus,
		error_message: Option<String>,
		metadata: Option<serde_json::Value>,
	) {
		let mut runs = self.runs.write().await;
		let Some(run) = runs
			.get_mut(job_id)
			.and_then(|job_runs| job_runs.iter_mut().find(|r| r.id == run_id))
		else {
			return;
		};

		let now = Utc::now();
		run.status = status;
		run.completed_at = Some(now);
		run.duration_ms = Some((now - run.started_at).num_milliseconds());
		run.error_message = error_message;
		run.metadata = metadata;
	}

	pub async fn set_retry_count(&self, job_id: &str, run_id: &str, retry_count: u32) {
		let mut runs = self.runs.write().await;
		if let Some(run) = runs
			.get_mut(job_id)
			.and_then(|job_runs| job_runs.iter_mut().find(|r| r.id == run_id))
		{
			run.retry_count = retry_count;
		}
	}

	pub async fn last_run(&self, job_id: &str) -> Option<JobRun> {
		let runs = self.runs.read().await;
		runs.get(job_id).and_then(|job_runs| job_runs.front().cloned())
	}

	/// Most recent runs first.
	pub async fn runs(&self, job_id: &str) -> Vec<JobRun> {
		let runs = self.runs.read().await;
		runs
			.get(job_id)
			.map(|job_runs| job_runs.iter().cloned().collect())
			.unwrap_or_default()
	}

	/// Number of failed runs since the most recent non-failed one.
	pub async fn consecutive_failures(&self, job_id: &str) -> u32 {
		let runs = self.runs.read().await;
		runs
			.get(job_id)
			.map(|job_runs| {
				job_runs
					.iter()
					.take_while(|r| r.status == JobStatus::Failed)
					.count() as u32
			})
			.unwrap_or(0)
	}
}
