// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::context::{CancellationToken, JobContext};
use crate::error::{JobError, Result};
use crate::health::{determine_health_state, HealthState, JobHealthStatus, JobsHealthStatus};
use crate::history::JobHistory;
use crate::job::Job;
use crate::types::{JobRun, JobStatus, JobType, TriggerSource};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const BASE_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_FACTOR: f64 = 2.0;
const MAX_RETRIES: u32 = 3;

struct RegisteredJob {
	job: Arc<dyn Job>,
	job_type: JobType,
	cancellation_token: CancellationToken,
}

/// Runs periodic jobs on their own tokio tasks.
///
/// Registration happens at runtime and is keyed by [`Job::id`]: the first
/// registration for an id wins and later ones are ignored, so callers can
/// register on every event without starting duplicate loops.
pub struct JobScheduler {
	jobs: Mutex<HashMap<String, RegisteredJob>>,
	history: Arc<JobHistory>,
	shutdown_tx: broadcast::Sender<()>,
	shut_down: AtomicBool,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for JobScheduler {
	fn default() -> Self {
		Self::new(Arc::new(JobHistory::default()))
	}
}

impl JobScheduler {
	pub fn new(history: Arc<JobHistory>) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			jobs: Mutex::new(HashMap::new()),
			history,
			shutdown_tx,
			shut_down: AtomicBool::new(false),
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn history(&self) -> &Arc<JobHistory> {
		&self.history
	}

	/// Register `job` to run every `interval`, first run after one interval.
	///
	/// Returns `false` without scheduling anything if a job with the same id
	/// is already registered or the scheduler has shut down.
	#[instrument(skip(self, job), fields(job_id = %job.id(), interval_secs = interval.as_secs()))]
	pub async fn register_periodic(&self, job: Arc<dyn Job>, interval: Duration) -> bool {
		let mut jobs = self.jobs.lock().await;

		if self.shut_down.load(Ordering::SeqCst) {
			warn!("Scheduler is shut down, not registering job");
			return false;
		}
		if jobs.contains_key(job.id()) {
			debug!("Job already registered");
			return false;
		}

		let job_id = job.id().to_string();
		let cancellation_token = CancellationToken::new();
		let handle = spawn_periodic(
			Arc::clone(&job),
			interval,
			Arc::clone(&self.history),
			self.shutdown_tx.subscribe(),
			cancellation_token.clone(),
		);

		jobs.insert(
			job_id,
			RegisteredJob {
				job,
				job_type: JobType::Periodic { interval },
				cancellation_token,
			},
		);
		self.handles.lock().await.push(handle);

		info!("Periodic job registered");
		true
	}

	pub async fn is_registered(&self, job_id: &str) -> bool {
		self.jobs.lock().await.contains_key(job_id)
	}

	pub async fn interval(&self, job_id: &str) -> Option<Duration> {
		let jobs = self.jobs.lock().await;
		jobs.get(job_id).map(|registered| match registered.job_type {
			JobType::Periodic { interval } => interval,
		})
	}

	/// Run a registered job now, outside its schedule.
	#[instrument(skip(self))]
	pub async fn trigger_job(&self, job_id: &str, triggered_by: TriggerSource) -> Result<String> {
		let (job, cancellation_token) = {
			let jobs = self.jobs.lock().await;
			let registered = jobs
				.get(job_id)
				.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
			(
				Arc::clone(&registered.job),
				registered.cancellation_token.clone(),
			)
		};

		run_job_with_retry(&job, &self.history, triggered_by, &cancellation_token).await
	}

	/// Stop future runs of a job. A run in progress sees the cancelled token.
	#[instrument(skip(self))]
	pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
		let jobs = self.jobs.lock().await;
		let registered = jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.cancel();
		Ok(())
	}

	/// Cancel every job, stop the loops and wait for them to exit.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		{
			let jobs = self.jobs.lock().await;
			self.shut_down.store(true, Ordering::SeqCst);
			for registered in jobs.values() {
				registered.cancellation_token.cancel();
			}
		}

		let _ = self.shutdown_tx.send(());

		let handles: Vec<JoinHandle<()>> = self.handles.lock().await.drain(..).collect();
		for handle in handles {
			let _ = handle.await;
		}

		info!("Job scheduler shut down");
	}

	pub async fn job_ids(&self) -> Vec<String> {
		let mut ids: Vec<String> = self.jobs.lock().await.keys().cloned().collect();
		ids.sort();
		ids
	}

	#[instrument(skip(self))]
	pub async fn job_status(&self, job_id: &str) -> Option<JobHealthStatus> {
		let name = {
			let jobs = self.jobs.lock().await;
			jobs.get(job_id)?.job.name().to_string()
		};

		let last_run = self.history.last_run(job_id).await;
		let consecutive_failures = self.history.consecutive_failures(job_id).await;

		Some(JobHealthStatus {
			job_id: job_id.to_string(),
			name,
			status: determine_health_state(last_run.as_ref(), consecutive_failures),
			last_run: last_run.map(Into::into),
			consecutive_failures,
		})
	}

	/// Per-job health plus the worst state across all jobs.
	#[instrument(skip(self))]
	pub async fn health_status(&self) -> JobsHealthStatus {
		let mut jobs = Vec::new();
		for job_id in self.job_ids().await {
			if let Some(status) = self.job_status(&job_id).await {
				jobs.push(status);
			}
		}

		let status = jobs
			.iter()
			.map(|job| job.status)
			.max()
			.unwrap_or(HealthState::Healthy);

		JobsHealthStatus { status, jobs }
	}
}

fn spawn_periodic(
	job: Arc<dyn Job>,
	interval: Duration,
	history: Arc<JobHistory>,
	mut shutdown_rx: broadcast::Receiver<()>,
	cancellation_token: CancellationToken,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		loop {
			tokio::select! {
				_ = tokio::time::sleep(interval) => {
					if cancellation_token.is_cancelled() {
						continue;
					}
					let _ = run_job_with_retry(
						&job,
						&history,
						TriggerSource::Schedule,
						&cancellation_token,
					).await;
				}
				_ = shutdown_rx.recv() => {
					info!(job_id = %job.id(), "Shutting down periodic job");
					break;
				}
			}
		}
	})
}

async fn run_job_with_retry(
	job: &Arc<dyn Job>,
	history: &JobHistory,
	triggered_by: TriggerSource,
	cancellation_token: &CancellationToken,
) -> Result<String> {
	let job_id = job.id().to_string();
	let run_id = uuid::Uuid::new_v4().to_string();
	let mut retry_count = 0u32;

	history
		.record_run_start(&JobRun {
			id: run_id.clone(),
			job_id: job_id.clone(),
			status: JobStatus::Running,
			started_at: Utc::now(),
			completed_at: None,
			duration_ms: None,
			error_message: None,
			retry_count,
			triggered_by,
			metadata: None,
		})
		.await;

	loop {
		let ctx = JobContext {
			run_id: run_id.clone(),
			triggered_by: if retry_count > 0 {
				TriggerSource::Retry
			} else {
				triggered_by
			},
			cancellation_token: cancellation_token.clone(),
		};

		match job.run(&ctx).await {
			Ok(output) => {
				history
					.record_run_complete(&job_id, &run_id, JobStatus::Succeeded, None, output.metadata)
					.await;
				info!(job_id = %job_id, run_id = %run_id, message = %output.message, "Job completed successfully");
				return Ok(run_id);
			}
			Err(JobError::Cancelled) => {
				history
					.record_run_complete(&job_id, &run_id, JobStatus::Cancelled, None, None)
					.await;
				info!(job_id = %job_id, run_id = %run_id, "Job cancelled");
				return Err(JobError::Cancelled);
			}
			Err(JobError::Failed { message, retryable })
				if retryable && retry_count < MAX_RETRIES && !cancellation_token.is_cancelled() =>
			{
				retry_count += 1;
				history.set_retry_count(&job_id, &run_id, retry_count).await;
				let delay_secs = calculate_backoff_delay(retry_count);
				warn!(
					job_id = %job_id,
					run_id = %run_id,
					retry_count,
					delay_secs,
					error = %message,
					"Job failed, retrying"
				);
				tokio::time::sleep(Duration::from_secs(delay_secs)).await;
			}
			Err(e) => {
				let message = e.to_string();
				history
					.record_run_complete(&job_id, &run_id, JobStatus::Failed, Some(message.clone()), None)
					.await;
				warn!(job_id = %job_id, run_id = %run_id, error = %message, "Job failed");
				return Err(e);
			}
		}
	}
}

pub(crate) fn calculate_backoff_delay(retry_count: u32) -> u64 {
	let delay = BASE_RETRY_DELAY_SECS as f64 * RETRY_FACTOR.powi(retry_count as i32 - 1);
	(delay as u64).min(MAX_RETRY_DELAY_SECS)
}
