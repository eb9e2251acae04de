// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory [`SourceControl`] for tests.
//!
//! Responses are configured up front with the `with_*` builders and can be
//! changed later with the async setters. Every call is recorded. Anything
//! not configured answers 404.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infraway_github::{
	Deployment, DeploymentRequest, GithubAppError, PullRequest, PullRequestRef, Release, Tag,
	TagCommit,
};
use tokio::sync::{Mutex, MutexGuard};

use crate::account::Account;
use crate::scm::SourceControl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScmCall {
	FileContents { repo: String, path: String },
	DefaultBranch { repo: String },
	ListTags { repo: String, per_page: u32 },
	LatestRelease { repo: String },
	PullsForCommit { repo: String, sha: String },
	GetPull { repo: String, number: u64 },
	ListOpenPulls { repo: String },
	CreateDeployment { repo: String, environment: String },
}

/// Start and end of one `create_deployment` call, by environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
	Started(String),
	Finished(String),
}

/// A deployment request as the mock received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDeployment {
	pub owner: String,
	pub installation_id: i64,
	pub repo: String,
	pub request: DeploymentRequest,
}

#[derive(Debug, Default)]
struct MockState {
	files: HashMap<(String, String), String>,
	default_branches: HashMap<String, String>,
	tags: HashMap<String, Vec<Tag>>,
	releases: HashMap<String, Release>,
	commit_pulls: HashMap<(String, String), Vec<PullRequest>>,
	pulls: HashMap<(String, u64), PullRequest>,
	open_pulls: HashMap<String, Vec<PullRequest>>,
	failing_repos: HashSet<String>,
	failing_environments: HashSet<String>,
	deployment_delay: Option<Duration>,
	calls: Vec<ScmCall>,
	deployments: Vec<RecordedDeployment>,
	deployment_log: Vec<DeploymentEvent>,
}

#[derive(Debug, Default)]
pub struct MockSourceControl {
	state: Mutex<MockState>,
	in_flight: AtomicUsize,
	max_in_flight: AtomicUsize,
}

fn not_found(what: impl std::fmt::Display) -> GithubAppError {
	GithubAppError::api_error(404, format!("Not Found: {what}"))
}

/// A pull request with the given head and last update.
pub fn pull_request(number: u64, head_sha: &str, updated_at: DateTime<Utc>) -> PullRequest {
	PullRequest {
		number,
		state: "open".to_string(),
		updated_at,
		head: PullRequestRef {
			sha: head_sha.to_string(),
			git_ref: format!("feature-{number}"),
		},
		html_url: String::new(),
	}
}

impl MockSourceControl {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_file(mut self, repo: &str, path: &str, contents: &str) -> Self {
		self
			.state
			.get_mut()
			.files
			.insert((repo.to_string(), path.to_string()), contents.to_string());
		self
	}

	pub fn with_default_branch(mut self, repo: &str, branch: &str) -> Self {
		self
			.state
			.get_mut()
			.default_branches
			.insert(repo.to_string(), branch.to_string());
		self
	}

	pub fn with_tag(mut self, repo: &str, name: &str, sha: &str) -> Self {
		self
			.state
			.get_mut()
			.tags
			.entry(repo.to_string())
			.or_default()
			.push(Tag {
				name: name.to_string(),
				commit: TagCommit {
					sha: sha.to_string(),
				},
			});
		self
	}

	pub fn with_release(mut self, repo: &str, tag_name: &str) -> Self {
		self.state.get_mut().releases.insert(
			repo.to_string(),
			Release {
				id: 1,
				tag_name: tag_name.to_string(),
				draft: false,
				prerelease: false,
				published_at: Some(Utc::now()),
			},
		);
		self
	}

	/// Register `pull` under `get_pull`, and under `pulls_for_commit` for
	/// its head SHA.
	pub fn with_pull(mut self, repo: &str, pull: PullRequest) -> Self {
		let state = self.state.get_mut();
		state
			.commit_pulls
			.entry((repo.to_string(), pull.head.sha.clone()))
			.or_default()
			.push(pull.clone());
		state.pulls.insert((repo.to_string(), pull.number), pull);
		self
	}

	/// Pulls returned by `list_open_pulls`, in the given order.
	pub fn with_open_pulls(mut self, repo: &str, pulls: Vec<PullRequest>) -> Self {
		self
			.state
			.get_mut()
			.open_pulls
			.insert(repo.to_string(), pulls);
		self
	}

	/// Every call against `repo` fails with a 500.
	pub fn with_failing_repo(mut self, repo: &str) -> Self {
		self.state.get_mut().failing_repos.insert(repo.to_string());
		self
	}

	/// Deployments for `environment` fail with a 422.
	pub fn with_failing_environment(mut self, environment: &str) -> Self {
		self
			.state
			.get_mut()
			.failing_environments
			.insert(environment.to_string());
		self
	}

	/// `create_deployment` sleeps this long, without holding any lock,
	/// before it completes.
	pub fn with_deployment_delay(mut self, delay: Duration) -> Self {
		self.state.get_mut().deployment_delay = Some(delay);
		self
	}

	pub async fn set_file(&self, repo: &str, path: &str, contents: &str) {
		self
			.state
			.lock()
			.await
			.files
			.insert((repo.to_string(), path.to_string()), contents.to_string());
	}

	pub async fn remove_file(&self, repo: &str, path: &str) {
		self
			.state
			.lock()
			.await
			.files
			.remove(&(repo.to_string(), path.to_string()));
	}

	pub async fn calls(&self) -> Vec<ScmCall> {
		self.state.lock().await.calls.clone()
	}

	pub async fn deployments(&self) -> Vec<RecordedDeployment> {
		self.state.lock().await.deployments.clone()
	}

	pub async fn deployment_log(&self) -> Vec<DeploymentEvent> {
		self.state.lock().await.deployment_log.clone()
	}

	/// Most `create_deployment` calls that were running at the same time.
	pub fn max_in_flight(&self) -> usize {
		self.max_in_flight.load(Ordering::SeqCst)
	}

	async fn record(
		&self,
		repo: &str,
		call: ScmCall,
	) -> Result<MutexGuard<'_, MockState>, GithubAppError> {
		let mut state = self.state.lock().await;
		state.calls.push(call);
		if state.failing_repos.contains(repo) {
			return Err(GithubAppError::api_error(500, format!("{repo} is unavailable")));
		}
		Ok(state)
	}
}

#[async_trait]
impl SourceControl for MockSourceControl {
	async fn file_contents(
		&self,
		_account: &Account,
		repo: &str,
		path: &str,
	) -> Result<String, GithubAppError> {
		let state = self
			.record(
				repo,
				ScmCall::FileContents {
					repo: repo.to_string(),
					path: path.to_string(),
				},
			)
			.await?;
		state
			.files
			.get(&(repo.to_string(), path.to_string()))
			.cloned()
			.ok_or_else(|| not_found(format!("{repo}:{path}")))
	}

	async fn default_branch(&self, _account: &Account, repo: &str) -> Result<String, GithubAppError> {
		let state = self
			.record(
				repo,
				ScmCall::DefaultBranch {
					repo: repo.to_string(),
				},
			)
			.await?;
		Ok(state
			.default_branches
			.get(repo)
			.cloned()
			.unwrap_or_else(|| "main".to_string()))
	}

	async fn list_tags(
		&self,
		_account: &Account,
		repo: &str,
		per_page: u32,
	) -> Result<Vec<Tag>, GithubAppError> {
		let state = self
			.record(
				repo,
				ScmCall::ListTags {
					repo: repo.to_string(),
					per_page,
				},
			)
			.await?;
		Ok(state
			.tags
			.get(repo)
			.map(|tags| tags.iter().take(per_page as usize).cloned().collect())
			.unwrap_or_default())
	}

	async fn latest_release(
		&self,
		_account: &Account,
		repo: &str,
	) -> Result<Option<Release>, GithubAppError> {
		let state = self
			.record(
				repo,
				ScmCall::LatestRelease {
					repo: repo.to_string(),
				},
			)
			.await?;
		Ok(state.releases.get(repo).cloned())
	}

	async fn pulls_for_commit(
		&self,
		_account: &Account,
		repo: &str,
		sha: &str,
	) -> Result<Vec<PullRequest>, GithubAppError> {
		let state = self
			.record(
				repo,
				ScmCall::PullsForCommit {
					repo: repo.to_string(),
					sha: sha.to_string(),
				},
			)
			.await?;
		Ok(state
			.commit_pulls
			.get(&(repo.to_string(), sha.to_string()))
			.cloned()
			.unwrap_or_default())
	}

	async fn get_pull(
		&self,
		_account: &Account,
		repo: &str,
		number: u64,
	) -> Result<PullRequest, GithubAppError> {
		let state = self
			.record(
				repo,
				ScmCall::GetPull {
					repo: repo.to_string(),
					number,
				},
			)
			.await?;
		state
			.pulls
			.get(&(repo.to_string(), number))
			.cloned()
			.ok_or_else(|| not_found(format!("{repo}#{number}")))
	}

	async fn list_open_pulls(
		&self,
		_account: &Account,
		repo: &str,
	) -> Result<Vec<PullRequest>, GithubAppError> {
		let state = self
			.record(
				repo,
				ScmCall::ListOpenPulls {
					repo: repo.to_string(),
				},
			)
			.await?;
		Ok(state.open_pulls.get(repo).cloned().unwrap_or_default())
	}

	async fn create_deployment(
		&self,
		account: &Account,
		repo: &str,
		request: &DeploymentRequest,
	) -> Result<Deployment, GithubAppError> {
		let delay = {
			let mut state = self
				.record(
					repo,
					ScmCall::CreateDeployment {
						repo: repo.to_string(),
						environment: request.environment.clone(),
					},
				)
				.await?;
			if state.failing_environments.contains(&request.environment) {
				return Err(GithubAppError::api_error(
					422,
					format!("cannot deploy {}", request.environment),
				));
			}
			state
				.deployment_log
				.push(DeploymentEvent::Started(request.environment.clone()));
			state.deployment_delay
		};

		let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.max_in_flight.fetch_max(running, Ordering::SeqCst);
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
		self.in_flight.fetch_sub(1, Ordering::SeqCst);

		let mut state = self.state.lock().await;
		state
			.deployment_log
			.push(DeploymentEvent::Finished(request.environment.clone()));
		state.deployments.push(RecordedDeployment {
			owner: account.owner.clone(),
			installation_id: account.installation_id,
			repo: repo.to_string(),
			request: request.clone(),
		});
		Ok(Deployment {
			id: state.deployments.len() as i64,
			sha: String::new(),
			git_ref: request.git_ref.clone(),
			task: request.task.clone(),
			environment: request.environment.clone(),
			description: Some(request.description.clone()),
		})
	}
}
