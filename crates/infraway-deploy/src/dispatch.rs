// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Routes webhook events to the resolver and executor.

use std::sync::Arc;

use infraway_github::events::{IssueCommentEvent, PullRequestEvent, PushEvent, StatusEvent};
use infraway_github::Deployment;
use infraway_jobs::JobScheduler;
use tracing::{debug, info, instrument, warn};

use crate::account::{Account, AccountConfig, EventAction, TriggerKind};
use crate::cache::ConfigCache;
use crate::command::{self, ComponentOverride};
use crate::error::DeployError;
use crate::executor::DeploymentExecutor;
use crate::payload::Payload;
use crate::resolver::{resolve_delete_payloads, resolve_deploy_payloads, DeployRequest};
use crate::scm::SourceControl;
use crate::settings::DeploySettings;
use crate::sweeper::StaleSweepJob;

/// A webhook payload infraway acts on.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
	IssueComment(IssueCommentEvent),
	Push(PushEvent),
	PullRequest(PullRequestEvent),
	Status(StatusEvent),
}

impl WebhookEvent {
	/// Parse a body for the `X-GitHub-Event` name. `Ok(None)` for events
	/// infraway does not handle.
	pub fn parse(event: &str, body: &[u8]) -> Result<Option<Self>, serde_json::Error> {
		Ok(Some(match event {
			"issue_comment" => WebhookEvent::IssueComment(serde_json::from_slice(body)?),
			"push" => WebhookEvent::Push(serde_json::from_slice(body)?),
			"pull_request" => WebhookEvent::PullRequest(serde_json::from_slice(body)?),
			"status" => WebhookEvent::Status(serde_json::from_slice(body)?),
			_ => return Ok(None),
		}))
	}

	pub fn kind(&self) -> &'static str {
		match self {
			WebhookEvent::IssueComment(_) => "issue_comment",
			WebhookEvent::Push(_) => "push",
			WebhookEvent::PullRequest(_) => "pull_request",
			WebhookEvent::Status(_) => "status",
		}
	}

	pub fn installation_id(&self) -> Option<i64> {
		let installation = match self {
			WebhookEvent::IssueComment(e) => &e.installation,
			WebhookEvent::Push(e) => &e.installation,
			WebhookEvent::PullRequest(e) => &e.installation,
			WebhookEvent::Status(e) => &e.installation,
		};
		installation.as_ref().map(|i| i.id)
	}

	pub fn owner(&self) -> &str {
		&self.repository().owner.login
	}

	pub fn repo(&self) -> &str {
		&self.repository().name
	}

	fn repository(&self) -> &infraway_github::events::EventRepository {
		match self {
			WebhookEvent::IssueComment(e) => &e.repository,
			WebhookEvent::Push(e) => &e.repository,
			WebhookEvent::PullRequest(e) => &e.repository,
			WebhookEvent::Status(e) => &e.repository,
		}
	}
}

#[derive(Debug)]
pub enum DispatchOutcome {
	Deployed(Vec<Deployment>),
	Deleted(Vec<Deployment>),
	Skipped(String),
}

impl DispatchOutcome {
	fn skipped(reason: impl Into<String>) -> Self {
		let reason = reason.into();
		debug!(reason = %reason, "Event skipped");
		DispatchOutcome::Skipped(reason)
	}
}

pub struct DeployEngine {
	scm: Arc<dyn SourceControl>,
	scheduler: Arc<JobScheduler>,
	cache: Arc<ConfigCache>,
	executor: Arc<DeploymentExecutor>,
	settings: DeploySettings,
}

impl DeployEngine {
	pub fn new(
		scm: Arc<dyn SourceControl>,
		scheduler: Arc<JobScheduler>,
		settings: DeploySettings,
	) -> Self {
		let cache = Arc::new(ConfigCache::new(
			Arc::clone(&scm),
			Arc::clone(&scheduler),
			settings.config_sources.clone(),
			settings.refresh_interval,
		));
		let executor = Arc::new(DeploymentExecutor::new(
			Arc::clone(&scm),
			settings.chart_repo.clone(),
			settings.chart_ref.clone(),
		));
		Self {
			scm,
			scheduler,
			cache,
			executor,
			settings,
		}
	}

	pub fn cache(&self) -> &Arc<ConfigCache> {
		&self.cache
	}

	pub fn scheduler(&self) -> &Arc<JobScheduler> {
		&self.scheduler
	}

	#[instrument(skip(self, event), fields(event = event.kind(), owner = event.owner(), repo = event.repo()))]
	pub async fn handle(&self, event: &WebhookEvent) -> Result<DispatchOutcome, DeployError> {
		let installation_id = event
			.installation_id()
			.ok_or(DeployError::MissingInstallation)?;
		let account = Account::new(event.owner(), installation_id);

		match event {
			WebhookEvent::IssueComment(e) => self.handle_comment(&account, e).await,
			WebhookEvent::Push(e) => self.handle_push(&account, e).await,
			WebhookEvent::PullRequest(e) => self.handle_pull_request(&account, e).await,
			WebhookEvent::Status(e) => self.handle_status(&account, e).await,
		}
	}

	pub async fn handle_comment(
		&self,
		account: &Account,
		event: &IssueCommentEvent,
	) -> Result<DispatchOutcome, DeployError> {
		if event.action != "created" {
			return Ok(DispatchOutcome::skipped(format!(
				"comment action {}",
				event.action
			)));
		}
		let Some(overrides) = command::parse(&event.comment.body) else {
			return Ok(DispatchOutcome::skipped("comment is not a deploy command"));
		};

		let config = self.prepare(account).await;
		if !event.issue.is_pull_request() {
			return Ok(DispatchOutcome::skipped("comment is not on a pull request"));
		}
		let Some(config) = config else {
			return Ok(DispatchOutcome::skipped("account has no configuration"));
		};

		info!(
			pull_number = event.issue.number,
			overrides = overrides.len(),
			"Deploy requested by comment"
		);
		let request = DeployRequest {
			account: account.clone(),
			repo: event.repository.name.clone(),
			pull_number: event.issue.number,
			revision: None,
		};
		self
			.deploy(&config, &request, &overrides, TriggerKind::Comment)
			.await
	}

	pub async fn handle_push(
		&self,
		account: &Account,
		event: &PushEvent,
	) -> Result<DispatchOutcome, DeployError> {
		let config = self.prepare(account).await;
		if event.is_deletion() {
			return Ok(DispatchOutcome::skipped("branch deleted"));
		}
		self
			.deploy_commit(account, config, &event.repository.name, event.head_sha())
			.await
	}

	/// Successful publish statuses deploy like a push of the status commit.
	pub async fn handle_status(
		&self,
		account: &Account,
		event: &StatusEvent,
	) -> Result<DispatchOutcome, DeployError> {
		let config = self.prepare(account).await;
		if event.state != "success" {
			return Ok(DispatchOutcome::skipped(format!("status {}", event.state)));
		}
		if !event.context.contains(&self.settings.publish_context_marker) {
			return Ok(DispatchOutcome::skipped(format!(
				"status context {} is not a publish",
				event.context
			)));
		}
		self
			.deploy_commit(account, config, &event.repository.name, &event.sha)
			.await
	}

	pub async fn handle_pull_request(
		&self,
		account: &Account,
		event: &PullRequestEvent,
	) -> Result<DispatchOutcome, DeployError> {
		let config = self.prepare(account).await;
		let Some(config) = config else {
			return Ok(DispatchOutcome::skipped("account has no configuration"));
		};
		let repo = &event.repository.name;
		let pull_number = event.pull_request.number;

		match event.action.as_str() {
			"opened" | "reopened" => {
				if config.event_policy.on_pull_request == EventAction::Ignore {
					return Ok(DispatchOutcome::skipped("pull request events are ignored"));
				}
				let request = DeployRequest {
					account: account.clone(),
					repo: repo.clone(),
					pull_number,
					revision: None,
				};
				self
					.deploy(&config, &request, &[], TriggerKind::PullRequest)
					.await
			}
			"closed" | "merged" => {
				let payloads: Vec<Payload> = resolve_delete_payloads(&config, repo, pull_number)
					.into_iter()
					.map(Payload::from)
					.collect();
				info!(
					pull_number,
					merged = event.pull_request.merged,
					components = payloads.len(),
					"Tearing down pull request environment"
				);
				let deployments = self.executor.execute(account, &payloads).await?;
				Ok(DispatchOutcome::Deleted(deployments))
			}
			other => Ok(DispatchOutcome::skipped(format!(
				"pull request action {other}"
			))),
		}
	}

	/// Refresh the account's configuration and make sure its sweeper runs.
	async fn prepare(&self, account: &Account) -> Option<Arc<AccountConfig>> {
		let config = self.cache.ensure_fresh(account).await;

		let job = Arc::new(StaleSweepJob::new(
			&account.owner,
			Arc::clone(&self.scm),
			Arc::clone(&self.cache),
			Arc::clone(&self.executor),
		));
		if self
			.scheduler
			.register_periodic(job, self.settings.sweep_interval)
			.await
		{
			info!(
				owner = %account.owner,
				interval_secs = self.settings.sweep_interval.as_secs(),
				"Stale sweep scheduled"
			);
		}

		config
	}

	async fn deploy_commit(
		&self,
		account: &Account,
		config: Option<Arc<AccountConfig>>,
		repo: &str,
		sha: &str,
	) -> Result<DispatchOutcome, DeployError> {
		let Some(config) = config else {
			return Ok(DispatchOutcome::skipped("account has no configuration"));
		};
		if config.event_policy.on_push == EventAction::Ignore {
			return Ok(DispatchOutcome::skipped("push events are ignored"));
		}

		let pulls = self.scm.pulls_for_commit(account, repo, sha).await?;
		let Some(pull) = pulls.iter().find(|p| p.is_open()) else {
			return Ok(DispatchOutcome::skipped(format!(
				"no open pull request for {sha}"
			)));
		};

		let request = DeployRequest {
			account: account.clone(),
			repo: repo.to_string(),
			pull_number: pull.number,
			revision: Some(sha.to_string()),
		};
		self.deploy(&config, &request, &[], TriggerKind::Push).await
	}

	async fn deploy(
		&self,
		config: &AccountConfig,
		request: &DeployRequest,
		overrides: &[ComponentOverride],
		trigger: TriggerKind,
	) -> Result<DispatchOutcome, DeployError> {
		let resolution =
			resolve_deploy_payloads(self.scm.as_ref(), config, request, overrides, trigger).await;
		if !resolution.failures.is_empty() {
			warn!(
				repo = %request.repo,
				pull_number = request.pull_number,
				trigger = %trigger,
				failed = resolution.failures.len(),
				resolved = resolution.payloads.len(),
				"Some components could not be resolved"
			);
		}

		let payloads: Vec<Payload> = resolution
			.payloads
			.into_iter()
			.map(Payload::from)
			.collect();
		let deployments = self.executor.execute(&request.account, &payloads).await?;
		Ok(DispatchOutcome::Deployed(deployments))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock::{pull_request, MockSourceControl, RecordedDeployment};
	use chrono::Utc;
	use infraway_jobs::JobHistory;
	use serde_json::json;

	const HEAD: &str = "1234567890abcdef1234567890abcdef12345678";

	const CONFIG: &str = r#"
domain: preview.example.com
deploy:
  - name: web
    components:
      - name: api
        chart: api
      - name: metrics
        chart: prometheus
        addon: true
"#;

	struct Harness {
		scm: Arc<MockSourceControl>,
		engine: DeployEngine,
	}

	impl Harness {
		fn new(scm: MockSourceControl) -> Self {
			let scm = Arc::new(scm);
			let scheduler = Arc::new(JobScheduler::new(Arc::new(JobHistory::default())));
			let engine = DeployEngine::new(scm.clone(), scheduler, DeploySettings::default());
			Self { scm, engine }
		}

		fn with_config(config: &str, scm: MockSourceControl) -> Self {
			Self::new(scm.with_file(".infraway", "config.yaml", config))
		}

		async fn deployments(&self) -> Vec<RecordedDeployment> {
			self.scm.deployments().await
		}

		async fn shutdown(self) {
			self.engine.scheduler().shutdown().await;
		}
	}

	fn repository() -> serde_json::Value {
		json!({ "name": "web", "owner": { "login": "acme" } })
	}

	fn comment(body: &str, url: &str) -> WebhookEvent {
		WebhookEvent::parse(
			"issue_comment",
			json!({
				"action": "created",
				"issue": { "number": 4, "html_url": url },
				"comment": { "body": body },
				"repository": repository(),
				"installation": { "id": 77 }
			})
			.to_string()
			.as_bytes(),
		)
		.unwrap()
		.unwrap()
	}

	fn push(sha: &str) -> WebhookEvent {
		WebhookEvent::parse(
			"push",
			json!({
				"after": sha,
				"head_commit": { "id": sha },
				"repository": repository(),
				"installation": { "id": 77 }
			})
			.to_string()
			.as_bytes(),
		)
		.unwrap()
		.unwrap()
	}

	fn pull_request_event(action: &str) -> WebhookEvent {
		WebhookEvent::parse(
			"pull_request",
			json!({
				"action": action,
				"number": 4,
				"pull_request": { "number": 4, "merged": false },
				"repository": repository(),
				"installation": { "id": 77 }
			})
			.to_string()
			.as_bytes(),
		)
		.unwrap()
		.unwrap()
	}

	fn status(state: &str, context: &str) -> WebhookEvent {
		WebhookEvent::parse(
			"status",
			json!({
				"sha": HEAD,
				"state": state,
				"context": context,
				"repository": repository(),
				"installation": { "id": 77 }
			})
			.to_string()
			.as_bytes(),
		)
		.unwrap()
		.unwrap()
	}

	fn open_pull() -> infraway_github::PullRequest {
		pull_request(4, HEAD, Utc::now())
	}

	#[test]
	fn unknown_events_are_not_parsed() {
		assert!(WebhookEvent::parse("star", b"{}").unwrap().is_none());
		assert!(WebhookEvent::parse("push", b"{}").is_err());
	}

	#[tokio::test]
	async fn comment_deploys_named_addon() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new().with_pull("web", open_pull()));

		let outcome = h
			.engine
			.handle(&comment("/deploy metrics:2.1", "https://github.com/acme/web/pull/4"))
			.await
			.unwrap();
		assert!(matches!(outcome, DispatchOutcome::Deployed(ref d) if d.len() == 1));

		let deployments = h.deployments().await;
		assert_eq!(deployments[0].installation_id, 77);
		assert_eq!(deployments[0].request.payload["component"], json!("metrics"));
		assert_eq!(deployments[0].request.payload["version"], json!("2.1"));
		assert_eq!(deployments[0].request.payload["addon"], json!(true));
		h.shutdown().await;
	}

	#[tokio::test]
	async fn bare_comment_deploys_non_addons_at_head() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new().with_pull("web", open_pull()));

		h.engine
			.handle(&comment("/deploy", "https://github.com/acme/web/pull/4"))
			.await
			.unwrap();

		let deployments = h.deployments().await;
		assert_eq!(deployments.len(), 1);
		assert_eq!(deployments[0].request.payload["component"], json!("api"));
		assert_eq!(deployments[0].request.payload["version"], json!("1234567"));
		assert_eq!(deployments[0].request.environment, "web-pull-4");
		h.shutdown().await;
	}

	#[tokio::test]
	async fn comment_on_issue_is_skipped_after_refresh() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new());

		let outcome = h
			.engine
			.handle(&comment("/deploy", "https://github.com/acme/web/issues/4"))
			.await
			.unwrap();

		assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
		assert!(h.deployments().await.is_empty());
		assert!(h.engine.cache().cached("acme").await.is_some());
		h.shutdown().await;
	}

	#[tokio::test]
	async fn plain_comment_touches_nothing() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new());

		let outcome = h
			.engine
			.handle(&comment("looks good", "https://github.com/acme/web/pull/4"))
			.await
			.unwrap();

		assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
		assert!(h.scm.calls().await.is_empty());
		h.shutdown().await;
	}

	#[tokio::test]
	async fn push_deploys_open_pull_with_pushed_sha() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new().with_pull("web", open_pull()));

		h.engine.handle(&push(HEAD)).await.unwrap();

		let deployments = h.deployments().await;
		assert_eq!(deployments.len(), 1);
		assert_eq!(deployments[0].request.payload["gitVersion"], json!(HEAD));
		h.shutdown().await;
	}

	#[tokio::test]
	async fn push_without_open_pull_is_skipped() {
		let mut closed = open_pull();
		closed.state = "closed".to_string();
		let h = Harness::with_config(CONFIG, MockSourceControl::new().with_pull("web", closed));

		let outcome = h.engine.handle(&push(HEAD)).await.unwrap();

		assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
		assert!(h.deployments().await.is_empty());
		h.shutdown().await;
	}

	#[tokio::test]
	async fn push_policy_ignore() {
		let config = format!("{CONFIG}events:\n  push: ignore\n");
		let h = Harness::with_config(&config, MockSourceControl::new().with_pull("web", open_pull()));

		let outcome = h.engine.handle(&push(HEAD)).await.unwrap();

		assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
		assert!(h.deployments().await.is_empty());
		h.shutdown().await;
	}

	#[tokio::test]
	async fn opened_pull_request_deploys() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new().with_pull("web", open_pull()));

		let outcome = h.engine.handle(&pull_request_event("reopened")).await.unwrap();

		assert!(matches!(outcome, DispatchOutcome::Deployed(_)));
		assert_eq!(h.deployments().await[0].request.task, "deploy");
		h.shutdown().await;
	}

	#[tokio::test]
	async fn pull_request_policy_ignore_still_deletes() {
		let config = format!("{CONFIG}events:\n  pull_request: ignore\n");
		let h = Harness::with_config(&config, MockSourceControl::new().with_pull("web", open_pull()));

		let opened = h.engine.handle(&pull_request_event("opened")).await.unwrap();
		assert!(matches!(opened, DispatchOutcome::Skipped(_)));

		let closed = h.engine.handle(&pull_request_event("closed")).await.unwrap();
		assert!(matches!(closed, DispatchOutcome::Deleted(ref d) if d.len() == 2));

		let tasks: Vec<_> = h
			.deployments()
			.await
			.into_iter()
			.map(|d| d.request.task)
			.collect();
		assert_eq!(tasks, vec!["delete", "delete"]);
		h.shutdown().await;
	}

	#[tokio::test]
	async fn other_pull_request_actions_are_skipped() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new());

		let outcome = h.engine.handle(&pull_request_event("labeled")).await.unwrap();

		assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
		h.shutdown().await;
	}

	#[tokio::test]
	async fn publish_status_deploys() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new().with_pull("web", open_pull()));

		let outcome = h.engine.handle(&status("success", "ci/publish-image")).await.unwrap();

		assert!(matches!(outcome, DispatchOutcome::Deployed(ref d) if d.len() == 1));
		h.shutdown().await;
	}

	#[tokio::test]
	async fn other_statuses_are_skipped() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new().with_pull("web", open_pull()));

		for event in [status("pending", "ci/publish"), status("success", "ci/test")] {
			let outcome = h.engine.handle(&event).await.unwrap();
			assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
		}
		assert!(h.deployments().await.is_empty());
		h.shutdown().await;
	}

	#[tokio::test]
	async fn every_event_registers_account_jobs_once() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new().with_pull("web", open_pull()));

		h.engine.handle(&pull_request_event("labeled")).await.unwrap();
		h.engine.handle(&push(HEAD)).await.unwrap();

		assert_eq!(
			h.engine.scheduler().job_ids().await,
			vec!["config-refresh:acme".to_string(), "stale-sweep:acme".to_string()]
		);
		h.shutdown().await;
	}

	#[tokio::test]
	async fn missing_installation_is_an_error() {
		let h = Harness::with_config(CONFIG, MockSourceControl::new());
		let event = WebhookEvent::parse(
			"status",
			json!({ "sha": HEAD, "state": "success", "context": "publish", "repository": repository() })
				.to_string()
				.as_bytes(),
		)
		.unwrap()
		.unwrap();

		let err = h.engine.handle(&event).await.unwrap_err();
		assert!(matches!(err, DeployError::MissingInstallation));
		h.shutdown().await;
	}

	#[tokio::test]
	async fn executor_failure_propagates() {
		let h = Harness::with_config(
			CONFIG,
			MockSourceControl::new()
				.with_pull("web", open_pull())
				.with_failing_environment("web-pull-4"),
		);

		let err = h.engine.handle(&push(HEAD)).await.unwrap_err();
		assert!(matches!(err, DeployError::Scm(_)));
		h.shutdown().await;
	}

	#[tokio::test]
	async fn missing_configuration_skips() {
		let h = Harness::new(MockSourceControl::new().with_pull("web", open_pull()));

		let outcome = h.engine.handle(&push(HEAD)).await.unwrap();
		assert!(matches!(outcome, DispatchOutcome::Skipped(_)));
		h.shutdown().await;
	}
}
