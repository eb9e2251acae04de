// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Submits payloads as GitHub deployments on the chart repository.

use std::sync::Arc;

use infraway_github::{Deployment, DeploymentRequest};
use tracing::{info, instrument};

use crate::account::Account;
use crate::error::DeployError;
use crate::payload::Payload;
use crate::scm::SourceControl;

pub struct DeploymentExecutor {
	scm: Arc<dyn SourceControl>,
	chart_repo: String,
	chart_ref: Option<String>,
}

impl DeploymentExecutor {
	pub fn new(scm: Arc<dyn SourceControl>, chart_repo: String, chart_ref: Option<String>) -> Self {
		Self {
			scm,
			chart_repo,
			chart_ref,
		}
	}

	pub fn chart_repo(&self) -> &str {
		&self.chart_repo
	}

	/// Submit `payloads` one at a time, in order. The first failure stops the
	/// batch; deployments already created stay in place.
	#[instrument(skip(self, payloads), fields(owner = %account.owner, count = payloads.len()))]
	pub async fn execute(
		&self,
		account: &Account,
		payloads: &[Payload],
	) -> Result<Vec<Deployment>, DeployError> {
		if payloads.is_empty() {
			return Ok(Vec::new());
		}

		let git_ref = match &self.chart_ref {
			Some(git_ref) => git_ref.clone(),
			None => self.scm.default_branch(account, &self.chart_repo).await?,
		};

		let mut deployments = Vec::with_capacity(payloads.len());
		for payload in payloads {
			let request = DeploymentRequest {
				git_ref: git_ref.clone(),
				task: payload.action().to_string(),
				auto_merge: false,
				required_contexts: Vec::new(),
				payload: serde_json::to_value(payload)?,
				environment: payload.environment_name().to_string(),
				description: payload.description().to_string(),
				transient_environment: true,
				production_environment: false,
			};

			let deployment = self
				.scm
				.create_deployment(account, &self.chart_repo, &request)
				.await?;
			info!(
				deployment_id = deployment.id,
				task = payload.action(),
				component = payload.component(),
				environment = payload.environment_name(),
				"Created deployment"
			);
			deployments.push(deployment);
		}

		Ok(deployments)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::mock::{DeploymentEvent, MockSourceControl, ScmCall};
	use crate::payload::{DeletePayload, DeployPayload};
	use serde_json::json;
	use std::time::Duration;

	fn deploy(component: &str, environment: &str) -> Payload {
		Payload::Deploy(DeployPayload {
			repo: "web".to_string(),
			component: component.to_string(),
			chart: component.to_string(),
			version: "abc1234".to_string(),
			source_revision: Some("abc1234ffff".to_string()),
			domain_name: format!("{environment}.example.com"),
			environment_name: environment.to_string(),
			is_addon: false,
			values_ref: component.to_string(),
			description: format!("Deploy {component} for web/pull/1"),
		})
	}

	fn delete(component: &str) -> Payload {
		Payload::Delete(DeletePayload {
			repo: "web".to_string(),
			component: component.to_string(),
			domain_name: "web-pull-1.example.com".to_string(),
			environment_name: "web-pull-1".to_string(),
			description: format!("Delete {component} for web/pull/1"),
		})
	}

	fn account() -> Account {
		Account::new("acme", 3)
	}

	#[tokio::test]
	async fn submits_in_order_with_fixed_request_fields() {
		let scm = Arc::new(MockSourceControl::new().with_default_branch("charts", "master"));
		let executor = DeploymentExecutor::new(scm.clone(), "charts".to_string(), None);

		let payloads = vec![deploy("api", "web-pull-1"), deploy("worker", "web-pull-1")];
		let deployments = executor.execute(&account(), &payloads).await.unwrap();
		assert_eq!(deployments.len(), 2);

		let recorded = scm.deployments().await;
		let components: Vec<_> = recorded
			.iter()
			.map(|d| d.request.payload["component"].as_str().unwrap().to_string())
			.collect();
		assert_eq!(components, vec!["api", "worker"]);

		let first = &recorded[0];
		assert_eq!(first.owner, "acme");
		assert_eq!(first.installation_id, 3);
		assert_eq!(first.repo, "charts");
		assert_eq!(first.request.git_ref, "master");
		assert_eq!(first.request.task, "deploy");
		assert!(!first.request.auto_merge);
		assert!(first.request.required_contexts.is_empty());
		assert!(first.request.transient_environment);
		assert!(!first.request.production_environment);
		assert_eq!(first.request.environment, "web-pull-1");
		assert_eq!(first.request.description, "Deploy api for web/pull/1");
		assert_eq!(first.request.payload["action"], json!("deploy"));
	}

	#[tokio::test(start_paused = true)]
	async fn each_submission_completes_before_the_next_starts() {
		let scm = Arc::new(
			MockSourceControl::new().with_deployment_delay(Duration::from_millis(250)),
		);
		let executor = DeploymentExecutor::new(scm.clone(), "charts".to_string(), None);

		let payloads = vec![
			deploy("api", "web-pull-1"),
			deploy("api", "web-pull-2"),
			deploy("api", "web-pull-3"),
		];
		executor.execute(&account(), &payloads).await.unwrap();

		assert_eq!(scm.max_in_flight(), 1);
		let started = |env: &str| DeploymentEvent::Started(env.to_string());
		let finished = |env: &str| DeploymentEvent::Finished(env.to_string());
		assert_eq!(
			scm.deployment_log().await,
			vec![
				started("web-pull-1"),
				finished("web-pull-1"),
				started("web-pull-2"),
				finished("web-pull-2"),
				started("web-pull-3"),
				finished("web-pull-3"),
			]
		);
	}

	#[tokio::test]
	async fn default_branch_is_looked_up_once_per_batch() {
		let scm = Arc::new(MockSourceControl::new());
		let executor = DeploymentExecutor::new(scm.clone(), "charts".to_string(), None);

		executor
			.execute(&account(), &[delete("api"), delete("worker")])
			.await
			.unwrap();

		let branch_lookups = scm
			.calls()
			.await
			.into_iter()
			.filter(|c| matches!(c, ScmCall::DefaultBranch { .. }))
			.count();
		assert_eq!(branch_lookups, 1);
		assert!(scm
			.deployments()
			.await
			.iter()
			.all(|d| d.request.task == "delete" && d.request.git_ref == "main"));
	}

	#[tokio::test]
	async fn configured_ref_skips_lookup() {
		let scm = Arc::new(MockSourceControl::new());
		let executor =
			DeploymentExecutor::new(scm.clone(), "helm".to_string(), Some("release".to_string()));

		executor.execute(&account(), &[delete("api")]).await.unwrap();

		assert_eq!(
			scm.calls().await,
			vec![ScmCall::CreateDeployment {
				repo: "helm".to_string(),
				environment: "web-pull-1".to_string()
			}]
		);
		assert_eq!(scm.deployments().await[0].request.git_ref, "release");
	}

	#[tokio::test]
	async fn first_failure_aborts_the_batch() {
		let scm = Arc::new(MockSourceControl::new().with_failing_environment("web-pull-2"));
		let executor = DeploymentExecutor::new(scm.clone(), "charts".to_string(), None);

		let payloads = vec![
			deploy("api", "web-pull-1"),
			deploy("api", "web-pull-2"),
			deploy("api", "web-pull-3"),
		];
		let err = executor.execute(&account(), &payloads).await.unwrap_err();

		assert!(matches!(err, DeployError::Scm(_)));
		let environments: Vec<_> = scm
			.deployments()
			.await
			.into_iter()
			.map(|d| d.request.environment)
			.collect();
		assert_eq!(environments, vec!["web-pull-1"]);
	}

	#[tokio::test]
	async fn empty_batch_makes_no_calls() {
		let scm = Arc::new(MockSourceControl::new());
		let executor = DeploymentExecutor::new(scm.clone(), "charts".to_string(), None);

		assert!(executor.execute(&account(), &[]).await.unwrap().is_empty());
		assert!(scm.calls().await.is_empty());
	}
}
