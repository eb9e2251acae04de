// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router.

use std::sync::Arc;
use std::time::Duration;

use axum::{
	routing::{get, post},
	Router,
};
use infraway_common_config::SecretString;
use infraway_deploy::{ConfigLocation, DeployEngine, DeploySettings, SourceControl};
use infraway_github::GithubAppConfig;
use infraway_jobs::{JobHistory, JobScheduler};
use infraway_server_config::{DeployConfig, GitHubAppConfig, ServerConfig};
use tower_http::trace::TraceLayer;

use crate::routes;

#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<DeployEngine>,
	/// Signature checks are skipped when unset.
	pub webhook_secret: Option<SecretString>,
}

impl AppState {
	pub fn new(engine: Arc<DeployEngine>, webhook_secret: Option<SecretString>) -> Self {
		Self {
			engine,
			webhook_secret,
		}
	}

	pub fn scheduler(&self) -> &Arc<JobScheduler> {
		self.engine.scheduler()
	}
}

/// Build the engine and its scheduler around `scm`.
pub fn create_app_state(config: &ServerConfig, scm: Arc<dyn SourceControl>) -> AppState {
	let scheduler = Arc::new(JobScheduler::new(Arc::new(JobHistory::default())));
	let engine = DeployEngine::new(scm, scheduler, deploy_settings(&config.deploy));
	let webhook_secret = config
		.github_app
		.as_ref()
		.and_then(|app| app.webhook_secret().cloned());

	if webhook_secret.is_none() {
		tracing::warn!("No webhook secret configured, signatures will not be verified");
	}

	AppState::new(Arc::new(engine), webhook_secret)
}

pub fn deploy_settings(config: &DeployConfig) -> DeploySettings {
	DeploySettings {
		chart_repo: config.chart_repo.clone(),
		chart_ref: config.chart_ref.clone(),
		config_sources: config
			.config_sources
			.iter()
			.map(|source| ConfigLocation::new(&source.repository, &source.path))
			.collect(),
		refresh_interval: config.refresh_interval,
		sweep_interval: config.sweep_interval,
		publish_context_marker: config.publish_context_marker.clone(),
	}
}

pub fn github_client_config(config: &GitHubAppConfig) -> GithubAppConfig {
	let mut client_config =
		GithubAppConfig::new(config.app_id(), config.private_key_pem().expose().clone())
			.with_base_url(config.base_url());
	if let Some(secret) = config.webhook_secret() {
		client_config = client_config.with_webhook_secret(secret.expose().clone());
	}
	if let Some(secs) = config.request_timeout_secs() {
		client_config = client_config.with_request_timeout(Duration::from_secs(secs));
	}
	client_config
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/api/github/webhooks", post(routes::webhooks::github_webhook))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}
