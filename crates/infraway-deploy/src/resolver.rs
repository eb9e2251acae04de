// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resolves an event into deploy or delete payloads.
//!
//! Planning (target lookup, filtering, chart inheritance, version choice) is
//! pure; only version resolution talks to source control.

use tracing::{debug, info, warn};

use crate::account::{Account, AccountConfig, DeployTarget, TriggerKind};
use crate::command::ComponentOverride;
use crate::error::DeployError;
use crate::payload::{slug, DeletePayload, DeployPayload, Environment};
use crate::scm::SourceControl;
use crate::version::{self, VersionContext, VersionToken};

/// The pull request a resolution is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
	pub account: Account,
	pub repo: String,
	pub pull_number: u64,
	/// Commit from a push or status event. `None` means the pull's head.
	pub revision: Option<String>,
}

/// A component that survived planning, before version resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedComponent {
	pub name: String,
	pub chart: String,
	pub version: Option<String>,
	pub is_addon: bool,
	pub values_ref: String,
	pub release_repo: String,
}

#[derive(Debug)]
pub struct ComponentFailure {
	pub component: String,
	pub error: DeployError,
}

#[derive(Debug, Default)]
pub struct DeployResolution {
	pub payloads: Vec<DeployPayload>,
	pub failures: Vec<ComponentFailure>,
}

/// Components of `target` to deploy, in declaration order.
///
/// Without overrides every non-addon component is kept. With overrides only
/// the named ones are, and addons only when a comment asked for them.
pub fn plan_components(
	target: &DeployTarget,
	overrides: &[ComponentOverride],
	trigger: TriggerKind,
) -> Vec<PlannedComponent> {
	target
		.components
		.iter()
		.filter_map(|component| {
			let requested = overrides.iter().find(|o| o.component == component.name);
			let eligible = if overrides.is_empty() {
				!component.is_addon
			} else {
				requested.is_some() && (!component.is_addon || trigger == TriggerKind::Comment)
			};
			if !eligible {
				return None;
			}

			let Some(chart) = target.effective_chart(component) else {
				debug!(component = %component.name, "Component has no chart, skipping");
				return None;
			};

			let version = requested
				.and_then(|o| o.version.clone())
				.or_else(|| component.version.clone());

			Some(PlannedComponent {
				name: component.name.clone(),
				chart: chart.to_string(),
				version,
				is_addon: component.is_addon,
				values_ref: component
					.values_override
					.clone()
					.unwrap_or_else(|| component.name.clone()),
				release_repo: component
					.repository
					.clone()
					.unwrap_or_else(|| component.name.clone()),
			})
		})
		.collect()
}

pub async fn resolve_deploy_payloads(
	scm: &dyn SourceControl,
	config: &AccountConfig,
	request: &DeployRequest,
	overrides: &[ComponentOverride],
	trigger: TriggerKind,
) -> DeployResolution {
	let Some(target) = config.target(&request.repo) else {
		info!(repo = %request.repo, "No deploy target for repository");
		return DeployResolution::default();
	};

	let environment = Environment::for_pull(&request.repo, request.pull_number, &config.domain);
	let mut resolution = DeployResolution::default();

	for planned in plan_components(target, overrides, trigger) {
		let token = VersionToken::parse(planned.version.as_deref());
		let ctx = VersionContext {
			account: &request.account,
			component: &planned.name,
			repo: &request.repo,
			pull_number: request.pull_number,
			revision: request.revision.as_deref(),
			release_repo: &planned.release_repo,
		};

		match version::resolve(scm, &token, &ctx).await {
			Ok(resolved) => resolution.payloads.push(DeployPayload {
				repo: request.repo.clone(),
				component: slug(&planned.name),
				description: format!(
					"Deploy {} for {}/pull/{}",
					planned.chart, request.repo, request.pull_number
				),
				chart: planned.chart,
				version: resolved.version,
				source_revision: resolved.source_revision,
				domain_name: environment.domain.clone(),
				environment_name: environment.name.clone(),
				is_addon: planned.is_addon,
				values_ref: planned.values_ref,
			}),
			Err(error) => {
				warn!(component = %planned.name, error = %error, "Skipping component");
				resolution.failures.push(ComponentFailure {
					component: planned.name,
					error,
				});
			}
		}
	}

	resolution
}

/// One delete per declared component of the repository's target.
pub fn resolve_delete_payloads(
	config: &AccountConfig,
	repo: &str,
	pull_number: u64,
) -> Vec<DeletePayload> {
	let Some(target) = config.target(repo) else {
		info!(repo, "No deploy target for repository");
		return Vec::new();
	};

	let environment = Environment::for_pull(repo, pull_number, &config.domain);
	target
		.components
		.iter()
		.map(|component| DeletePayload {
			repo: repo.to_string(),
			component: slug(&component.name),
			domain_name: environment.domain.clone(),
			environment_name: environment.name.clone(),
			description: format!("Delete {} for {repo}/pull/{pull_number}", component.name),
		})
		.collect()
}
