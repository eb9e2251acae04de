// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deploy and delete payloads, and the environment naming they share.
//!
//! The serialized form is the `payload` field of a GitHub deployment and is
//! read by the chart deployer, so its keys are fixed.

use serde::Serialize;

/// Replace every `.` with `-`.
pub fn slug(name: &str) -> String {
	name.replace('.', "-")
}

/// Environment and host name for one pull request of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
	pub name: String,
	pub domain: String,
}

impl Environment {
	pub fn for_pull(repo: &str, pull_number: u64, domain: &str) -> Self {
		let name = format!("{}-pull-{pull_number}", slug(repo));
		let domain = format!("{name}.{domain}");
		Self { name, domain }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployPayload {
	pub repo: String,
	pub component: String,
	pub chart: String,
	pub version: String,
	#[serde(rename = "gitVersion", skip_serializing_if = "Option::is_none")]
	pub source_revision: Option<String>,
	#[serde(rename = "domain")]
	pub domain_name: String,
	#[serde(rename = "environment")]
	pub environment_name: String,
	#[serde(rename = "addon")]
	pub is_addon: bool,
	#[serde(rename = "values")]
	pub values_ref: String,
	#[serde(skip)]
	pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletePayload {
	pub repo: String,
	pub component: String,
	#[serde(rename = "domain")]
	pub domain_name: String,
	#[serde(rename = "environment")]
	pub environment_name: String,
	#[serde(skip)]
	pub description: String,
}

/// Serializes with an `action` key of `deploy` or `delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Payload {
	Deploy(DeployPayload),
	Delete(DeletePayload),
}

impl Payload {
	/// Deployment task name.
	pub fn action(&self) -> &'static str {
		match self {
			Payload::Deploy(_) => "deploy",
			Payload::Delete(_) => "delete",
		}
	}

	pub fn environment_name(&self) -> &str {
		match self {
			Payload::Deploy(p) => &p.environment_name,
			Payload::Delete(p) => &p.environment_name,
		}
	}

	pub fn description(&self) -> &str {
		match self {
			Payload::Deploy(p) => &p.description,
			Payload::Delete(p) => &p.description,
		}
	}

	pub fn component(&self) -> &str {
		match self {
			Payload::Deploy(p) => &p.component,
			Payload::Delete(p) => &p.component,
		}
	}
}

impl From<DeployPayload> for Payload {
	fn from(payload: DeployPayload) -> Self {
		Payload::Deploy(payload)
	}
}

impl From<DeletePayload> for Payload {
	fn from(payload: DeletePayload) -> Self {
		Payload::Delete(payload)
	}
}
