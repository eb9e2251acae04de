// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use infraway_github::GithubAppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
	#[error("source control error: {0}")]
	Scm(#[from] GithubAppError),

	/// The commit, release or tag a component's version depends on could
	/// not be found. Only that component is skipped.
	#[error("revision unavailable for component {component}: {reason}")]
	RevisionUnavailable { component: String, reason: String },

	#[error("invalid account configuration: {0}")]
	InvalidConfig(String),

	#[error("failed to encode deployment payload: {0}")]
	Payload(#[from] serde_json::Error),

	#[error("event has no installation id")]
	MissingInstallation,
}

impl DeployError {
	pub fn revision_unavailable(component: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::RevisionUnavailable {
			component: component.into(),
			reason: reason.into(),
		}
	}
}

pub type Result<T> = std::result::Result<T, DeployError>;
