// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request and response types for the GitHub REST calls infraway makes.
//!
//! Only the fields infraway reads are modelled; serde ignores the rest.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GithubAppError;

#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
	pub token: String,
	pub expires_at: String,
}

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
	pub id: i64,
	pub name: String,
	pub full_name: String,
	pub default_branch: String,
	#[serde(default)]
	pub private: bool,
}

/// A single file returned by the contents API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContents {
	pub name: String,
	pub path: String,
	pub sha: String,
	#[serde(default)]
	pub size: u64,
	#[serde(default = "default_encoding")]
	pub encoding: String,
	/// Base64 with embedded newlines, exactly as GitHub sends it.
	#[serde(default)]
	pub content: String,
}

fn default_encoding() -> String {
	"base64".to_string()
}

impl FileContents {
	/// Decode the file body.
	pub fn decode(&self) -> Result<Vec<u8>, GithubAppError> {
		if self.encoding != "base64" {
			return Err(GithubAppError::InvalidResponse(format!(
				"unsupported content encoding '{}' for {}",
				self.encoding, self.path
			)));
		}

		let compact: String = self
			.content
			.chars()
			.filter(|c| !c.is_ascii_whitespace())
			.collect();

		base64::engine::general_purpose::STANDARD
			.decode(compact)
			.map_err(|e| GithubAppError::InvalidResponse(format!("invalid base64 in {}: {e}", self.path)))
	}

	/// Decode the file body as UTF-8 text.
	pub fn decode_utf8(&self) -> Result<String, GithubAppError> {
		String::from_utf8(self.decode()?)
			.map_err(|e| GithubAppError::InvalidResponse(format!("{} is not UTF-8: {e}", self.path)))
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCommit {
	pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
	pub name: String,
	pub commit: TagCommit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
	pub id: i64,
	pub tag_name: String,
	#[serde(default)]
	pub draft: bool,
	#[serde(default)]
	pub prerelease: bool,
	pub published_at: Option<DateTime<Utc>>,
}

/// The `head`/`base` side of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
	pub sha: String,
	#[serde(rename = "ref")]
	pub git_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
	pub number: u64,
	pub state: String,
	pub updated_at: DateTime<Utc>,
	pub head: PullRequestRef,
	#[serde(default)]
	pub html_url: String,
}

impl PullRequest {
	pub fn is_open(&self) -> bool {
		self.state == "open"
	}
}

/// Body of `POST /repos/{owner}/{repo}/deployments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRequest {
	#[serde(rename = "ref")]
	pub git_ref: String,
	pub task: String,
	pub auto_merge: bool,
	pub required_contexts: Vec<String>,
	pub payload: serde_json::Value,
	pub environment: String,
	pub description: String,
	pub transient_environment: bool,
	pub production_environment: bool,
}

/// A created deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
	pub id: i64,
	#[serde(default)]
	pub sha: String,
	#[serde(rename = "ref", default)]
	pub git_ref: String,
	pub task: String,
	pub environment: String,
	#[serde(default)]
	pub description: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn contents(content: &str) -> FileContents {
		FileContents {
			name: "config.yaml".to_string(),
			path: ".infraway/config.yaml".to_string(),
			sha: "abc".to_string(),
			size: 0,
			encoding: "base64".to_string(),
			content: content.to_string(),
		}
	}

	#[test]
	fn decodes_line_wrapped_base64() {
		// "domain: example.dev\n" split the way GitHub wraps it
		let file = contents("ZG9tYWluOiBl\neGFtcGxlLmRl\ndgo=\n");
		assert_eq!(file.decode_utf8().unwrap(), "domain: example.dev\n");
	}

	#[test]
	fn rejects_unknown_encoding() {
		let mut file = contents("");
		file.encoding = "none".to_string();
		assert!(matches!(
			file.decode(),
			Err(GithubAppError::InvalidResponse(_))
		));
	}

	#[test]
	fn rejects_invalid_base64() {
		assert!(contents("!!!").decode().is_err());
	}

	#[test]
	fn pull_request_parses_github_shape() {
		let pr: PullRequest = serde_json::from_value(json!({
			"number": 12,
			"state": "open",
			"updated_at": "2024-03-01T10:00:00Z",
			"head": { "sha": "deadbeefcafe", "ref": "feature/x", "label": "acme:feature/x" },
			"html_url": "https://github.com/acme/web/pull/12",
			"title": "ignored"
		}))
		.unwrap();

		assert_eq!(pr.number, 12);
		assert!(pr.is_open());
		assert_eq!(pr.head.git_ref, "feature/x");
	}

	#[test]
	fn deployment_request_uses_github_field_names() {
		let request = DeploymentRequest {
			git_ref: "main".to_string(),
			task: "deploy".to_string(),
			auto_merge: false,
			required_contexts: vec![],
			payload: json!({ "action": "deploy" }),
			environment: "web-pull-1".to_string(),
			description: "Deploy web for web/pull/1".to_string(),
			transient_environment: true,
			production_environment: false,
		};

		let value = serde_json::to_value(&request).unwrap();
		assert_eq!(value["ref"], "main");
		assert_eq!(value["required_contexts"], json!([]));
		assert_eq!(value["transient_environment"], true);
		assert!(value.get("git_ref").is_none());
	}
}
