// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Webhook payloads for the events infraway reacts to.
//!
//! Each event is parsed from the raw body once the signature has been
//! verified. Unknown fields are ignored.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstallationRef {
	pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Owner {
	pub login: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventRepository {
	pub name: String,
	pub owner: Owner,
}

/// Marker GitHub attaches to issues that are pull requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestLink {
	#[serde(default)]
	pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
	pub number: u64,
	#[serde(default)]
	pub html_url: String,
	#[serde(default)]
	pub pull_request: Option<PullRequestLink>,
}

impl Issue {
	/// Comments on pull requests arrive as issue comments.
	pub fn is_pull_request(&self) -> bool {
		self.pull_request.is_some() || self.html_url.contains("/pull/")
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
	#[serde(default)]
	pub body: String,
}

/// `issue_comment`
#[derive(Debug, Clone, Deserialize)]
pub struct IssueCommentEvent {
	pub action: String,
	pub issue: Issue,
	pub comment: Comment,
	pub repository: EventRepository,
	pub installation: Option<InstallationRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeadCommit {
	pub id: String,
}

/// `push`
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
	/// SHA the ref points at after the push.
	pub after: String,
	#[serde(default)]
	pub head_commit: Option<HeadCommit>,
	pub repository: EventRepository,
	pub installation: Option<InstallationRef>,
}

impl PushEvent {
	pub fn head_sha(&self) -> &str {
		self
			.head_commit
			.as_ref()
			.map(|c| c.id.as_str())
			.unwrap_or(&self.after)
	}

	/// Branch deletions push the all-zero SHA.
	pub fn is_deletion(&self) -> bool {
		self.head_commit.is_none() && self.after.chars().all(|c| c == '0')
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventPullRequest {
	pub number: u64,
	#[serde(default)]
	pub merged: bool,
}

/// `pull_request`
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
	pub action: String,
	pub number: u64,
	pub pull_request: EventPullRequest,
	pub repository: EventRepository,
	pub installation: Option<InstallationRef>,
}

/// `status`
#[derive(Debug, Clone, Deserialize)]
pub struct StatusEvent {
	pub sha: String,
	pub state: String,
	#[serde(default)]
	pub context: String,
	pub repository: EventRepository,
	pub installation: Option<InstallationRef>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn repository() -> serde_json::Value {
		json!({ "name": "web", "full_name": "acme/web", "owner": { "login": "acme", "id": 1 } })
	}

	#[test]
	fn issue_comment_on_pull_request() {
		let event: IssueCommentEvent = serde_json::from_value(json!({
			"action": "created",
			"issue": {
				"number": 7,
				"html_url": "https://github.com/acme/web/pull/7",
				"pull_request": { "url": "https://api.github.com/repos/acme/web/pulls/7" }
			},
			"comment": { "body": "/deploy api:release" },
			"repository": repository(),
			"installation": { "id": 99 }
		}))
		.unwrap();

		assert!(event.issue.is_pull_request());
		assert_eq!(event.repository.owner.login, "acme");
		assert_eq!(event.installation, Some(InstallationRef { id: 99 }));
	}

	#[test]
	fn plain_issue_is_not_a_pull_request() {
		let issue: Issue = serde_json::from_value(json!({
			"number": 3,
			"html_url": "https://github.com/acme/web/issues/3"
		}))
		.unwrap();
		assert!(!issue.is_pull_request());
	}

	#[test]
	fn push_prefers_head_commit() {
		let event: PushEvent = serde_json::from_value(json!({
			"after": "1111111111111111111111111111111111111111",
			"head_commit": { "id": "2222222222222222222222222222222222222222" },
			"repository": repository()
		}))
		.unwrap();

		assert_eq!(event.head_sha(), "2222222222222222222222222222222222222222");
		assert!(!event.is_deletion());
		assert!(event.installation.is_none());
	}

	#[test]
	fn branch_deletion_push() {
		let event: PushEvent = serde_json::from_value(json!({
			"after": "0000000000000000000000000000000000000000",
			"head_commit": null,
			"repository": repository()
		}))
		.unwrap();

		assert!(event.is_deletion());
	}

	#[test]
	fn closed_pull_request_reports_merge() {
		let event: PullRequestEvent = serde_json::from_value(json!({
			"action": "closed",
			"number": 5,
			"pull_request": { "number": 5, "merged": true },
			"repository": repository(),
			"installation": { "id": 1 }
		}))
		.unwrap();

		assert!(event.pull_request.merged);
	}
}
