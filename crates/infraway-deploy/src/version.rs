// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns a symbolic version such as `commit` or `release` into the
//! concrete version a chart is deployed with.

use tracing::debug;

use crate::account::Account;
use crate::error::DeployError;
use crate::scm::SourceControl;

/// Tags listed when matching a revision to a tag.
pub const TAG_LOOKUP_LIMIT: u32 = 200;

const SHORT_SHA_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionToken {
	/// The pull request's head commit, or the pushed commit.
	Commit,
	/// The most recent release.
	Release,
	/// The tag pointing at the commit.
	Tag,
	Explicit(String),
}

impl VersionToken {
	/// Absent and empty versions mean `commit`.
	pub fn parse(raw: Option<&str>) -> Self {
		match raw.map(str::trim) {
			None | Some("") => VersionToken::Commit,
			Some(v) if v.eq_ignore_ascii_case("commit") => VersionToken::Commit,
			Some(v) if v.eq_ignore_ascii_case("release") => VersionToken::Release,
			Some(v) if v.eq_ignore_ascii_case("tag") => VersionToken::Tag,
			Some(v) => VersionToken::Explicit(v.to_string()),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
	pub version: String,
	/// Full SHA, release tag or `None` for explicit versions.
	pub source_revision: Option<String>,
}

/// Everything the resolver needs to know about one component's deploy.
#[derive(Debug, Clone, Copy)]
pub struct VersionContext<'a> {
	pub account: &'a Account,
	pub component: &'a str,
	/// Repository the pull request belongs to.
	pub repo: &'a str,
	pub pull_number: u64,
	/// SHA carried by the event, if any.
	pub revision: Option<&'a str>,
	/// Repository whose releases back [`VersionToken::Release`].
	pub release_repo: &'a str,
}

pub async fn resolve(
	scm: &dyn SourceControl,
	token: &VersionToken,
	ctx: &VersionContext<'_>,
) -> Result<ResolvedVersion, DeployError> {
	match token {
		VersionToken::Commit => {
			let revision = revision(scm, ctx).await?;
			Ok(ResolvedVersion {
				version: revision.chars().take(SHORT_SHA_LEN).collect(),
				source_revision: Some(revision),
			})
		}
		VersionToken::Release => {
			let release = scm
				.latest_release(ctx.account, ctx.release_repo)
				.await
				.map_err(|e| DeployError::revision_unavailable(ctx.component, e.to_string()))?
				.ok_or_else(|| {
					DeployError::revision_unavailable(
						ctx.component,
						format!("{} has no release", ctx.release_repo),
					)
				})?;
			debug!(component = ctx.component, tag = %release.tag_name, "Resolved release version");
			Ok(ResolvedVersion {
				version: release.tag_name.clone(),
				source_revision: Some(release.tag_name),
			})
		}
		VersionToken::Tag => {
			let revision = revision(scm, ctx).await?;
			let tags = scm
				.list_tags(ctx.account, ctx.repo, TAG_LOOKUP_LIMIT)
				.await
				.map_err(|e| DeployError::revision_unavailable(ctx.component, e.to_string()))?;
			let tag = tags
				.into_iter()
				.find(|t| t.commit.sha == revision)
				.ok_or_else(|| {
					DeployError::revision_unavailable(
						ctx.component,
						format!("no tag in {} points at {revision}", ctx.repo),
					)
				})?;
			Ok(ResolvedVersion {
				version: tag.name,
				source_revision: Some(revision),
			})
		}
		VersionToken::Explicit(version) => Ok(ResolvedVersion {
			version: version.clone(),
			source_revision: None,
		}),
	}
}

/// The event's SHA, or the pull request's current head.
async fn revision(scm: &dyn SourceControl, ctx: &VersionContext<'_>) -> Result<String, DeployError> {
	if let Some(sha) = ctx.revision.filter(|s| !s.is_empty()) {
		return Ok(sha.to_string());
	}

	let pull = scm
		.get_pull(ctx.account, ctx.repo, ctx.pull_number)
		.await
		.map_err(|e| DeployError::revision_unavailable(ctx.component, e.to_string()))?;
	if pull.head.sha.is_empty() {
		return Err(DeployError::revision_unavailable(
			ctx.component,
			format!("{}#{} has no head commit", ctx.repo, ctx.pull_number),
		));
	}
	Ok(pull.head.sha)
}
