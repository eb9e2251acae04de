// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The source-control calls the engine depends on.

use async_trait::async_trait;
use infraway_github::{
	Deployment, DeploymentRequest, GithubAppClient, GithubAppError, PullRequest, Release, Tag,
};

use crate::account::Account;

#[async_trait]
pub trait SourceControl: Send + Sync {
	/// UTF-8 contents of `path` on the default branch of `repo`.
	async fn file_contents(
		&self,
		account: &Account,
		repo: &str,
		path: &str,
	) -> Result<String, GithubAppError>;

	async fn default_branch(&self, account: &Account, repo: &str) -> Result<String, GithubAppError>;

	async fn list_tags(
		&self,
		account: &Account,
		repo: &str,
		per_page: u32,
	) -> Result<Vec<Tag>, GithubAppError>;

	async fn latest_release(
		&self,
		account: &Account,
		repo: &str,
	) -> Result<Option<Release>, GithubAppError>;

	async fn pulls_for_commit(
		&self,
		account: &Account,
		repo: &str,
		sha: &str,
	) -> Result<Vec<PullRequest>, GithubAppError>;

	async fn get_pull(
		&self,
		account: &Account,
		repo: &str,
		number: u64,
	) -> Result<PullRequest, GithubAppError>;

	/// Open pull requests, least recently updated first.
	async fn list_open_pulls(
		&self,
		account: &Account,
		repo: &str,
	) -> Result<Vec<PullRequest>, GithubAppError>;

	async fn create_deployment(
		&self,
		account: &Account,
		repo: &str,
		request: &DeploymentRequest,
	) -> Result<Deployment, GithubAppError>;
}

#[async_trait]
impl SourceControl for GithubAppClient {
	async fn file_contents(
		&self,
		account: &Account,
		repo: &str,
		path: &str,
	) -> Result<String, GithubAppError> {
		self
			.get_file_contents(account.installation_id, &account.owner, repo, path, None)
			.await?
			.decode_utf8()
	}

	async fn default_branch(&self, account: &Account, repo: &str) -> Result<String, GithubAppError> {
		let repository = self
			.get_repository(account.installation_id, &account.owner, repo)
			.await?;
		Ok(repository.default_branch)
	}

	async fn list_tags(
		&self,
		account: &Account,
		repo: &str,
		per_page: u32,
	) -> Result<Vec<Tag>, GithubAppError> {
		GithubAppClient::list_tags(self, account.installation_id, &account.owner, repo, per_page)
			.await
	}

	async fn latest_release(
		&self,
		account: &Account,
		repo: &str,
	) -> Result<Option<Release>, GithubAppError> {
		GithubAppClient::latest_release(self, account.installation_id, &account.owner, repo).await
	}

	async fn pulls_for_commit(
		&self,
		account: &Account,
		repo: &str,
		sha: &str,
	) -> Result<Vec<PullRequest>, GithubAppError> {
		self
			.list_pulls_for_commit(account.installation_id, &account.owner, repo, sha)
			.await
	}

	async fn get_pull(
		&self,
		account: &Account,
		repo: &str,
		number: u64,
	) -> Result<PullRequest, GithubAppError> {
		GithubAppClient::get_pull(self, account.installation_id, &account.owner, repo, number).await
	}

	async fn list_open_pulls(
		&self,
		account: &Account,
		repo: &str,
	) -> Result<Vec<PullRequest>, GithubAppError> {
		GithubAppClient::list_open_pulls(self, account.installation_id, &account.owner, repo).await
	}

	async fn create_deployment(
		&self,
		account: &Account,
		repo: &str,
		request: &DeploymentRequest,
	) -> Result<Deployment, GithubAppError> {
		GithubAppClient::create_deployment(
			self,
			account.installation_id,
			&account.owner,
			repo,
			request,
		)
		.await
	}
}
