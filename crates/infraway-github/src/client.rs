// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub App client with JWT authentication and installation token caching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use infraway_common_http::{retry, RetryConfig};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::GithubAppConfig;
use crate::error::GithubAppError;
use crate::jwt::{generate_app_jwt, JWT_VALIDITY};
use crate::types::{
	AccessTokenResponse, Deployment, DeploymentRequest, FileContents, PullRequest, Release,
	Repository, Tag,
};

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(120);
const JWT_REFRESH_MARGIN: Duration = Duration::from_secs(30);
const API_VERSION: &str = "2022-11-28";

/// Largest page GitHub serves for list endpoints.
pub const MAX_PER_PAGE: u32 = 100;

struct CachedToken {
	token: String,
	expires_at: Instant,
}

impl CachedToken {
	fn new(token: String, valid_for: Duration) -> Self {
		Self {
			token,
			expires_at: Instant::now() + valid_for,
		}
	}

	fn is_valid(&self, margin: Duration) -> bool {
		Instant::now() + margin < self.expires_at
	}
}

/// Client for the GitHub REST API, authenticated as a GitHub App.
///
/// Every repository call takes the installation id it should act through.
/// Installation tokens are cached per installation and refreshed once when
/// GitHub answers 401. Transient failures go through the shared retry policy.
#[derive(Clone)]
pub struct GithubAppClient {
	http_client: Client,
	config: GithubAppConfig,
	app_jwt_cache: Arc<Mutex<Option<CachedToken>>>,
	installation_token_cache: Arc<Mutex<HashMap<i64, CachedToken>>>,
	/// Serializes JWT signing.
	app_jwt_lock: Arc<Mutex<()>>,
	/// Serializes token fetches per installation.
	installation_locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl std::fmt::Debug for GithubAppClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GithubAppClient")
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

impl GithubAppClient {
	pub fn new(config: GithubAppConfig) -> Result<Self, GithubAppError> {
		let http_client = infraway_common_http::builder()
			.timeout(config.request_timeout())
			.build()
			.map_err(|e| GithubAppError::Config(format!("Failed to create HTTP client: {e}")))?;

		info!(
			app_id = config.app_id(),
			base_url = %config.base_url(),
			"Created GitHub App client"
		);

		Ok(Self {
			http_client,
			config,
			app_jwt_cache: Arc::new(Mutex::new(None)),
			installation_token_cache: Arc::new(Mutex::new(HashMap::new())),
			app_jwt_lock: Arc::new(Mutex::new(())),
			installation_locks: Arc::new(Mutex::new(HashMap::new())),
		})
	}

	pub fn config(&self) -> &GithubAppConfig {
		&self.config
	}

	pub fn retry_config(&self) -> &RetryConfig {
		&self.config.retry_config
	}

	pub fn webhook_secret(&self) -> Option<&str> {
		self.config.webhook_secret()
	}

	async fn installation_lock(&self, installation_id: i64) -> Arc<Mutex<()>> {
		let mut locks = self.installation_locks.lock().await;
		locks
			.entry(installation_id)
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	async fn invalidate_installation_token(&self, installation_id: i64) {
		let mut cache = self.installation_token_cache.lock().await;
		if cache.remove(&installation_id).is_some() {
			info!(installation_id, "Invalidated installation token cache");
		}
	}

	async fn invalidate_app_jwt(&self) {
		if self.app_jwt_cache.lock().await.take().is_some() {
			info!("Invalidated App JWT cache");
		}
	}

	async fn cached_app_jwt(&self) -> Option<String> {
		let cache = self.app_jwt_cache.lock().await;
		cache
			.as_ref()
			.filter(|cached| cached.is_valid(JWT_REFRESH_MARGIN))
			.map(|cached| cached.token.clone())
	}

	async fn cached_installation_token(&self, installation_id: i64) -> Option<String> {
		let cache = self.installation_token_cache.lock().await;
		cache
			.get(&installation_id)
			.filter(|cached| cached.is_valid(TOKEN_REFRESH_MARGIN))
			.map(|cached| cached.token.clone())
	}

	/// Return a cached App JWT or sign a new one.
	#[instrument(skip(self))]
	async fn app_jwt(&self) -> Result<String, GithubAppError> {
		if let Some(jwt) = self.cached_app_jwt().await {
			trace!("Using cached App JWT");
			return Ok(jwt);
		}

		let _guard = self.app_jwt_lock.lock().await;
		if let Some(jwt) = self.cached_app_jwt().await {
			return Ok(jwt);
		}

		let jwt = generate_app_jwt(self.config.app_id(), self.config.private_key_pem())?;
		*self.app_jwt_cache.lock().await = Some(CachedToken::new(jwt.clone(), JWT_VALIDITY));
		Ok(jwt)
	}

	/// Return a cached installation token or exchange the App JWT for one.
	#[instrument(skip(self))]
	pub(crate) async fn installation_token(
		&self,
		installation_id: i64,
	) -> Result<String, GithubAppError> {
		if let Some(token) = self.cached_installation_token(installation_id).await {
			trace!(installation_id, "Using cached installation token");
			return Ok(token);
		}

		let lock = self.installation_lock(installation_id).await;
		let _guard = lock.lock().await;
		if let Some(token) = self.cached_installation_token(installation_id).await {
			return Ok(token);
		}

		debug!(installation_id, "Fetching new installation token");
		let (token, valid_for) = self.fetch_installation_token(installation_id).await?;

		self
			.installation_token_cache
			.lock()
			.await
			.insert(installation_id, CachedToken::new(token.clone(), valid_for));

		info!(installation_id, "Installation token refreshed");
		Ok(token)
	}

	async fn fetch_installation_token(
		&self,
		installation_id: i64,
	) -> Result<(String, Duration), GithubAppError> {
		let jwt = self.app_jwt().await?;
		let url = self.api_url(
			&format!("app/installations/{installation_id}/access_tokens"),
			&[],
		)?;

		let request = self.authorized(self.http_client.post(url), &jwt);
		let response: AccessTokenResponse = match self.send_json(request).await {
			Ok(response) => response,
			Err(GithubAppError::Unauthorized) => {
				self.invalidate_app_jwt().await;
				return Err(GithubAppError::Unauthorized);
			}
			Err(e) => return Err(e),
		};

		let valid_for = parse_expiry_duration(&response.expires_at)?;
		Ok((response.token, valid_for))
	}

	fn api_url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, GithubAppError> {
		let mut url = self
			.config
			.base_url()
			.join(path)
			.map_err(|e| GithubAppError::Config(format!("Invalid URL: {e}")))?;

		if !query.is_empty() {
			url.query_pairs_mut().extend_pairs(query);
		}
		Ok(url)
	}

	fn authorized(&self, request: RequestBuilder, bearer: &str) -> RequestBuilder {
		request
			.header("Authorization", format!("Bearer {bearer}"))
			.header("Accept", "application/vnd.github+json")
			.header("X-GitHub-Api-Version", API_VERSION)
	}

	async fn send_json<T: DeserializeOwned>(
		&self,
		request: RequestBuilder,
	) -> Result<T, GithubAppError> {
		let response = request.send().await.map_err(|e| {
			if e.is_timeout() {
				return GithubAppError::Timeout;
			}
			GithubAppError::Network(e)
		})?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(map_github_error(status, &body));
		}

		response.json().await.map_err(|e| {
			error!(error = %e, "Failed to parse GitHub response");
			GithubAppError::InvalidResponse(format!("JSON parse error: {e}"))
		})
	}

	/// Run an installation-authenticated call under the retry policy.
	///
	/// `build` receives a token and returns the request to send. On 401 the
	/// cached token is dropped and the call is repeated once with a new one.
	async fn installation_call<T, F>(&self, installation_id: i64, build: F) -> Result<T, GithubAppError>
	where
		T: DeserializeOwned,
		F: Fn(&str) -> Result<RequestBuilder, GithubAppError>,
	{
		retry(&self.config.retry_config, || {
			self.installation_call_with_refresh(installation_id, &build)
		})
		.await
	}

	async fn installation_call_with_refresh<T, F>(
		&self,
		installation_id: i64,
		build: &F,
	) -> Result<T, GithubAppError>
	where
		T: DeserializeOwned,
		F: Fn(&str) -> Result<RequestBuilder, GithubAppError>,
	{
		let token = self.installation_token(installation_id).await?;

		match self.send_json(build(&token)?).await {
			Err(GithubAppError::Unauthorized) => {
				info!(installation_id, "Got 401, refreshing installation token");
				self.invalidate_installation_token(installation_id).await;
				let fresh = self.installation_token(installation_id).await?;
				self.send_json(build(&fresh)?).await
			}
			other => other,
		}
	}

	fn get(&self, token: &str, path: &str, query: &[(&str, &str)]) -> Result<RequestBuilder, GithubAppError> {
		let url = self.api_url(path, query)?;
		Ok(self.authorized(self.http_client.get(url), token))
	}

	#[instrument(skip(self), fields(owner, repo))]
	pub async fn get_repository(
		&self,
		installation_id: i64,
		owner: &str,
		repo: &str,
	) -> Result<Repository, GithubAppError> {
		let path = format!("repos/{owner}/{repo}");
		self
			.installation_call(installation_id, |token| self.get(token, &path, &[]))
			.await
	}

	/// Fetch a file. A missing file surfaces as a 404 [`GithubAppError::ApiError`].
	#[instrument(skip(self), fields(owner, repo, path))]
	pub async fn get_file_contents(
		&self,
		installation_id: i64,
		owner: &str,
		repo: &str,
		path: &str,
		git_ref: Option<&str>,
	) -> Result<FileContents, GithubAppError> {
		let encoded: Vec<String> = path
			.split('/')
			.map(|segment| urlencoding::encode(segment).into_owned())
			.collect();
		let url_path = format!("repos/{owner}/{repo}/contents/{}", encoded.join("/"));
		let query: Vec<(&str, &str)> = git_ref.map(|r| ("ref", r)).into_iter().collect();

		let contents: FileContents = self
			.installation_call(installation_id, |token| self.get(token, &url_path, &query))
			.await?;

		debug!(path = %contents.path, size = contents.size, "File contents fetched");
		Ok(contents)
	}

	#[instrument(skip(self), fields(owner, repo))]
	pub async fn list_tags(
		&self,
		installation_id: i64,
		owner: &str,
		repo: &str,
		per_page: u32,
	) -> Result<Vec<Tag>, GithubAppError> {
		let path = format!("repos/{owner}/{repo}/tags");
		let per_page = per_page.to_string();
		self
			.installation_call(installation_id, |token| {
				self.get(token, &path, &[("per_page", per_page.as_str())])
			})
			.await
	}

	/// Most recent release, newest first as GitHub orders them.
	#[instrument(skip(self), fields(owner, repo))]
	pub async fn latest_release(
		&self,
		installation_id: i64,
		owner: &str,
		repo: &str,
	) -> Result<Option<Release>, GithubAppError> {
		let path = format!("repos/{owner}/{repo}/releases");
		let releases: Vec<Release> = self
			.installation_call(installation_id, |token| {
				self.get(token, &path, &[("per_page", "1")])
			})
			.await?;
		Ok(releases.into_iter().next())
	}

	/// Pull requests whose head or merge includes `sha`.
	#[instrument(skip(self), fields(owner, repo, sha))]
	pub async fn list_pulls_for_commit(
		&self,
		installation_id: i64,
		owner: &str,
		repo: &str,
		sha: &str,
	) -> Result<Vec<PullRequest>, GithubAppError> {
		let path = format!("repos/{owner}/{repo}/commits/{sha}/pulls");
		self
			.installation_call(installation_id, |token| self.get(token, &path, &[]))
			.await
	}

	#[instrument(skip(self), fields(owner, repo, number))]
	pub async fn get_pull(
		&self,
		installation_id: i64,
		owner: &str,
		repo: &str,
		number: u64,
	) -> Result<PullRequest, GithubAppError> {
		let path = format!("repos/{owner}/{repo}/pulls/{number}");
		self
			.installation_call(installation_id, |token| self.get(token, &path, &[]))
			.await
	}

	/// All open pull requests, least recently updated first.
	#[instrument(skip(self), fields(owner, repo))]
	pub async fn list_open_pulls(
		&self,
		installation_id: i64,
		owner: &str,
		repo: &str,
	) -> Result<Vec<PullRequest>, GithubAppError> {
		let path = format!("repos/{owner}/{repo}/pulls");
		let per_page = MAX_PER_PAGE.to_string();
		let mut pulls = Vec::new();
		let mut page = 1u32;

		loop {
			let page_str = page.to_string();
			let batch: Vec<PullRequest> = self
				.installation_call(installation_id, |token| {
					self.get(
						token,
						&path,
						&[
							("state", "open"),
							("sort", "updated"),
							("direction", "asc"),
							("per_page", per_page.as_str()),
							("page", page_str.as_str()),
						],
					)
				})
				.await?;

			let last_page = (batch.len() as u32) < MAX_PER_PAGE;
			pulls.extend(batch);
			if last_page {
				break;
			}
			page += 1;
		}

		debug!(count = pulls.len(), "Listed open pull requests");
		Ok(pulls)
	}

	#[instrument(skip(self, request), fields(owner, repo, environment = %request.environment, task = %request.task))]
	pub async fn create_deployment(
		&self,
		installation_id: i64,
		owner: &str,
		repo: &str,
		request: &DeploymentRequest,
	) -> Result<Deployment, GithubAppError> {
		let path = format!("repos/{owner}/{repo}/deployments");
		let deployment: Deployment = self
			.installation_call(installation_id, |token| {
				let url = self.api_url(&path, &[])?;
				Ok(self.authorized(self.http_client.post(url), token).json(request))
			})
			.await?;

		info!(deployment_id = deployment.id, "Deployment created");
		Ok(deployment)
	}
}

/// Map a non-success GitHub response onto [`GithubAppError`].
pub(crate) fn map_github_error(status: StatusCode, body: &str) -> GithubAppError {
	let status_code = status.as_u16();
	match status {
		StatusCode::UNAUTHORIZED => {
			warn!(status = status_code, "Unauthorized request to GitHub");
			GithubAppError::Unauthorized
		}
		StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
			let lower = body.to_lowercase();
			if status == StatusCode::TOO_MANY_REQUESTS || lower.contains("rate limit") {
				warn!(status = status_code, "GitHub rate limit exceeded");
				GithubAppError::RateLimited
			} else {
				warn!(status = status_code, "Forbidden request to GitHub");
				GithubAppError::Forbidden
			}
		}
		StatusCode::NOT_FOUND => {
			debug!(status = status_code, "GitHub resource not found");
			GithubAppError::api_error(status_code, body)
		}
		_ => {
			error!(status = status_code, body = %body, "GitHub API error");
			GithubAppError::api_error(status_code, body)
		}
	}
}

pub(crate) fn parse_expiry_duration(expires_at: &str) -> Result<Duration, GithubAppError> {
	let expires_at_dt: DateTime<Utc> = expires_at.parse().map_err(|e| {
		GithubAppError::InvalidResponse(format!("Invalid expires_at: {expires_at} - {e}"))
	})?;

	Ok(expires_at_dt
		.signed_duration_since(Utc::now())
		.to_std()
		.unwrap_or(Duration::ZERO))
}
