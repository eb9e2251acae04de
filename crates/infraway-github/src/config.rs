// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the GitHub App client.

use std::time::Duration;

use infraway_common_config::{Secret, SecretString};
use infraway_common_http::RetryConfig;
use reqwest::Url;
use tracing::warn;

use crate::error::GithubAppError;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com/";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`crate::GithubAppClient`].
///
/// The private key and webhook secret are held as [`SecretString`] so the
/// config can be logged with `{:?}`.
#[derive(Clone)]
pub struct GithubAppConfig {
	app_id: u64,
	private_key_pem: SecretString,
	webhook_secret: Option<SecretString>,
	/// Always ends in `/` so relative joins keep any `/api/v3` prefix.
	base_url: Url,
	request_timeout: Duration,
	pub retry_config: RetryConfig,
}

impl std::fmt::Debug for GithubAppConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GithubAppConfig")
			.field("app_id", &self.app_id)
			.field("private_key_pem", &self.private_key_pem)
			.field("webhook_secret", &self.webhook_secret)
			.field("base_url", &self.base_url.as_str())
			.field("request_timeout", &self.request_timeout)
			.field("retry_config", &self.retry_config)
			.finish()
	}
}

impl GithubAppConfig {
	/// Parse a GitHub API base URL.
	///
	/// Only `https` URLs with a non-loopback host are accepted. A trailing `/`
	/// is appended when missing.
	pub fn parse_base_url(raw: &str) -> Result<Url, GithubAppError> {
		let mut url = Url::parse(raw)
			.map_err(|e| GithubAppError::Config(format!("Invalid GitHub base URL '{raw}': {e}")))?;

		if url.scheme() != "https" {
			return Err(GithubAppError::Config(format!(
				"GitHub base URL must use https, got '{}'",
				url.scheme()
			)));
		}

		match url.host_str() {
			None => {
				return Err(GithubAppError::Config(
					"GitHub base URL must include a host".to_string(),
				))
			}
			Some("localhost" | "127.0.0.1" | "[::1]") => {
				return Err(GithubAppError::Config(
					"GitHub base URL must not be localhost".to_string(),
				))
			}
			Some(_) => {}
		}

		if !url.path().ends_with('/') {
			let path = format!("{}/", url.path());
			url.set_path(&path);
		}

		Ok(url)
	}

	/// Configuration pointing at api.github.com.
	pub fn new(app_id: u64, private_key_pem: impl Into<String>) -> Self {
		Self {
			app_id,
			private_key_pem: Secret::new(private_key_pem.into()),
			webhook_secret: None,
			base_url: default_base_url(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			retry_config: RetryConfig::default(),
		}
	}

	/// Point the client at GitHub Enterprise.
	///
	/// Invalid URLs are logged and the previous value is kept.
	pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
		let raw = url.into();
		match Self::parse_base_url(&raw) {
			Ok(parsed) => self.base_url = parsed,
			Err(e) => {
				warn!(error = %e, url = %raw, "Ignoring invalid GitHub base URL");
			}
		}
		self
	}

	pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
		self.webhook_secret = Some(Secret::new(secret.into()));
		self
	}

	pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
		self.retry_config = config;
		self
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	pub fn app_id(&self) -> u64 {
		self.app_id
	}

	pub(crate) fn private_key_pem(&self) -> &str {
		self.private_key_pem.expose()
	}

	pub fn webhook_secret(&self) -> Option<&str> {
		self.webhook_secret.as_ref().map(|s| s.expose().as_str())
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	pub fn request_timeout(&self) -> Duration {
		self.request_timeout
	}
}

fn default_base_url() -> Url {
	match Url::parse(DEFAULT_BASE_URL) {
		Ok(url) => url,
		Err(_) => unreachable!("DEFAULT_BASE_URL is a valid URL"),
	}
}
