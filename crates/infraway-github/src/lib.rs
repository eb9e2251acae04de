// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub App client for infraway.
//!
//! Authenticates as a GitHub App, mints installation tokens on demand and
//! exposes the handful of REST calls the deployment engine needs: repository
//! contents, tags, releases, pull requests and deployments. Webhook payload
//! types and signature verification live here as well.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod jwt;
pub mod types;
pub mod webhook;

pub use client::GithubAppClient;
pub use config::GithubAppConfig;
pub use error::GithubAppError;
pub use infraway_common_http::RetryConfig;
pub use types::{
	Deployment, DeploymentRequest, FileContents, PullRequest, PullRequestRef, Release, Repository,
	Tag, TagCommit,
};
pub use webhook::{compute_webhook_signature, verify_webhook_signature};
