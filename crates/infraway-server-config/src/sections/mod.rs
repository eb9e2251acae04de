// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for the infraway server.

pub mod deploy;
pub mod github_app;
pub mod http;
pub mod logging;

pub use deploy::{ConfigLocation, DeployConfig, DeployConfigLayer};
pub use github_app::{GitHubAppConfig, GitHubAppConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
