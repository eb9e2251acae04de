// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP client builder with a consistent User-Agent header.

use reqwest::{Client, ClientBuilder};

/// Returns a client builder that identifies requests as `infraway/{version}`.
///
/// GitHub rejects API calls without a User-Agent, so every outbound client in
/// the workspace starts here.
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

pub fn user_agent() -> String {
	format!("infraway/{}", env!("CARGO_PKG_VERSION"))
}
