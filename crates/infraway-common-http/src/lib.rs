// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for infraway.
//!
//! - A pre-configured [`reqwest::Client`] builder carrying the infraway
//!   User-Agent
//! - [`retry`] with exponential backoff for transient GitHub failures

mod client;
mod retry;

pub use client::{builder, user_agent};
pub use retry::{retry, RetryConfig, RetryableError};
