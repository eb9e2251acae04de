// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! infraway webhook server.
//!
//! Receives GitHub App webhooks, verifies their signatures and hands them to
//! the deployment engine.

pub mod api;
pub mod error;
pub mod routes;

pub use api::{create_app_state, create_router, AppState};
pub use error::ServerError;
pub use infraway_server_config::ServerConfig;
