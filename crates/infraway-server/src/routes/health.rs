// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health HTTP handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use infraway_jobs::HealthState;

use crate::api::AppState;

/// GET /health - Scheduled job health.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	let health = state.scheduler().health_status().await;

	let http_status = match health.status {
		HealthState::Healthy | HealthState::Degraded => StatusCode::OK,
		HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
	};

	(http_status, Json(health))
}
