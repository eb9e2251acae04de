// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server error types and HTTP response conversions.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	/// Malformed or incomplete request.
	#[error("Invalid request: {0}")]
	BadRequest(String),

	/// Webhook signature missing or wrong.
	#[error("Unauthorized: {0}")]
	Unauthorized(String),

	#[error("Internal error: {0}")]
	Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let (status, error, message) = match self {
			ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
			ServerError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
			ServerError::Internal(msg) => {
				tracing::error!(error = %msg, "internal error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					"internal_error",
					"An internal error occurred".to_string(),
				)
			}
		};

		let body = ErrorResponse {
			error: error.to_string(),
			message,
		};
		(status, Json(body)).into_response()
	}
}
