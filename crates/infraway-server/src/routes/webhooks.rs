// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! GitHub App webhook receiver.

use std::sync::Arc;

use axum::{
	body::Bytes,
	extract::State,
	http::{HeaderMap, StatusCode},
	response::IntoResponse,
};
use infraway_deploy::{DispatchOutcome, WebhookEvent};
use tracing::Instrument;

use crate::{api::AppState, error::ServerError};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /api/github/webhooks - Accept a GitHub App event.
///
/// Verified events are handled on a background task and answered with
/// `202 Accepted`. Events infraway does not act on get `200 OK`.
pub async fn github_webhook(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<impl IntoResponse, ServerError> {
	let event_type = header(&headers, "X-GitHub-Event").unwrap_or("unknown");
	let delivery = header(&headers, "X-GitHub-Delivery").unwrap_or("-");

	tracing::debug!(event_type = %event_type, delivery = %delivery, "github_webhook: received event");

	if let Some(secret) = &state.webhook_secret {
		let sig_header = header(&headers, "X-Hub-Signature-256").ok_or_else(|| {
			tracing::warn!(delivery = %delivery, "github_webhook: missing X-Hub-Signature-256 header");
			ServerError::Unauthorized("Missing X-Hub-Signature-256 header".into())
		})?;

		if let Err(e) = infraway_github::verify_webhook_signature(secret.expose(), sig_header, &body)
		{
			tracing::warn!(delivery = %delivery, error = %e, "github_webhook: signature verification failed");
			return Err(ServerError::Unauthorized("Invalid webhook signature".into()));
		}
	}

	let event = WebhookEvent::parse(event_type, &body)
		.map_err(|e| ServerError::BadRequest(format!("Invalid webhook payload: {e}")))?;
	let Some(event) = event else {
		tracing::debug!(event_type = %event_type, "github_webhook: ignoring event");
		return Ok(StatusCode::OK);
	};

	if event.installation_id().is_none() {
		return Err(ServerError::BadRequest(
			"Webhook payload has no installation".into(),
		));
	}

	let engine = Arc::clone(&state.engine);
	let span = tracing::info_span!(
		"webhook",
		delivery = %delivery,
		event = event.kind(),
		owner = %event.owner(),
		repo = %event.repo()
	);
	tokio::spawn(
		async move {
			match engine.handle(&event).await {
				Ok(DispatchOutcome::Deployed(deployments)) => {
					tracing::info!(count = deployments.len(), "github_webhook: deployments created");
				}
				Ok(DispatchOutcome::Deleted(deployments)) => {
					tracing::info!(count = deployments.len(), "github_webhook: deletions created");
				}
				Ok(DispatchOutcome::Skipped(reason)) => {
					tracing::debug!(reason = %reason, "github_webhook: nothing to do");
				}
				Err(e) => {
					tracing::error!(error = %e, "github_webhook: event handling failed");
				}
			}
		}
		.instrument(span),
	);

	Ok(StatusCode::ACCEPTED)
}
