// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `X-Hub-Signature-256` verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::error::GithubAppError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

fn mac_for(secret: &str) -> Result<HmacSha256, GithubAppError> {
	HmacSha256::new_from_slice(secret.as_bytes())
		.map_err(|e| GithubAppError::Config(format!("invalid webhook secret: {e}")))
}

/// Check a `sha256=<hex>` header against the raw request body.
///
/// Comparison is constant time.
pub fn verify_webhook_signature(
	secret: &str,
	signature_header: &str,
	body: &[u8],
) -> Result<(), GithubAppError> {
	let Some(expected_hex) = signature_header.strip_prefix(SIGNATURE_PREFIX) else {
		warn!("Webhook signature is missing the sha256= prefix");
		return Err(GithubAppError::InvalidWebhookSignature);
	};

	let Ok(expected) = hex::decode(expected_hex) else {
		warn!("Webhook signature is not valid hex");
		return Err(GithubAppError::InvalidWebhookSignature);
	};

	let mut mac = mac_for(secret)?;
	mac.update(body);

	if mac.verify_slice(&expected).is_ok() {
		debug!("Webhook signature verified");
		Ok(())
	} else {
		warn!("Webhook signature mismatch");
		Err(GithubAppError::InvalidWebhookSignature)
	}
}

/// Produce the header value GitHub would send for `body`.
pub fn compute_webhook_signature(secret: &str, body: &[u8]) -> Result<String, GithubAppError> {
	let mut mac = mac_for(secret)?;
	mac.update(body);
	Ok(format!(
		"{SIGNATURE_PREFIX}{}",
		hex::encode(mac.finalize().into_bytes())
	))
}
