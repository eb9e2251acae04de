// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP-level tests for the webhook and health endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
	body::Body,
	http::{Request, StatusCode},
	Router,
};
use chrono::Utc;
use infraway_common_config::SecretString;
use infraway_deploy::mock::{pull_request, MockSourceControl, RecordedDeployment};
use infraway_deploy::{DeployEngine, DeploySettings};
use infraway_github::compute_webhook_signature;
use infraway_jobs::{JobHistory, JobScheduler};
use infraway_server::{create_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "webhook-secret";
const HEAD: &str = "89abcdef0123456789abcdef0123456789abcdef";

const CONFIG: &str = r#"
domain: preview.example.com
deploy:
  - name: web
    components:
      - name: api
        chart: api
"#;

struct TestServer {
	scm: Arc<MockSourceControl>,
	state: AppState,
}

impl TestServer {
	fn new(secret: Option<&str>) -> Self {
		let scm = Arc::new(
			MockSourceControl::new()
				.with_file(".infraway", "config.yaml", CONFIG)
				.with_pull("web", pull_request(9, HEAD, Utc::now())),
		);
		let scheduler = Arc::new(JobScheduler::new(Arc::new(JobHistory::default())));
		let engine = DeployEngine::new(scm.clone(), scheduler, DeploySettings::default());
		let state = AppState::new(
			Arc::new(engine),
			secret.map(|s| SecretString::new(s.to_string())),
		);
		Self { scm, state }
	}

	fn router(&self) -> Router {
		create_router(self.state.clone())
	}

	async fn wait_for_deployments(&self, count: usize) -> Vec<RecordedDeployment> {
		for _ in 0..100 {
			let deployments = self.scm.deployments().await;
			if deployments.len() >= count {
				return deployments;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		self.scm.deployments().await
	}

	async fn shutdown(self) {
		self.state.scheduler().shutdown().await;
	}
}

fn push_body() -> Vec<u8> {
	json!({
		"after": HEAD,
		"head_commit": { "id": HEAD },
		"repository": { "name": "web", "owner": { "login": "acme" } },
		"installation": { "id": 42 }
	})
	.to_string()
	.into_bytes()
}

fn webhook(event: &str, body: Vec<u8>, signature: Option<String>) -> Request<Body> {
	let mut builder = Request::builder()
		.method("POST")
		.uri("/api/github/webhooks")
		.header("content-type", "application/json")
		.header("X-GitHub-Event", event)
		.header("X-GitHub-Delivery", "delivery-1");
	if let Some(signature) = signature {
		builder = builder.header("X-Hub-Signature-256", signature);
	}
	builder.body(Body::from(body)).unwrap()
}

fn signed(event: &str, body: Vec<u8>) -> Request<Body> {
	let signature = compute_webhook_signature(SECRET, &body).unwrap();
	webhook(event, body, Some(signature))
}

async fn json_body(response: axum::response::Response) -> Value {
	let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_signature_is_rejected() {
	let server = TestServer::new(Some(SECRET));

	let response = server
		.router()
		.oneshot(webhook("push", push_body(), None))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	assert_eq!(json_body(response).await["error"], json!("unauthorized"));
	server.shutdown().await;
}

#[tokio::test]
async fn wrong_signature_is_rejected() {
	let server = TestServer::new(Some(SECRET));
	let body = push_body();
	let signature = compute_webhook_signature("other-secret", &body).unwrap();

	let response = server
		.router()
		.oneshot(webhook("push", body, Some(signature)))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	assert!(server.scm.calls().await.is_empty());
	server.shutdown().await;
}

#[tokio::test]
async fn signed_push_is_accepted_and_deployed() {
	let server = TestServer::new(Some(SECRET));

	let response = server
		.router()
		.oneshot(signed("push", push_body()))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::ACCEPTED);

	let deployments = server.wait_for_deployments(1).await;
	assert_eq!(deployments.len(), 1);
	assert_eq!(deployments[0].installation_id, 42);
	assert_eq!(deployments[0].repo, "charts");
	assert_eq!(deployments[0].request.environment, "web-pull-9");
	assert_eq!(deployments[0].request.payload["gitVersion"], json!(HEAD));
	server.shutdown().await;
}

#[tokio::test]
async fn unsigned_requests_pass_without_secret() {
	let server = TestServer::new(None);

	let response = server
		.router()
		.oneshot(webhook("push", push_body(), None))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::ACCEPTED);
	assert_eq!(server.wait_for_deployments(1).await.len(), 1);
	server.shutdown().await;
}

#[tokio::test]
async fn unknown_events_are_acknowledged() {
	let server = TestServer::new(Some(SECRET));

	let response = server
		.router()
		.oneshot(signed("star", b"{\"action\":\"created\"}".to_vec()))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::OK);
	assert!(server.scm.calls().await.is_empty());
	server.shutdown().await;
}

#[tokio::test]
async fn malformed_payload_is_bad_request() {
	let server = TestServer::new(Some(SECRET));

	let response = server
		.router()
		.oneshot(signed("pull_request", b"{\"action\":\"opened\"}".to_vec()))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	server.shutdown().await;
}

#[tokio::test]
async fn payload_without_installation_is_bad_request() {
	let server = TestServer::new(Some(SECRET));
	let body = json!({
		"after": HEAD,
		"repository": { "name": "web", "owner": { "login": "acme" } }
	})
	.to_string()
	.into_bytes();

	let response = server.router().oneshot(signed("push", body)).await.unwrap();

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	server.shutdown().await;
}

#[tokio::test]
async fn health_reports_registered_jobs() {
	let server = TestServer::new(Some(SECRET));

	let response = server
		.router()
		.oneshot(signed("push", push_body()))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::ACCEPTED);
	server.wait_for_deployments(1).await;

	let response = server
		.router()
		.oneshot(
			Request::builder()
				.uri("/health")
				.body(Body::empty())
				.unwrap(),
		)
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	let mut ids: Vec<String> = body["jobs"]
		.as_array()
		.unwrap()
		.iter()
		.map(|job| job["job_id"].as_str().unwrap().to_string())
		.collect();
	ids.sort();
	assert_eq!(ids, vec!["config-refresh:acme", "stale-sweep:acme"]);
	server.shutdown().await;
}
