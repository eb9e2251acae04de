// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Preview environment engine.
//!
//! Turns repository events into GitHub deployment records on the chart
//! repository. Each account is configured by a YAML file fetched from one of
//! the configured sources, cached, and refreshed on a schedule. Pull request
//! environments idle past the account's threshold are swept by a periodic
//! job.

pub mod account;
pub mod cache;
pub mod command;
pub mod dispatch;
pub mod error;
pub mod executor;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod payload;
pub mod resolver;
pub mod scm;
pub mod settings;
pub mod sweeper;
pub mod version;

pub use account::{
	Account, AccountConfig, ComponentSpec, DeployTarget, EventAction, EventPolicy, StaleCleanup,
	TriggerKind,
};
pub use cache::{ConfigCache, ConfigRefreshJob};
pub use command::ComponentOverride;
pub use dispatch::{DeployEngine, DispatchOutcome, WebhookEvent};
pub use error::{DeployError, Result};
pub use executor::DeploymentExecutor;
pub use payload::{DeletePayload, DeployPayload, Payload};
pub use resolver::{DeployRequest, DeployResolution};
pub use scm::SourceControl;
pub use settings::{ConfigLocation, DeploySettings};
pub use sweeper::{StaleSweepJob, SweepReport};
pub use version::{ResolvedVersion, VersionToken};
