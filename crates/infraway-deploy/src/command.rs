// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `/deploy` comment commands.
//!
//! ```text
//! /deploy                      deploy every non-addon component
//! /deploy api worker:release   deploy api at its configured version and
//!                              worker at the latest release
//! ```
//!
//! `\deploy`, `#deploy` and `|deploy` are accepted as well.

use std::sync::LazyLock;

use regex::Regex;

static COMMAND_REGEX: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?i)^\s*[/\\#|]deploy(?:\s|$)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentOverride {
	pub component: String,
	pub version: Option<String>,
}

/// `None` when `body` is not a deploy command. An empty list means the
/// command named no components.
pub fn parse(body: &str) -> Option<Vec<ComponentOverride>> {
	let matched = COMMAND_REGEX.find(body)?;
	let arguments = body[matched.end()..].to_lowercase();

	let mut overrides: Vec<ComponentOverride> = Vec::new();
	for token in arguments.split_whitespace() {
		let (component, version) = match token.split_once(':') {
			Some((component, version)) => (component, Some(version)),
			None => (token, None),
		};
		if component.is_empty() {
			continue;
		}
		let version = version.filter(|v| !v.is_empty()).map(str::to_string);

		match overrides.iter_mut().find(|o| o.component == component) {
			Some(existing) => existing.version = version,
			None => overrides.push(ComponentOverride {
				component: component.to_string(),
				version,
			}),
		}
	}

	Some(overrides)
}
