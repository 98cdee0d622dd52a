//! Route permission validation.
//!
//! Pure matching of a requested path against an ordered allow-list of
//! patterns. `*` matches any run of characters in place, so the slash in
//! front of a trailing `/*` is still required. `:name` matches one non-slash
//! segment and captures it. First match wins.

pub mod pattern;

pub use pattern::{CompiledPattern, RouteSet};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Matching options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteMatchOptions {
    /// Strip trailing slashes from both path and pattern before comparing.
    pub ignore_trailing_slash: bool,
    pub case_insensitive: bool,
}

impl Default for RouteMatchOptions {
    fn default() -> Self {
        Self {
            ignore_trailing_slash: true,
            case_insensitive: false,
        }
    }
}

/// Outcome of matching one path against an allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    pub matched: bool,
    /// The first pattern that matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Named parameters captured by that pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
}

impl RouteMatch {
    pub fn unmatched() -> Self {
        Self::default()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.as_ref()?.get(name).map(String::as_str)
    }
}

/// Match `path` against `patterns` in order; the first match wins.
pub fn match_route<S: AsRef<str>>(
    path: &str,
    patterns: &[S],
    options: RouteMatchOptions,
) -> RouteMatch {
    for pattern in patterns {
        let compiled = match CompiledPattern::compile(pattern.as_ref(), options) {
            Ok(compiled) => compiled,
            Err(error) => {
                tracing::warn!("skipping route pattern '{}': {error}", pattern.as_ref());
                continue;
            }
        };
        if let Some(params) = compiled.captures(path) {
            return RouteMatch {
                matched: true,
                pattern: Some(compiled.pattern().to_string()),
                params: Some(params),
            };
        }
    }
    RouteMatch::unmatched()
}

/// Whether `path` matches any of `patterns`.
pub fn is_route_allowed<S: AsRef<str>>(
    path: &str,
    patterns: &[S],
    options: RouteMatchOptions,
) -> bool {
    match_route(path, patterns, options).matched
}

/// Remove every trailing `/`.
pub(crate) fn strip_trailing_slashes(value: &str) -> &str {
    value.trim_end_matches('/')
}
