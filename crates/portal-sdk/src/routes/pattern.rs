//! Pattern compilation into anchored regular expressions.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use super::{strip_trailing_slashes, RouteMatch, RouteMatchOptions};

/// One route pattern compiled for repeated matching.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pattern: String,
    regex: Regex,
    param_names: Vec<String>,
    options: RouteMatchOptions,
}

impl CompiledPattern {
    pub fn compile(pattern: &str, options: RouteMatchOptions) -> Result<Self, regex::Error> {
        let normalized = if options.ignore_trailing_slash {
            strip_trailing_slashes(pattern)
        } else {
            pattern
        };

        let mut param_names = Vec::new();
        let source = if normalized.is_empty() {
            // The empty pattern (and "/" once normalized) is the root.
            "^/?$".to_string()
        } else {
            let mut body = String::from("^");
            for (index, segment) in normalized.split('/').enumerate() {
                if index > 0 {
                    body.push('/');
                }
                match segment.strip_prefix(':') {
                    Some(name) if !name.is_empty() => {
                        param_names.push(name.to_string());
                        body.push_str("([^/]+)");
                    }
                    _ => push_literal(&mut body, segment),
                }
            }
            if options.ignore_trailing_slash {
                body.push_str("/?");
            }
            body.push('$');
            body
        };

        let regex = RegexBuilder::new(&source)
            .case_insensitive(options.case_insensitive)
            .build()?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            param_names,
            options,
        })
    }

    /// The pattern as written in the allow-list.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Captured parameters when `path` matches, `None` otherwise.
    pub fn captures(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let path = if self.options.ignore_trailing_slash {
            strip_trailing_slashes(path)
        } else {
            path
        };
        let captures = self.regex.captures(path)?;
        let params = self
            .param_names
            .iter()
            .enumerate()
            .filter_map(|(index, name)| {
                captures
                    .get(index + 1)
                    .map(|value| (name.clone(), value.as_str().to_string()))
            })
            .collect();
        Some(params)
    }
}

/// Escape a literal segment, turning embedded `*` into `.*`.
fn push_literal(body: &mut String, segment: &str) {
    let mut pieces = segment.split('*');
    if let Some(first) = pieces.next() {
        body.push_str(&regex::escape(first));
    }
    for piece in pieces {
        body.push_str(".*");
        body.push_str(&regex::escape(piece));
    }
}

/// An ordered allow-list compiled once, matched many times.
///
/// Permission lists are immutable for the lifetime of a registration, so the
/// host compiles them at `register` time.
#[derive(Debug, Clone, Default)]
pub struct RouteSet {
    patterns: Vec<CompiledPattern>,
}

impl RouteSet {
    pub fn compile<S: AsRef<str>>(patterns: &[S], options: RouteMatchOptions) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|pattern| {
                CompiledPattern::compile(pattern.as_ref(), options)
                    .map_err(|error| {
                        tracing::warn!("dropping route pattern '{}': {error}", pattern.as_ref());
                    })
                    .ok()
            })
            .collect();
        Self { patterns }
    }

    /// First-match lookup, same semantics as [`super::match_route`].
    pub fn matches(&self, path: &str) -> RouteMatch {
        self.patterns
            .iter()
            .find_map(|compiled| {
                compiled.captures(path).map(|params| RouteMatch {
                    matched: true,
                    pattern: Some(compiled.pattern().to_string()),
                    params: Some(params),
                })
            })
            .unwrap_or_else(RouteMatch::unmatched)
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(CompiledPattern::pattern)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
