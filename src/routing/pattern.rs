//! Path pattern compilation and matching.
//!
//! # Responsibilities
//! - Compile a route template into an anchored matcher
//! - Extract named parameters from a concrete request path
//!
//! # Template Syntax
//! ```text
//! /users              literal
//! /users/:id          one segment, captured as "id"
//! /files/*            rest of the path (may contain '/'), captured as "splat"
//! ```
//!
//! # Design Decisions
//! - Templates compile once at startup; raw strings are never matched at request time
//! - Matching is case-sensitive and anchored at both ends
//! - Captured values are percent-decoded

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::routing::ConfigurationError;

/// Parameters extracted from a matched path.
pub type Params = HashMap<String, String>;

/// Name given to the capture produced by a `*` wildcard.
pub const SPLAT: &str = "splat";

/// A compiled route template.
#[derive(Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    names: Vec<String>,
}

impl PathPattern {
    /// Compile a template such as `/users/:id/posts/*`.
    pub fn compile(template: &str) -> Result<Self, ConfigurationError> {
        if !template.starts_with('/') {
            return Err(ConfigurationError::invalid_pattern(template, "must start with '/'"));
        }

        let mut source = String::with_capacity(template.len() + 16);
        source.push('^');
        let mut names: Vec<String> = Vec::new();

        let mut chars = template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                ':' => {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            name.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        return Err(ConfigurationError::invalid_pattern(
                            template,
                            "parameter name is empty",
                        ));
                    }
                    if names.contains(&name) {
                        return Err(ConfigurationError::invalid_pattern(
                            template,
                            format!("duplicate parameter '{name}'"),
                        ));
                    }
                    source.push_str("([^/]+)");
                    names.push(name);
                }
                '*' => {
                    if names.iter().any(|n| n == SPLAT) {
                        return Err(ConfigurationError::invalid_pattern(
                            template,
                            "only one '*' wildcard is allowed",
                        ));
                    }
                    source.push_str("(.*)");
                    names.push(SPLAT.to_string());
                }
                other => {
                    let mut buf = [0u8; 4];
                    source.push_str(&regex::escape(other.encode_utf8(&mut buf)));
                }
            }
        }
        source.push('$');

        let regex = Regex::new(&source)
            .map_err(|e| ConfigurationError::invalid_pattern(template, e.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            regex,
            names,
        })
    }

    /// The template this pattern was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns true if the path matches this pattern.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match `path` and extract its parameters.
    ///
    /// Returns `None` when the path does not match.
    pub fn params(&self, path: &str) -> Option<Params> {
        let captures = self.regex.captures(path)?;
        let mut params = Params::with_capacity(self.names.len());
        for (index, name) in self.names.iter().enumerate() {
            if let Some(value) = captures.get(index + 1) {
                let raw = value.as_str();
                let decoded = urlencoding::decode(raw)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| raw.to_string());
                params.insert(name.clone(), decoded);
            }
        }
        Some(params)
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathPattern")
            .field("template", &self.template)
            .field("names", &self.names)
            .finish()
    }
}
