//! Naming utilities for SchemaMover
//!
//! Identifier normalisation, ignore rules and disposable object names.

use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

use crate::error::Result;

/// Compiled set of ignore patterns; a live object matching any of them is left untouched
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Regex>,
}

impl IgnoreRules {
    /// Compile the configured patterns, failing on the first invalid one
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Rules that ignore nothing
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(name))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Generates unique names for disposable routines within one run
#[derive(Debug)]
pub struct TempNameGenerator {
    prefix: String,
    counter: AtomicUsize,
}

impl TempNameGenerator {
    /// Names are `tmp_<run id>_<n>`, the run id being a fresh UUID fragment
    pub fn new() -> Self {
        let run_id = Uuid::new_v4().simple().to_string();
        Self::with_prefix(&format!("tmp_{}", &run_id[..12]))
    }

    /// Use a fixed prefix, so generated names are predictable
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn next_name(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}_{}", self.prefix, n)
    }
}

impl Default for TempNameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip backticks, double quotes or brackets around an identifier and keep the last
/// segment of a qualified name
pub fn unquote_identifier(identifier: &str) -> String {
    let last = split_qualified(identifier.trim())
        .pop()
        .unwrap_or_default();
    let trimmed = last.trim();
    let unquoted = match (trimmed.chars().next(), trimmed.chars().last()) {
        (Some('`'), Some('`')) | (Some('"'), Some('"')) | (Some('['), Some(']'))
            if trimmed.len() >= 2 =>
        {
            &trimmed[1..trimmed.len() - 1]
        }
        _ => trimmed,
    };
    unquoted.to_string()
}

/// Split `schema.name` on dots outside quotes
fn split_qualified(identifier: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in identifier.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q || (q == '[' && c == ']') {
                    quote = None;
                }
            }
            None => match c {
                '`' | '"' | '[' => {
                    quote = Some(c);
                    current.push(c);
                }
                '.' => parts.push(std::mem::take(&mut current)),
                _ => current.push(c),
            },
        }
    }
    parts.push(current);
    parts
}

/// Single-line prefix of a statement for log and error messages
pub fn preview(sql: &str, max_chars: usize) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > max_chars {
        let head: String = collapsed.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        collapsed
    }
}
