// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{collections::BTreeSet, fmt, sync::Arc};

use regex::Regex;

use crate::ds_debug;

/// A single ignore pattern.
///
/// Patterns are regular expressions anchored on both ends, so they must match the whole
/// subject. A pattern that is not a valid regular expression only matches its exact text.
#[derive(Clone)]
pub struct IgnorePattern {
    pattern: String,
    matcher: Matcher,
}

#[derive(Clone)]
enum Matcher {
    Regex(Regex),
    Exact,
}

impl IgnorePattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let matcher = match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(re) => Matcher::Regex(re),
            Err(e) => {
                ds_debug!("IgnorePattern: {pattern:?} is not a regex, matching it literally: {e}");
                Matcher::Exact
            }
        };
        Self { pattern, matcher }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, subject: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(re) => re.is_match(subject),
            Matcher::Exact => self.pattern == subject,
        }
    }
}

impl fmt::Debug for IgnorePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IgnorePattern").field(&self.pattern).finish()
    }
}

impl PartialEq for IgnorePattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

/// An immutable list of compiled ignore patterns.
///
/// Built either as a set ([`IgnorePatterns::set`]: duplicates removed, order irrelevant) or as a
/// sequence ([`IgnorePatterns::sequence`]: order and duplicates preserved). Cloning is cheap.
#[derive(Clone, Debug, PartialEq)]
pub struct IgnorePatterns {
    patterns: Arc<[IgnorePattern]>,
}

impl Default for IgnorePatterns {
    fn default() -> Self {
        Self {
            patterns: Arc::from(Vec::new()),
        }
    }
}

impl IgnorePatterns {
    pub fn set<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = patterns.into_iter().map(Into::into).collect();
        Self {
            patterns: unique.into_iter().map(IgnorePattern::new).collect(),
        }
    }

    pub fn sequence<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(IgnorePattern::new).collect(),
        }
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(subject))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(IgnorePattern::pattern)
    }

    pub fn to_set(&self) -> BTreeSet<String> {
        self.iter().map(str::to_string).collect()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}
