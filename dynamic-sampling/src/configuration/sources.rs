// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{fmt, str::FromStr};

use super::supported_configurations::SupportedConfigurations;

/// A raw value found for a key
pub(crate) trait ConfigurationSource {
    /// Shown in parse failures
    fn name(&self) -> &'static str;

    /// Returns `None` when the key is not set by this source
    fn lookup(&self, key: &'static str) -> Option<String>;
}

/// Process environment. Blank variables count as unset.
pub(crate) struct EnvSource;

impl ConfigurationSource for EnvSource {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn lookup(&self, key: &'static str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// A value that was set but could not be parsed
#[derive(Debug, PartialEq)]
pub(crate) struct ParseFailure {
    raw: String,
    expected: &'static str,
    reason: String,
    source: &'static str,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} from {} is not a valid {}: {}",
            self.raw, self.source, self.expected, self.reason
        )
    }
}

/// Outcome of resolving one key across every source
#[derive(Debug, PartialEq)]
pub(crate) struct Resolved<T> {
    pub name: SupportedConfigurations,
    pub value: Option<T>,
    /// Failures of the sources consulted before `value` was found
    pub errors: Vec<ParseFailure>,
}

/// Ordered list of sources, the first one has the highest precedence
pub(crate) struct CompositeSource {
    sources: Vec<Box<dyn ConfigurationSource>>,
}

impl CompositeSource {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn default_sources() -> Self {
        let mut sources = Self::new();
        sources.add_source(EnvSource);
        sources
    }

    pub fn add_source<S: ConfigurationSource + 'static>(&mut self, source: S) {
        self.sources.push(Box::new(source));
    }

    pub fn get(&self, name: SupportedConfigurations) -> Resolved<String> {
        self.get_parse(name)
    }

    /// Returns the first value of `name` that parses as `T`, walking the sources by precedence
    pub fn get_parse<T>(&self, name: SupportedConfigurations) -> Resolved<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let mut errors = Vec::new();
        for source in &self.sources {
            let Some(raw) = source.lookup(name.as_str()) else {
                continue;
            };
            match raw.parse::<T>() {
                Ok(value) => {
                    return Resolved {
                        name,
                        value: Some(value),
                        errors,
                    }
                }
                Err(e) => errors.push(ParseFailure {
                    raw,
                    expected: std::any::type_name::<T>(),
                    reason: e.to_string(),
                    source: source.name(),
                }),
            }
        }
        Resolved {
            name,
            value: None,
            errors,
        }
    }
}

/// In-memory source for tests
#[cfg(test)]
pub(crate) struct HashMapSource {
    map: std::collections::HashMap<String, String>,
    name: &'static str,
}

#[cfg(test)]
impl HashMapSource {
    pub(crate) fn from_iter<K, V, I>(entries: I, name: &'static str) -> Self
    where
        K: ToString,
        V: ToString,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            map: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            name,
        }
    }
}

#[cfg(test)]
impl ConfigurationSource for HashMapSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn lookup(&self, key: &'static str) -> Option<String> {
        self.map.get(key).cloned()
    }
}
