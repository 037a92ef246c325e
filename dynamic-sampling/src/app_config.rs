// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard},
};

use serde::{Deserialize, Deserializer};

use crate::{
    constants::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE},
    ds_warn,
    patterns::IgnorePatterns,
    Config,
};

/// Configuration document served by the controller.
///
/// Every field is optional; absent (or null) fields leave the current value untouched and
/// unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub active_sample_rate: Option<f64>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub wsgi_ignore_path: Option<Vec<String>>,
    #[serde(default, deserialize_with = "scalar_list")]
    pub celery_ignore_task: Option<Vec<String>>,
    #[serde(default)]
    pub wsgi_collect_metrics: Option<bool>,
    #[serde(default)]
    pub celery_collect_metrics: Option<bool>,
}

// Ignore lists may contain numbers or booleans, which are matched through their text form
fn scalar_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    use serde_json::Value;

    let Some(values) = Option::<Vec<Value>>::deserialize(deserializer)? else {
        return Ok(None);
    };
    values
        .into_iter()
        .map(|value| match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(D::Error::custom(format!(
                "ignore patterns must be scalars, got {other}"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

#[derive(Debug, Clone)]
struct AppConfigInner {
    sample_rate: f64,
    ignored_paths: IgnorePatterns,
    ignored_tasks: IgnorePatterns,
    ignored_user_agents: IgnorePatterns,
}

/// Sampling parameters shared between the decision callers and the controller worker.
///
/// Every read and every write goes through a single lock, so readers never observe a
/// partially written field.
#[derive(Debug)]
pub struct AppConfig {
    inner: Mutex<AppConfigInner>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AppConfig {
    pub fn new<P, T>(sample_rate: f64, ignored_paths: P, ignored_tasks: T) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            inner: Mutex::new(AppConfigInner {
                sample_rate: clamp_sample_rate(sample_rate).unwrap_or(MIN_SAMPLE_RATE),
                ignored_paths: IgnorePatterns::set(ignored_paths),
                ignored_tasks: IgnorePatterns::set(ignored_tasks),
                ignored_user_agents: IgnorePatterns::default(),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.default_sample_rate(),
            config.default_ignored_paths(),
            config.default_ignored_tasks(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, AppConfigInner> {
        // The guarded data is plain values, a panic while holding the lock can't leave it torn
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sample_rate(&self) -> f64 {
        self.lock().sample_rate
    }

    /// Sets the sample rate, clamped to `[0, 100]`. NaN is rejected and leaves the rate unchanged.
    pub fn set_sample_rate(&self, sample_rate: f64) {
        if let Some(rate) = clamp_sample_rate(sample_rate) {
            self.lock().sample_rate = rate;
        }
    }

    pub fn ignored_paths(&self) -> BTreeSet<String> {
        self.lock().ignored_paths.to_set()
    }

    pub fn set_ignored_paths<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths = IgnorePatterns::set(paths);
        self.lock().ignored_paths = paths;
    }

    pub fn ignored_tasks(&self) -> BTreeSet<String> {
        self.lock().ignored_tasks.to_set()
    }

    pub fn set_ignored_tasks<I, S>(&self, tasks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tasks = IgnorePatterns::set(tasks);
        self.lock().ignored_tasks = tasks;
    }

    pub fn ignored_user_agents(&self) -> Vec<String> {
        self.lock().ignored_user_agents.to_vec()
    }

    pub fn set_ignored_user_agents<I, S>(&self, user_agents: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let user_agents = IgnorePatterns::sequence(user_agents);
        self.lock().ignored_user_agents = user_agents;
    }

    pub fn is_path_ignored(&self, path: &str) -> bool {
        self.lock().ignored_paths.is_match(path)
    }

    pub fn is_task_ignored(&self, task: &str) -> bool {
        self.lock().ignored_tasks.is_match(task)
    }

    pub fn is_user_agent_ignored(&self, user_agent: &str) -> bool {
        self.lock().ignored_user_agents.is_match(user_agent)
    }

    /// Applies the fields present in a controller document.
    ///
    /// Patterns are compiled before the lock is taken, then all present fields are written
    /// under one acquisition.
    pub fn update(&self, document: &RemoteConfig) {
        let sample_rate = document.active_sample_rate.and_then(clamp_sample_rate);
        let ignored_paths = document
            .wsgi_ignore_path
            .as_ref()
            .map(|paths| IgnorePatterns::set(paths.iter().cloned()));
        let ignored_tasks = document
            .celery_ignore_task
            .as_ref()
            .map(|tasks| IgnorePatterns::set(tasks.iter().cloned()));

        let mut inner = self.lock();
        if let Some(rate) = sample_rate {
            inner.sample_rate = rate;
        }
        if let Some(paths) = ignored_paths {
            inner.ignored_paths = paths;
        }
        if let Some(tasks) = ignored_tasks {
            inner.ignored_tasks = tasks;
        }
    }
}

pub(crate) fn clamp_sample_rate(rate: f64) -> Option<f64> {
    if rate.is_nan() {
        ds_warn!("AppConfig: ignoring NaN sample rate");
        return None;
    }
    Some(rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE))
}
