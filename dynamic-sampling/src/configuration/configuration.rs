// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{str::FromStr, time::Duration};

use super::sources::{CompositeSource, Resolved};
use super::supported_configurations::SupportedConfigurations;
use crate::{constants, ds_warn, log::LevelFilter};

#[derive(Debug, Clone)]
#[non_exhaustive]
/// Process-wide defaults for the sampling controller client
///
/// # Usage
/// ```
/// use dynamic_sampling::Config;
///
/// // This pulls configuration from the environment
/// let mut builder = Config::builder();
///
/// // Manual overrides
/// builder
///     .set_controller_host("http://controller.local".to_string())
///     .set_default_sample_rate(10.0);
///
/// let config = builder.build();
/// assert_eq!(
///     config.controller_endpoint().as_deref(),
///     Some("http://controller.local/sentry/apps/{}/")
/// );
/// ```
pub struct Config {
    // # Controller
    /// Base url of the controller. The client is disabled when this is not set
    controller_host: Option<String>,
    /// Path template of the config endpoint, `{}` is replaced by the app key
    controller_path: String,
    /// Path template of the metric endpoint, `{}` are replaced by the app key and metric type
    metric_path: String,
    poll_interval: Duration,
    metric_interval: Duration,

    // # Sampling
    /// Sample rate used until the controller answers
    default_sample_rate: f64,
    default_ignored_paths: Vec<String>,
    default_ignored_tasks: Vec<String>,

    /// The log level of the library
    log_level: LevelFilter,
}

/// Wrapper to parse "," separated string to vector
struct CommaSeparated(Vec<String>);

impl FromStr for CommaSeparated {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(CommaSeparated(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ))
    }
}

/// Interval expressed in (possibly fractional) seconds
struct Seconds(Duration);

impl FromStr for Seconds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs = s.trim().parse::<f64>().map_err(|e| e.to_string())?;
        Duration::try_from_secs_f64(secs)
            .map(Seconds)
            .map_err(|e| e.to_string())
    }
}

impl Config {
    fn from_sources(sources: &CompositeSource) -> Self {
        let default = Config::default();

        /// Keeps the resolved value, reporting the values that
        /// could not be parsed
        fn to_val<T>(res: Resolved<T>) -> Option<T> {
            for error in &res.errors {
                ds_warn!("Ignoring {}: {}", res.name.as_str(), error);
            }
            res.value
        }

        use SupportedConfigurations as C;
        Self {
            controller_host: to_val(sources.get(C::SAMPLING_CONTROLLER_HOST))
                .or(default.controller_host),
            controller_path: to_val(sources.get(C::SAMPLING_CONTROLLER_PATH))
                .unwrap_or(default.controller_path),
            metric_path: to_val(sources.get(C::SAMPLING_CONTROLLER_METRIC_PATH))
                .unwrap_or(default.metric_path),
            poll_interval: to_val(sources.get_parse::<Seconds>(C::SAMPLING_CONTROLLER_POLL_INTERVAL))
                .map(|Seconds(d)| d)
                .unwrap_or(default.poll_interval),
            metric_interval: to_val(
                sources.get_parse::<Seconds>(C::SAMPLING_CONTROLLER_METRIC_INTERVAL),
            )
            .map(|Seconds(d)| d)
            .unwrap_or(default.metric_interval),
            default_sample_rate: to_val(
                sources.get_parse::<f64>(C::SAMPLING_CONTROLLER_DEFAULT_SAMPLE_RATE),
            )
            .unwrap_or(default.default_sample_rate),
            default_ignored_paths: to_val(
                sources.get_parse::<CommaSeparated>(C::SAMPLING_CONTROLLER_IGNORED_PATHS),
            )
            .map(|CommaSeparated(paths)| paths)
            .unwrap_or(default.default_ignored_paths),
            default_ignored_tasks: to_val(
                sources.get_parse::<CommaSeparated>(C::SAMPLING_CONTROLLER_IGNORED_TASKS),
            )
            .map(|CommaSeparated(tasks)| tasks)
            .unwrap_or(default.default_ignored_tasks),
            log_level: to_val(sources.get_parse(C::SAMPLING_CONTROLLER_LOG_LEVEL))
                .unwrap_or(default.log_level),
        }
    }

    fn builder_with_sources(sources: &CompositeSource) -> ConfigBuilder {
        ConfigBuilder {
            config: Config::from_sources(sources),
        }
    }

    /// Creates a new builder to set overrides detected configuration
    pub fn builder() -> ConfigBuilder {
        Self::builder_with_sources(&CompositeSource::default_sources())
    }

    pub fn controller_host(&self) -> Option<&str> {
        self.controller_host.as_deref()
    }

    pub fn controller_path(&self) -> &str {
        &self.controller_path
    }

    pub fn metric_path(&self) -> &str {
        &self.metric_path
    }

    /// Full config endpoint template, if a controller host is configured
    pub fn controller_endpoint(&self) -> Option<String> {
        self.controller_host
            .as_deref()
            .map(|host| join_url(host, &self.controller_path))
    }

    /// Full metric endpoint template, if a controller host is configured
    pub fn metric_endpoint(&self) -> Option<String> {
        self.controller_host
            .as_deref()
            .map(|host| join_url(host, &self.metric_path))
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn metric_interval(&self) -> Duration {
        self.metric_interval
    }

    pub fn default_sample_rate(&self) -> f64 {
        self.default_sample_rate
    }

    pub fn default_ignored_paths(&self) -> impl Iterator<Item = &str> {
        self.default_ignored_paths.iter().map(String::as_str)
    }

    pub fn default_ignored_tasks(&self) -> impl Iterator<Item = &str> {
        self.default_ignored_tasks.iter().map(String::as_str)
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }
}

fn join_url(host: &str, path: &str) -> String {
    format!(
        "{}/{}",
        host.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl Default for Config {
    fn default() -> Self {
        Config {
            controller_host: None,
            controller_path: constants::DEFAULT_CONTROLLER_PATH.to_string(),
            metric_path: constants::DEFAULT_METRIC_PATH.to_string(),
            poll_interval: constants::DEFAULT_POLL_INTERVAL,
            metric_interval: constants::DEFAULT_METRIC_INTERVAL,
            default_sample_rate: constants::DEFAULT_SAMPLE_RATE,
            default_ignored_paths: constants::DEFAULT_IGNORED_PATHS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_ignored_tasks: constants::DEFAULT_IGNORED_TASKS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            log_level: LevelFilter::default(),
        }
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Finalizes the builder and returns the configuration
    pub fn build(self) -> Config {
        self.config
    }

    pub fn set_controller_host(&mut self, host: String) -> &mut Self {
        self.config.controller_host = Some(host);
        self
    }

    pub fn set_controller_path(&mut self, path: String) -> &mut Self {
        self.config.controller_path = path;
        self
    }

    pub fn set_metric_path(&mut self, path: String) -> &mut Self {
        self.config.metric_path = path;
        self
    }

    pub fn set_poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn set_metric_interval(&mut self, interval: Duration) -> &mut Self {
        self.config.metric_interval = interval;
        self
    }

    pub fn set_default_sample_rate(&mut self, rate: f64) -> &mut Self {
        self.config.default_sample_rate = rate;
        self
    }

    pub fn set_default_ignored_paths(&mut self, paths: Vec<String>) -> &mut Self {
        self.config.default_ignored_paths = paths;
        self
    }

    pub fn set_default_ignored_tasks(&mut self, tasks: Vec<String>) -> &mut Self {
        self.config.default_ignored_tasks = tasks;
        self
    }

    pub fn set_log_level(&mut self, log_level: LevelFilter) -> &mut Self {
        self.config.log_level = log_level;
        self
    }
}
