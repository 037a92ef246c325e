// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use url::Url;

use crate::{controller::ClientOptions, ds_info, log, sampler::TraceSampler, Config};

const DEFAULT_ENVIRONMENT: &str = "production";

/// Settings of the host tracing SDK the app key is derived from
#[derive(Debug, Clone, Default)]
pub struct HostOptions {
    /// DSN of the project, its last path segment is the project id
    pub dsn: Option<String>,
    /// Deployment environment, `production` when unset
    pub environment: Option<String>,
}

/// Key identifying this application on the controller: `{project_id}_{environment}_{process}`
pub fn build_app_key(dsn: &str, environment: &str) -> String {
    app_key(dsn, environment, &process_name())
}

fn app_key(dsn: &str, environment: &str, process: &str) -> String {
    let project_id = Url::parse(dsn)
        .ok()
        .and_then(|url| {
            url.path_segments()?
                .filter(|segment| !segment.is_empty())
                .last()
                .map(str::to_string)
        })
        .unwrap_or_default();
    format!("{project_id}_{environment}_{process}")
}

fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Sets up dynamic sampling for the host SDK.
///
/// Returns the process wide sampler to install as the SDK's sampling callback, or `None` when
/// no controller host is configured.
pub fn init(config: &Config, host: &HostOptions) -> Option<Arc<TraceSampler>> {
    log::set_max_level(config.log_level());
    if config.controller_host().is_none() {
        ds_info!("No sampling controller host configured, dynamic sampling is disabled");
        return None;
    }

    let app_key = build_app_key(
        host.dsn.as_deref().unwrap_or_default(),
        host.environment.as_deref().unwrap_or(DEFAULT_ENVIRONMENT),
    );
    ds_info!("Dynamic sampling enabled for {}", app_key);
    Some(TraceSampler::get_or_init(ClientOptions::from_config(
        config, app_key,
    )))
}

#[cfg(test)]
mod tests {
    use super::{app_key, init, HostOptions};
    use crate::{log::LevelFilter, sampler::TraceSampler, Config};

    #[test]
    fn test_app_key() {
        assert_eq!(
            app_key("http://test@test.test.fr/8528966559", "production", "python"),
            "8528966559_production_python"
        );
        assert_eq!(
            app_key("http://test@test.test.fr/1235", "dev", "celery"),
            "1235_dev_celery"
        );
        assert_eq!(
            app_key("https://key@o1.ingest.example.com/42/", "dev", "api"),
            "42_dev_api"
        );
        assert_eq!(app_key("not a dsn", "dev", "api"), "_dev_api");
    }

    #[test]
    #[serial_test::serial(sampler, log_level)]
    fn test_init_without_controller_host() {
        TraceSampler::clear();
        let config = Config::default();

        assert!(init(&config, &HostOptions::default()).is_none());
        assert!(TraceSampler::current().is_none());
    }

    #[test]
    #[serial_test::serial(sampler, log_level)]
    fn test_init() {
        TraceSampler::clear();
        let mut builder = Config::builder();
        builder
            .set_controller_host("http://controller.local".to_string())
            .set_log_level(LevelFilter::Error);
        let config = builder.build();

        let sampler = init(
            &config,
            &HostOptions {
                dsn: Some("http://key@sentry.local/7".to_string()),
                environment: Some("staging".to_string()),
            },
        )
        .unwrap();

        assert!(std::sync::Arc::ptr_eq(
            &sampler,
            &TraceSampler::current().unwrap()
        ));
        // the controller starts with the first decision
        assert!(!sampler.has_running_controller());
        TraceSampler::clear();
    }
}
