// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

pub const DEFAULT_SAMPLE_RATE: f64 = 0.0;
pub const MIN_SAMPLE_RATE: f64 = 0.0;
pub const MAX_SAMPLE_RATE: f64 = 100.0;

pub const DEFAULT_IGNORED_PATHS: &[&str] = &["/health", "/healthz", "/health/", "/healthz/"];
pub const DEFAULT_IGNORED_TASKS: &[&str] = &["celery.backend_cleanup"];

pub const DEFAULT_CONTROLLER_PATH: &str = "/sentry/apps/{}/";
pub const DEFAULT_METRIC_PATH: &str = "/sentry/apps/{}/metrics/{}/";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(600);

/// Cadence at which the worker loop checks for due jobs
pub const SCHEDULER_TICK: Duration = Duration::from_millis(250);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Exit status used after tearing down on an interrupt (128 + SIGINT)
pub const INTERRUPTED_EXIT_CODE: i32 = 130;
