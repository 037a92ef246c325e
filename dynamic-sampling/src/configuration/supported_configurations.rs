// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Every configuration key read from the environment
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedConfigurations {
    SAMPLING_CONTROLLER_HOST,
    SAMPLING_CONTROLLER_PATH,
    SAMPLING_CONTROLLER_METRIC_PATH,
    SAMPLING_CONTROLLER_POLL_INTERVAL,
    SAMPLING_CONTROLLER_METRIC_INTERVAL,
    SAMPLING_CONTROLLER_DEFAULT_SAMPLE_RATE,
    SAMPLING_CONTROLLER_IGNORED_PATHS,
    SAMPLING_CONTROLLER_IGNORED_TASKS,
    SAMPLING_CONTROLLER_LOG_LEVEL,
}

impl SupportedConfigurations {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SAMPLING_CONTROLLER_HOST => "SAMPLING_CONTROLLER_HOST",
            Self::SAMPLING_CONTROLLER_PATH => "SAMPLING_CONTROLLER_PATH",
            Self::SAMPLING_CONTROLLER_METRIC_PATH => "SAMPLING_CONTROLLER_METRIC_PATH",
            Self::SAMPLING_CONTROLLER_POLL_INTERVAL => "SAMPLING_CONTROLLER_POLL_INTERVAL",
            Self::SAMPLING_CONTROLLER_METRIC_INTERVAL => "SAMPLING_CONTROLLER_METRIC_INTERVAL",
            Self::SAMPLING_CONTROLLER_DEFAULT_SAMPLE_RATE => {
                "SAMPLING_CONTROLLER_DEFAULT_SAMPLE_RATE"
            }
            Self::SAMPLING_CONTROLLER_IGNORED_PATHS => "SAMPLING_CONTROLLER_IGNORED_PATHS",
            Self::SAMPLING_CONTROLLER_IGNORED_TASKS => "SAMPLING_CONTROLLER_IGNORED_TASKS",
            Self::SAMPLING_CONTROLLER_LOG_LEVEL => "SAMPLING_CONTROLLER_LOG_LEVEL",
        }
    }
}
