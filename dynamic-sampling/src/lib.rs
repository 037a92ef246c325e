// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runtime adjustable trace sampling driven by a remote controller.
//!
//! A [`TraceSampler`] answers the host tracing SDK's sampling decisions from an [`AppConfig`]
//! that a background [`ControllerClient`] keeps in sync with the controller, and counts the
//! observed traffic in [`Metrics`] that are periodically pushed back to it.

pub mod app_config;
pub mod configuration;
pub mod constants;
pub mod controller;
pub mod hooks;
pub mod metrics;
pub mod patterns;
pub mod sampler;
pub mod transport;

mod error;
mod init;
mod worker;

pub mod log;

#[cfg(test)]
mod test_utils;

pub use app_config::{AppConfig, RemoteConfig};
pub use configuration::Config;
pub use controller::{ClientOptions, ControllerClient};
pub use error::ControllerError;
pub use hooks::{set_worker_shutdown_hook, teardown, WorkerShutdownHook};
pub use init::{build_app_key, init, HostOptions};
pub use metrics::{MetricType, Metrics};
pub use sampler::{Context, TraceSampler};
