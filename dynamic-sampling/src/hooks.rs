// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process exit wiring.
//!
//! The first [`TraceSampler`] of the process installs an interrupt handler, and connects to the
//! task worker shutdown event when the host registered one with [`set_worker_shutdown_hook`].
//! Both end up calling [`teardown`].

use std::sync::{Once, OnceLock};

use crate::{constants::INTERRUPTED_EXIT_CODE, ds_debug, ds_info, ds_warn, sampler::TraceSampler};

/// Shutdown event of the host's task worker
pub trait WorkerShutdownHook: Send + Sync {
    /// Arranges for `teardown` to run when the worker shuts down
    fn connect(&self, teardown: fn());
}

static WORKER_SHUTDOWN_HOOK: OnceLock<Box<dyn WorkerShutdownHook>> = OnceLock::new();

/// Registers the task worker shutdown event.
///
/// Must be called before the sampler is first created to take effect. Returns `false` if a
/// hook was already registered.
pub fn set_worker_shutdown_hook(hook: Box<dyn WorkerShutdownHook>) -> bool {
    WORKER_SHUTDOWN_HOOK.set(hook).is_ok()
}

/// Kills the controller of the process wide sampler, if any
pub fn teardown() {
    if let Some(sampler) = TraceSampler::current() {
        ds_debug!("teardown: stopping sampling controller");
        sampler.kill();
    }
}

fn on_interrupt() {
    teardown();
    std::process::exit(INTERRUPTED_EXIT_CODE);
}

pub(crate) fn connect_worker_shutdown(hook: Option<&dyn WorkerShutdownHook>) -> bool {
    match hook {
        Some(hook) => {
            hook.connect(teardown);
            true
        }
        None => {
            ds_debug!("No worker shutdown hook registered, skipping");
            false
        }
    }
}

pub(crate) fn install_hooks() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        if let Err(e) = ctrlc::set_handler(on_interrupt) {
            ds_warn!("Failed to install interrupt handler: {}", e);
        }
        if connect_worker_shutdown(WORKER_SHUTDOWN_HOOK.get().map(|h| h.as_ref())) {
            ds_info!("Connected teardown to the worker shutdown hook");
        }
    });
}
