// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Mutex, thread};

use tokio_util::sync::CancellationToken;

use crate::{ds_error, error::ControllerError};

/// Owner side of a background thread stopped through a cancellation token.
///
/// Dropping the handle cancels the worker without waiting for it.
pub(crate) struct WorkerHandle {
    join_handle: Mutex<Option<thread::JoinHandle<()>>>,
    cancel_token: CancellationToken,
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.trigger_shutdown();
    }
}

impl WorkerHandle {
    /// Spawns `f` on a named thread. `f` must return soon after the token is cancelled.
    pub fn spawn<F>(name: &str, f: F) -> Result<Self, ControllerError>
    where
        F: FnOnce(CancellationToken) + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let worker_token = cancel_token.clone();
        let join_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(crate::log::with_local_logger(move || f(worker_token)))
            .map_err(|e| ControllerError::SpawnFailed(e.to_string()))?;
        Ok(Self {
            join_handle: Mutex::new(Some(join_handle)),
            cancel_token,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.join_handle
            .lock()
            .map(|h| h.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    pub fn trigger_shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Cancels the worker and blocks until its thread exited
    pub fn shutdown(&self) -> Result<(), ControllerError> {
        self.trigger_shutdown();
        let Some(handle) = self
            .join_handle
            .lock()
            .map_err(|_| {
                ds_error!("WorkerHandle.shutdown: handle mutex poisoned");
                ControllerError::HandleMutexPoisoned
            })?
            .take()
        else {
            return Ok(());
        };
        handle.join().map_err(|e| {
            let err = if let Some(e) = e.downcast_ref::<&'static str>() {
                e
            } else if let Some(e) = e.downcast_ref::<String>() {
                e
            } else {
                "unknown panic type"
            };
            ds_error!("WorkerHandle.shutdown: Worker panicked: {}", err);
            ControllerError::WorkerPanicked(err.to_string())
        })
    }
}
