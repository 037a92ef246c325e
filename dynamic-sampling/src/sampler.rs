// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    mem,
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde_json::Value;

use crate::{
    app_config::{clamp_sample_rate, AppConfig},
    constants::MIN_SAMPLE_RATE,
    controller::{ClientOptions, ControllerClient},
    ds_debug, ds_error, hooks,
    metrics::Metrics,
    transport::ControllerTransport,
};

/// What a sampling decision is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Context {
    /// An incoming request
    RequestTraffic {
        path: String,
        user_agent: Option<String>,
    },
    /// A background task
    TaskTraffic { task_name: String },
    Other,
}

impl Context {
    pub fn request(path: impl Into<String>, user_agent: Option<String>) -> Self {
        Context::RequestTraffic {
            path: path.into(),
            user_agent,
        }
    }

    pub fn task(task_name: impl Into<String>) -> Self {
        Context::TaskTraffic {
            task_name: task_name.into(),
        }
    }

    /// Resolves the sampling context handed out by the tracing SDK.
    ///
    /// Requests are recognized by `wsgi_environ.PATH_INFO` (with the optional
    /// `wsgi_environ.HTTP_USER_AGENT`), tasks by `celery_job.task`.
    pub fn from_sampling_context(ctx: &Value) -> Self {
        if let Some(path) = ctx.pointer("/wsgi_environ/PATH_INFO").and_then(Value::as_str) {
            let user_agent = ctx
                .pointer("/wsgi_environ/HTTP_USER_AGENT")
                .and_then(Value::as_str)
                .map(str::to_string);
            return Context::request(path, user_agent);
        }
        if let Some(task) = ctx.pointer("/celery_job/task").and_then(Value::as_str) {
            return Context::task(task);
        }
        Context::Other
    }
}

type ClientFactory = Box<dyn Fn() -> Arc<ControllerClient> + Send + Sync>;

struct OwnedController {
    client: Arc<ControllerClient>,
    /// Process that started the client's worker
    owner_pid: u32,
}

impl OwnedController {
    fn is_running(&self) -> bool {
        self.owner_pid == std::process::id() && self.client.is_alive()
    }

    fn stop(self) {
        if self.owner_pid != std::process::id() {
            // The worker thread only exists in the parent process, joining it here would hang
            ds_debug!("TraceSampler: abandoning controller of process {}", self.owner_pid);
            mem::forget(self.client);
            return;
        }
        if let Err(e) = self.client.kill() {
            ds_error!("TraceSampler: failed to stop controller: {}", e);
        }
    }
}

static SAMPLER: Mutex<Option<Arc<TraceSampler>>> = Mutex::new(None);

/// Process wide entry point of sampling decisions.
///
/// The sampler lazily starts a [`ControllerClient`] on the first decision, and starts a new one
/// when it finds the current one dead or inherited from a parent process.
pub struct TraceSampler {
    factory: ClientFactory,
    fallback_sample_rate: f64,
    controller: RwLock<Option<OwnedController>>,
}

impl TraceSampler {
    fn new(fallback_sample_rate: f64, factory: ClientFactory) -> Self {
        Self {
            factory,
            fallback_sample_rate: clamp_sample_rate(fallback_sample_rate)
                .unwrap_or(MIN_SAMPLE_RATE),
            controller: RwLock::new(None),
        }
    }

    /// Returns the process wide sampler, creating it from `options` if there is none.
    ///
    /// `options` are ignored when the sampler already exists.
    pub fn get_or_init(options: ClientOptions) -> Arc<Self> {
        let rate = options.default_sample_rate;
        Self::get_or_init_with(rate, move || {
            Arc::new(ControllerClient::new(options.clone()))
        })
    }

    /// Same as [`TraceSampler::get_or_init`] with a custom transport for the controllers
    pub fn get_or_init_with_transport(
        options: ClientOptions,
        transport: Arc<dyn ControllerTransport>,
    ) -> Arc<Self> {
        let rate = options.default_sample_rate;
        Self::get_or_init_with(rate, move || {
            Arc::new(ControllerClient::with_transport(
                options.clone(),
                transport.clone(),
            ))
        })
    }

    fn get_or_init_with<F>(fallback_sample_rate: f64, factory: F) -> Arc<Self>
    where
        F: Fn() -> Arc<ControllerClient> + Send + Sync + 'static,
    {
        let mut slot = SAMPLER.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sampler) = &*slot {
            return sampler.clone();
        }
        hooks::install_hooks();
        let sampler = Arc::new(Self::new(fallback_sample_rate, Box::new(factory)));
        *slot = Some(sampler.clone());
        sampler
    }

    /// The process wide sampler, if one was created
    pub fn current() -> Option<Arc<Self>> {
        SAMPLER.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Empties the process wide slot. The controller is killed once the last reference to the
    /// removed sampler is dropped.
    pub fn clear() {
        let previous = SAMPLER.lock().unwrap_or_else(|e| e.into_inner()).take();
        drop(previous);
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<OwnedController>> {
        self.controller.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<OwnedController>> {
        self.controller.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn has_running_controller(&self) -> bool {
        self.read().as_ref().is_some_and(OwnedController::is_running)
    }

    /// Makes sure a controller owned by this process is running
    pub fn ensure_controller(&self) {
        if self.has_running_controller() {
            return;
        }
        let stale = {
            let mut controller = self.write();
            if controller.as_ref().is_some_and(OwnedController::is_running) {
                return;
            }
            let client = (self.factory)();
            if let Err(e) = client.start() {
                ds_error!("TraceSampler: failed to start controller: {}", e);
            }
            controller.replace(OwnedController {
                client,
                owner_pid: std::process::id(),
            })
        };
        if let Some(stale) = stale {
            stale.stop();
        }
    }

    /// Sample rate, in percent, for the traffic described by `ctx`.
    ///
    /// Ignored paths and tasks get `0`. Other request paths and task names are
    /// counted in the metrics before the current sample rate is returned.
    pub fn decide(&self, ctx: &Context) -> f64 {
        self.ensure_controller();
        let controller = self.read();
        let Some(owned) = controller.as_ref() else {
            return self.fallback_sample_rate;
        };
        let app_config = owned.client.app_config();
        let metrics = owned.client.metrics();
        match ctx {
            Context::RequestTraffic { path, .. } => {
                if app_config.is_path_ignored(path) {
                    return 0.0;
                }
                metrics.count_path(path);
            }
            Context::TaskTraffic { task_name } => {
                if app_config.is_task_ignored(task_name) {
                    return 0.0;
                }
                metrics.count_task(task_name);
            }
            Context::Other => {}
        }
        app_config.sample_rate()
    }

    pub fn controller(&self) -> Option<Arc<ControllerClient>> {
        self.read().as_ref().map(|owned| owned.client.clone())
    }

    pub fn app_config(&self) -> Option<Arc<AppConfig>> {
        self.read()
            .as_ref()
            .map(|owned| owned.client.app_config().clone())
    }

    pub fn metrics(&self) -> Option<Arc<Metrics>> {
        self.read()
            .as_ref()
            .map(|owned| owned.client.metrics().clone())
    }

    /// Stops the controller and waits for its worker to exit. The next decision starts a new one.
    pub fn kill(&self) {
        let owned = self.write().take();
        if let Some(owned) = owned {
            owned.stop();
        }
    }

    #[cfg(test)]
    fn set_owner_pid(&self, pid: u32) {
        if let Some(owned) = self.write().as_mut() {
            owned.owner_pid = pid;
        }
    }
}

impl Drop for TraceSampler {
    fn drop(&mut self) {
        self.kill();
    }
}
