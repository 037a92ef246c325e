// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    mem,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use hyper::body::Bytes;
use tokio_util::sync::CancellationToken;

use crate::{
    app_config::{AppConfig, RemoteConfig},
    constants::{REQUEST_TIMEOUT, SCHEDULER_TICK},
    ds_debug, ds_error, ds_warn,
    error::ControllerError,
    metrics::{MetricType, Metrics},
    transport::{ControllerTransport, HyperTransport},
    Config,
};

/// Settings of a [`ControllerClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    pub poll_interval: Duration,
    pub metric_interval: Duration,
    /// Config endpoint template, `{}` is replaced by the app key
    pub controller_endpoint: String,
    /// Metric endpoint template, the two `{}` are replaced by the app key and the metric type
    pub metric_endpoint: String,
    pub app_key: String,
    /// How often the worker checks for due jobs
    pub tick: Duration,
    pub request_timeout: Duration,
    pub default_sample_rate: f64,
    pub default_ignored_paths: Vec<String>,
    pub default_ignored_tasks: Vec<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&Config::default(), String::new())
    }
}

impl ClientOptions {
    /// Options derived from the process configuration.
    ///
    /// Without a controller host the endpoints are the bare path templates.
    pub fn from_config(config: &Config, app_key: String) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            metric_interval: config.metric_interval(),
            controller_endpoint: config
                .controller_endpoint()
                .unwrap_or_else(|| config.controller_path().to_string()),
            metric_endpoint: config
                .metric_endpoint()
                .unwrap_or_else(|| config.metric_path().to_string()),
            app_key,
            tick: SCHEDULER_TICK,
            request_timeout: REQUEST_TIMEOUT,
            default_sample_rate: config.default_sample_rate(),
            default_ignored_paths: config.default_ignored_paths().map(str::to_string).collect(),
            default_ignored_tasks: config.default_ignored_tasks().map(str::to_string).collect(),
        }
    }

    pub fn config_url(&self) -> String {
        format_endpoint(&self.controller_endpoint, &[&self.app_key])
    }

    pub fn metric_url(&self, kind: MetricType) -> String {
        format_endpoint(&self.metric_endpoint, &[&self.app_key, kind.as_str()])
    }
}

/// Substitutes each `{}` of `template` with the next argument.
///
/// Placeholders without a matching argument are left as is.
pub fn format_endpoint(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("{}") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(arg),
            None => out.push_str("{}"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    RefreshConfig,
    PushMetrics,
}

#[derive(Debug)]
struct PeriodicJob {
    job: Job,
    interval: Duration,
    next_run: Instant,
}

/// Due date of a job run `interval` after `now`. Intervals too large to be represented are
/// capped, the job then never comes due in practice.
fn next_run(now: Instant, interval: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
    now.checked_add(interval)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Two independent timers. A job is due once its interval elapsed since it last finished.
#[derive(Debug)]
struct Schedule {
    jobs: [PeriodicJob; 2],
}

impl Schedule {
    fn new(now: Instant, poll_interval: Duration, metric_interval: Duration) -> Self {
        Self {
            jobs: [
                PeriodicJob {
                    job: Job::RefreshConfig,
                    interval: poll_interval,
                    next_run: next_run(now, poll_interval),
                },
                PeriodicJob {
                    job: Job::PushMetrics,
                    interval: metric_interval,
                    next_run: next_run(now, metric_interval),
                },
            ],
        }
    }

    fn due(&self, now: Instant) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|j| j.next_run <= now)
            .map(|j| j.job)
            .collect()
    }

    fn completed(&mut self, job: Job, now: Instant) {
        if let Some(j) = self.jobs.iter_mut().find(|j| j.job == job) {
            j.next_run = next_run(now, j.interval);
        }
    }
}

struct ClientShared {
    options: ClientOptions,
    app_config: Arc<AppConfig>,
    metrics: Arc<Metrics>,
    transport: Arc<dyn ControllerTransport>,
}

impl ClientShared {
    async fn update_config(&self) -> Result<(), ControllerError> {
        let url = self.options.config_url();
        let response = match self.transport.get(&url, self.options.request_timeout).await {
            Ok(response) => response,
            Err(e) => {
                ds_warn!("ControllerClient: failed to fetch config from {}: {}", url, e);
                return Ok(());
            }
        };
        if response.from_cache {
            ds_debug!("ControllerClient: config from {} is unchanged", url);
            return Ok(());
        }

        let document: RemoteConfig = serde_json::from_slice(&response.body)
            .map_err(|e| ControllerError::MalformedConfig(e.to_string()))?;
        self.app_config.update(&document);
        if let Some(enabled) = document.wsgi_collect_metrics {
            self.metrics.set_mode(MetricType::Wsgi, enabled);
        }
        if let Some(enabled) = document.celery_collect_metrics {
            self.metrics.set_mode(MetricType::Celery, enabled);
        }
        ds_debug!("ControllerClient: applied config from {}", url);
        Ok(())
    }

    async fn update_metrics(&self) {
        for (kind, counts) in self.metrics.drain() {
            let url = self.options.metric_url(kind);
            let body = match serde_json::to_vec(&counts) {
                Ok(body) => Bytes::from(body),
                Err(e) => {
                    ds_error!("ControllerClient: failed to serialize {} metrics: {}", kind, e);
                    continue;
                }
            };
            match self
                .transport
                .post(&url, body, self.options.request_timeout)
                .await
            {
                Ok(()) => ds_debug!("ControllerClient: pushed {} metrics", kind),
                Err(e) => ds_warn!("ControllerClient: failed to push metrics to {}: {}", url, e),
            }
        }
    }

    async fn run_job(&self, job: Job) {
        match job {
            Job::RefreshConfig => {
                if let Err(e) = self.update_config().await {
                    ds_warn!("ControllerClient: {}", e);
                }
            }
            Job::PushMetrics => self.update_metrics().await,
        }
    }

    fn run(self: Arc<Self>, cancel_token: CancellationToken) {
        ds_debug!("ControllerClient: started worker for {}", self.options.app_key);

        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                ds_error!("ControllerClient: failed to create Tokio runtime: {}", e);
                return;
            }
        };

        rt.block_on(async {
            let mut schedule = Schedule::new(
                Instant::now(),
                self.options.poll_interval,
                self.options.metric_interval,
            );
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = tokio::time::sleep(self.options.tick) => {}
                }
                // Jobs run to completion, cancellation is only observed between ticks
                for job in schedule.due(Instant::now()) {
                    self.run_job(job).await;
                    schedule.completed(job, Instant::now());
                }
            }
        });
        ds_debug!("ControllerClient: worker stopped");
    }
}

enum WorkerState {
    Idle,
    Running(crate::worker::WorkerHandle),
    Stopped,
}

/// Background poller keeping an [`AppConfig`] in sync with the controller and reporting
/// [`Metrics`] to it.
///
/// A client runs at most one worker in its lifetime: once killed it cannot be started again.
pub struct ControllerClient {
    shared: Arc<ClientShared>,
    worker: Mutex<WorkerState>,
}

impl ControllerClient {
    pub fn new(options: ClientOptions) -> Self {
        Self::with_transport(options, Arc::new(HyperTransport::new()))
    }

    pub fn with_transport(options: ClientOptions, transport: Arc<dyn ControllerTransport>) -> Self {
        let app_config = AppConfig::new(
            options.default_sample_rate,
            options.default_ignored_paths.iter().cloned(),
            options.default_ignored_tasks.iter().cloned(),
        );
        Self {
            shared: Arc::new(ClientShared {
                options,
                app_config: Arc::new(app_config),
                metrics: Arc::new(Metrics::new()),
                transport,
            }),
            worker: Mutex::new(WorkerState::Idle),
        }
    }

    fn worker(&self) -> MutexGuard<'_, WorkerState> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn options(&self) -> &ClientOptions {
        &self.shared.options
    }

    pub fn app_config(&self) -> &Arc<AppConfig> {
        &self.shared.app_config
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.shared.metrics
    }

    /// Spawns the worker thread
    pub fn start(&self) -> Result<(), ControllerError> {
        let mut worker = self.worker();
        match *worker {
            WorkerState::Idle => {}
            WorkerState::Running(_) => return Err(ControllerError::AlreadyStarted),
            WorkerState::Stopped => return Err(ControllerError::Stopped),
        }
        let shared = self.shared.clone();
        let handle = crate::worker::WorkerHandle::spawn("sampling-controller", move |token| {
            shared.run(token)
        })?;
        *worker = WorkerState::Running(handle);
        Ok(())
    }

    pub fn is_alive(&self) -> bool {
        match &*self.worker() {
            WorkerState::Running(handle) => handle.is_alive(),
            _ => false,
        }
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// Does nothing if the worker was never started.
    pub fn kill(&self) -> Result<(), ControllerError> {
        let handle = {
            let mut worker = self.worker();
            match mem::replace(&mut *worker, WorkerState::Stopped) {
                WorkerState::Running(handle) => handle,
                previous => {
                    *worker = previous;
                    return Ok(());
                }
            }
        };
        // joined outside the lock so `is_alive` never blocks on a stopping worker
        handle.shutdown()
    }

    /// Fetches the config document once and applies it
    pub async fn update_config(&self) -> Result<(), ControllerError> {
        self.shared.update_config().await
    }

    /// Drains the metrics and pushes every metric type that has counts
    pub async fn update_metrics(&self) {
        self.shared.update_metrics().await
    }
}

impl Drop for ControllerClient {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            ds_error!("ControllerClient: failed to stop worker: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeSet,
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use super::{format_endpoint, ClientOptions, ControllerClient, Job, Schedule};
    use crate::{
        error::ControllerError,
        log::{test_logger, Level},
        metrics::MetricType,
        test_utils::{MockResponse, MockTransport},
        Config,
    };

    fn has_warning(logs: &[(Level, String)], needle: &str) -> bool {
        logs.iter()
            .any(|(lvl, msg)| *lvl == Level::Warn && msg.contains(needle))
    }

    const DOCUMENT: &str = r#"{
        "active_sample_rate": 20,
        "wsgi_ignore_path": [1, 2],
        "celery_ignore_task": [1, 2],
        "celery_collect_metrics": true,
        "wsgi_collect_metrics": true
    }"#;

    fn options() -> ClientOptions {
        ClientOptions {
            controller_endpoint: "/route/{}/".to_string(),
            metric_endpoint: "/route/{}/{}/".to_string(),
            app_key: "1".to_string(),
            ..Default::default()
        }
    }

    fn client() -> (ControllerClient, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        (
            ControllerClient::with_transport(options(), transport.clone()),
            transport,
        )
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_endpoint() {
        assert_eq!(format_endpoint("/route/{}/", &["1"]), "/route/1/");
        assert_eq!(
            format_endpoint("http://c/apps/{}/metrics/{}/", &["k", "wsgi"]),
            "http://c/apps/k/metrics/wsgi/"
        );
        assert_eq!(format_endpoint("/{}/{}/", &["a"]), "/a/{}/");
        assert_eq!(format_endpoint("/static/", &["a"]), "/static/");
    }

    #[test]
    fn test_options_from_config() {
        let mut builder = Config::builder();
        builder.set_controller_host("http://controller/".to_string());
        let options = ClientOptions::from_config(&builder.build(), "42_prod_app".to_string());
        assert_eq!(options.config_url(), "http://controller/sentry/apps/42_prod_app/");
        assert_eq!(
            options.metric_url(MetricType::Celery),
            "http://controller/sentry/apps/42_prod_app/metrics/celery/"
        );
    }

    #[tokio::test]
    async fn test_update_config() {
        let (c, transport) = client();
        transport.push_response(MockResponse::Body(DOCUMENT));

        c.update_config().await.unwrap();

        assert_eq!(transport.gets(), vec!["/route/1/"]);
        assert_eq!(c.app_config().sample_rate(), 20.0);
        assert_eq!(c.app_config().ignored_paths(), set(&["1", "2"]));
        assert_eq!(c.app_config().ignored_tasks(), set(&["1", "2"]));
        assert!(c.metrics().mode(MetricType::Celery));
        assert!(c.metrics().mode(MetricType::Wsgi));
    }

    #[tokio::test]
    async fn test_update_config_transport_error() {
        let _guard = test_logger::activate_test_logger();
        let (c, transport) = client();
        transport.push_response(MockResponse::Fail);
        let before = c.app_config().ignored_paths();

        c.update_config().await.unwrap();

        assert_eq!(transport.gets().len(), 1);
        assert_eq!(c.app_config().sample_rate(), 0.0);
        assert_eq!(c.app_config().ignored_paths(), before);
        assert!(!c.metrics().mode(MetricType::Wsgi));

        let logs = test_logger::take_test_logs().unwrap();
        assert!(
            has_warning(&logs, "failed to fetch config from /route/1/"),
            "{logs:?}"
        );
    }

    #[tokio::test]
    async fn test_update_config_from_cache() {
        let (c, transport) = client();
        transport.push_response(MockResponse::NotModified(DOCUMENT));

        c.update_config().await.unwrap();

        assert_eq!(transport.gets().len(), 1);
        assert_eq!(c.app_config().sample_rate(), 0.0);
        assert!(!c.metrics().mode(MetricType::Celery));
    }

    #[tokio::test]
    async fn test_update_config_malformed() {
        let (c, transport) = client();
        transport.push_response(MockResponse::Body("{not json"));

        assert!(matches!(
            c.update_config().await,
            Err(ControllerError::MalformedConfig(_))
        ));
        assert_eq!(c.app_config().sample_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_update_metrics() {
        let (c, transport) = client();
        c.metrics().set_mode(MetricType::Celery, true);
        c.metrics().set_mode(MetricType::Wsgi, true);
        c.metrics().count_path("/test/");
        c.metrics().count_task("run");

        c.update_metrics().await;

        assert_eq!(
            transport.posts(),
            vec![
                (
                    "/route/1/wsgi/".to_string(),
                    serde_json::json!({"path": {"/test/": 1}})
                ),
                (
                    "/route/1/celery/".to_string(),
                    serde_json::json!({"task": {"run": 1}})
                ),
            ]
        );

        // nothing new to report
        c.update_metrics().await;
        assert_eq!(transport.posts().len(), 2);
    }

    #[tokio::test]
    async fn test_update_metrics_failure_does_not_stop_other_kinds() {
        let (c, transport) = client();
        transport.fail_posts_to("/wsgi/").fail_posts_to("/celery/");
        c.metrics().set_mode(MetricType::Celery, true);
        c.metrics().set_mode(MetricType::Wsgi, true);
        c.metrics().count_path("/test/");
        c.metrics().count_task("run");

        let _guard = test_logger::activate_test_logger();
        c.update_metrics().await;

        assert_eq!(transport.posts().len(), 2);
        let logs = test_logger::take_test_logs().unwrap();
        assert!(
            has_warning(&logs, "failed to push metrics to /route/1/wsgi/"),
            "{logs:?}"
        );
        assert!(
            has_warning(&logs, "failed to push metrics to /route/1/celery/"),
            "{logs:?}"
        );
    }

    #[test]
    fn test_kill_not_running() {
        let (c, _) = client();
        assert!(!c.is_alive());
        c.kill().unwrap();
        assert!(!c.is_alive());
        // never started, so still startable
        c.start().unwrap();
        c.kill().unwrap();
    }

    #[test]
    fn test_run_and_kill() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(MockResponse::Body(DOCUMENT));
        let c = ControllerClient::with_transport(
            ClientOptions {
                poll_interval: Duration::from_millis(20),
                metric_interval: Duration::from_millis(20),
                tick: Duration::from_millis(5),
                ..options()
            },
            transport.clone(),
        );

        c.start().unwrap();
        assert!(c.is_alive());
        assert_eq!(c.start(), Err(ControllerError::AlreadyStarted));

        let deadline = Instant::now() + Duration::from_secs(5);
        while c.app_config().sample_rate() != 20.0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(c.app_config().sample_rate(), 20.0);

        c.kill().unwrap();
        assert!(!c.is_alive());
        let gets = transport.gets().len();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(transport.gets().len(), gets);

        assert_eq!(c.start(), Err(ControllerError::Stopped));
        c.kill().unwrap();
    }

    #[test]
    fn test_run_with_unbounded_intervals() {
        let transport = Arc::new(MockTransport::new());
        let c = ControllerClient::with_transport(
            ClientOptions {
                poll_interval: Duration::MAX,
                metric_interval: Duration::from_secs(u64::MAX / 2),
                tick: Duration::from_millis(5),
                ..options()
            },
            transport.clone(),
        );

        c.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(c.is_alive());
        assert!(transport.gets().is_empty());
        c.kill().unwrap();
        assert!(!c.is_alive());
    }

    #[test]
    fn test_schedule() {
        let start = Instant::now();
        let mut schedule = Schedule::new(start, Duration::from_secs(60), Duration::from_secs(600));

        assert!(schedule.due(start).is_empty());
        assert_eq!(
            schedule.due(start + Duration::from_secs(60)),
            vec![Job::RefreshConfig]
        );

        let finished = start + Duration::from_secs(61);
        schedule.completed(Job::RefreshConfig, finished);
        assert!(schedule.due(start + Duration::from_secs(120)).is_empty());
        assert_eq!(
            schedule.due(finished + Duration::from_secs(60)),
            vec![Job::RefreshConfig]
        );
        assert_eq!(
            schedule.due(start + Duration::from_secs(600)),
            vec![Job::RefreshConfig, Job::PushMetrics]
        );
    }

    #[test]
    fn test_schedule_unbounded_interval() {
        let start = Instant::now();
        let mut schedule = Schedule::new(start, Duration::MAX, Duration::from_secs(60));
        let later = start + Duration::from_secs(60 * 60 * 24 * 365);

        assert_eq!(schedule.due(later), vec![Job::PushMetrics]);
        schedule.completed(Job::RefreshConfig, later);
        schedule.completed(Job::PushMetrics, later);
        assert!(schedule.due(later + Duration::from_secs(59)).is_empty());
    }
}
