// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{Mutex, MutexGuard},
};

use serde::Serialize;

/// Kind of instrumented traffic, each with its own switch and counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Incoming requests
    Wsgi,
    /// Background tasks
    Celery,
}

impl MetricType {
    pub const ALL: [MetricType; 2] = [MetricType::Wsgi, MetricType::Celery];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Wsgi => "wsgi",
            MetricType::Celery => "celery",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a counted value describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Path,
    UserAgent,
    Task,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Path => "path",
            Dimension::UserAgent => "user_agent",
            Dimension::Task => "task",
        }
    }
}

/// Occurrences of each observed value
pub type Counter = HashMap<String, u64>;

/// Counters of one metric type, by dimension. Serializes as `{"path": {"/a": 2}}`.
pub type MetricCounts = BTreeMap<Dimension, Counter>;

#[derive(Debug, Default)]
struct KindState {
    enabled: bool,
    /// `None` until something is counted after the last drain
    counts: Option<MetricCounts>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    kinds: [KindState; MetricType::ALL.len()],
}

/// Traffic counters reported to the controller.
///
/// Values are only counted while their metric type is enabled. [`Metrics::drain`] hands out and
/// resets what was accumulated for the enabled metric types.
#[derive(Debug, Default)]
pub struct Metrics {
    inner: Mutex<MetricsInner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MetricsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self, kind: MetricType) -> bool {
        self.lock().kinds[kind.index()].enabled
    }

    pub fn set_mode(&self, kind: MetricType, enabled: bool) {
        self.lock().kinds[kind.index()].enabled = enabled;
    }

    pub fn count_path(&self, path: &str) {
        self.count(MetricType::Wsgi, Dimension::Path, path)
    }

    pub fn count_user_agent(&self, user_agent: &str) {
        self.count(MetricType::Wsgi, Dimension::UserAgent, user_agent)
    }

    pub fn count_task(&self, task: &str) {
        self.count(MetricType::Celery, Dimension::Task, task)
    }

    fn count(&self, kind: MetricType, dimension: Dimension, value: &str) {
        let mut inner = self.lock();
        let state = &mut inner.kinds[kind.index()];
        if !state.enabled {
            return;
        }
        let counter = state
            .counts
            .get_or_insert_with(MetricCounts::new)
            .entry(dimension)
            .or_default();
        match counter.get_mut(value) {
            Some(count) => *count += 1,
            None => {
                counter.insert(value.to_string(), 1);
            }
        }
    }

    /// Returns a one-shot iterator over the counts of every enabled metric type that
    /// accumulated something since the previous drain.
    ///
    /// Each entry is taken, and its counters reset, under the lock when the iterator reaches
    /// it. Values counted afterwards land in the next drain. Disabled metric types are skipped
    /// and keep whatever they held.
    pub fn drain(&self) -> Drain<'_> {
        Drain {
            metrics: self,
            next: 0,
        }
    }
}

/// Iterator returned by [`Metrics::drain`]
pub struct Drain<'a> {
    metrics: &'a Metrics,
    next: usize,
}

impl Iterator for Drain<'_> {
    type Item = (MetricType, MetricCounts);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&kind) = MetricType::ALL.get(self.next) {
            self.next += 1;
            let mut inner = self.metrics.lock();
            let state = &mut inner.kinds[kind.index()];
            if !state.enabled {
                continue;
            }
            if let Some(counts) = state.counts.take() {
                return Some((kind, counts));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::{Counter, Dimension, MetricCounts, MetricType, Metrics};

    fn counter(values: &[(&str, u64)]) -> Counter {
        values.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_modes() {
        let m = Metrics::new();
        assert!(!m.mode(MetricType::Celery));
        assert!(!m.mode(MetricType::Wsgi));

        m.set_mode(MetricType::Celery, true);
        m.set_mode(MetricType::Wsgi, true);
        assert!(m.mode(MetricType::Celery));
        assert!(m.mode(MetricType::Wsgi));

        m.set_mode(MetricType::Wsgi, false);
        assert!(!m.mode(MetricType::Wsgi));
    }

    #[test]
    fn test_drain() {
        let m = Metrics::new();
        m.set_mode(MetricType::Celery, true);
        m.set_mode(MetricType::Wsgi, true);

        m.count_path("/metric/");
        m.count_path("/metric/");
        m.count_user_agent("kube/1.26");
        m.count_task("celery.run");

        let drained: Vec<_> = m.drain().collect();
        assert_eq!(
            drained,
            vec![
                (
                    MetricType::Wsgi,
                    MetricCounts::from([
                        (Dimension::Path, counter(&[("/metric/", 2)])),
                        (Dimension::UserAgent, counter(&[("kube/1.26", 1)])),
                    ])
                ),
                (
                    MetricType::Celery,
                    MetricCounts::from([(Dimension::Task, counter(&[("celery.run", 1)]))])
                ),
            ]
        );

        assert_eq!(m.drain().count(), 0);
    }

    #[test]
    fn test_counts_while_disabled_are_discarded() {
        let m = Metrics::new();
        m.count_path("/before");
        m.count_task("before");

        m.set_mode(MetricType::Wsgi, true);
        m.set_mode(MetricType::Celery, true);
        assert_eq!(m.drain().count(), 0);

        m.count_path("/after");
        let drained: Vec<_> = m.drain().collect();
        assert_eq!(drained.len(), 1);
        assert_eq!(
            drained[0].1,
            MetricCounts::from([(Dimension::Path, counter(&[("/after", 1)]))])
        );
    }

    #[test]
    fn test_disabled_kind_keeps_dormant_counts() {
        let m = Metrics::new();
        m.set_mode(MetricType::Wsgi, true);
        m.count_path("/a");

        m.set_mode(MetricType::Wsgi, false);
        assert_eq!(m.drain().count(), 0);

        m.set_mode(MetricType::Wsgi, true);
        let drained: Vec<_> = m.drain().collect();
        assert_eq!(
            drained,
            vec![(
                MetricType::Wsgi,
                MetricCounts::from([(Dimension::Path, counter(&[("/a", 1)]))])
            )]
        );
    }

    #[test]
    fn test_drain_is_lazy() {
        let m = Metrics::new();
        m.set_mode(MetricType::Wsgi, true);
        m.set_mode(MetricType::Celery, true);
        m.count_path("/a");
        m.count_task("t");

        let mut drain = m.drain();
        let (kind, _) = drain.next().unwrap();
        assert_eq!(kind, MetricType::Wsgi);

        // counted after its kind was drained: goes to the next drain
        m.count_path("/b");
        // counted before its kind was reached: part of this drain
        m.count_task("u");

        let (kind, counts) = drain.next().unwrap();
        assert_eq!(kind, MetricType::Celery);
        assert_eq!(counts[&Dimension::Task], counter(&[("t", 1), ("u", 1)]));
        assert!(drain.next().is_none());

        let next: Vec<_> = m.drain().collect();
        assert_eq!(
            next,
            vec![(
                MetricType::Wsgi,
                MetricCounts::from([(Dimension::Path, counter(&[("/b", 1)]))])
            )]
        );
    }

    #[test]
    fn test_serialization() {
        let counts = MetricCounts::from([
            (Dimension::Path, counter(&[("/a", 3)])),
            (Dimension::UserAgent, counter(&[("curl", 1)])),
        ]);
        assert_eq!(
            serde_json::to_value(&counts).unwrap(),
            serde_json::json!({"path": {"/a": 3}, "user_agent": {"curl": 1}})
        );
        assert_eq!(
            serde_json::to_value(MetricType::Celery).unwrap(),
            serde_json::json!("celery")
        );
        assert_eq!(MetricType::Wsgi.to_string(), "wsgi");
        assert_eq!(Dimension::UserAgent.as_str(), "user_agent");
    }

    #[test]
    fn test_concurrent_counting() {
        let m = Arc::new(Metrics::new());
        m.set_mode(MetricType::Wsgi, true);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = m.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        m.count_path("/hot");
                    }
                })
            })
            .collect();

        let mut total = 0;
        for handle in handles {
            handle.join().unwrap();
        }
        for (_, counts) in m.drain() {
            total += counts[&Dimension::Path]["/hot"];
        }
        assert_eq!(total, 8000);
    }
}
