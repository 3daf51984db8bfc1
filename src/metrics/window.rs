//! # Time-Bucketed Welford Windows
//!
//! Each window tier divides its span into fixed buckets; a sample lands in
//! the bucket covering its timestamp and expired buckets fall off as time
//! advances. Merging bucket accumulators (parallel-variance combination)
//! yields the window's statistics without ever storing raw samples.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Scope half of a metric key: one agent, or the system as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricScope {
    System,
    Agent(String),
}

impl MetricScope {
    pub fn from_agent_id(agent_id: Option<&str>) -> Self {
        match agent_id {
            Some(id) => Self::Agent(id.to_string()),
            None => Self::System,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::System => None,
            Self::Agent(id) => Some(id),
        }
    }
}

impl fmt::Display for MetricScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "{}", crate::constants::SYSTEM_SCOPE),
            Self::Agent(id) => write!(f, "{id}"),
        }
    }
}

/// Identity of one windowed series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    pub scope: MetricScope,
    pub name: String,
}

impl MetricKey {
    pub fn new(scope: MetricScope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    pub fn agent(agent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(MetricScope::Agent(agent_id.into()), name)
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self::new(MetricScope::System, name)
    }
}

/// Trailing window tiers maintained per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsWindow {
    Hourly,
    Daily,
    Weekly,
}

impl StatsWindow {
    pub const ALL: [StatsWindow; 3] = [Self::Hourly, Self::Daily, Self::Weekly];

    pub fn span(&self) -> chrono::Duration {
        match self {
            Self::Hourly => chrono::Duration::hours(1),
            Self::Daily => chrono::Duration::hours(24),
            Self::Weekly => chrono::Duration::days(7),
        }
    }

    /// Bucket granularity: 60 buckets per window.
    fn bucket_seconds(&self) -> i64 {
        self.span().num_seconds() / 60
    }
}

/// Point-in-time statistics for one window. An empty window is `count = 0`
/// with every stat `None`; a single-sample window has `stddev = Some(0.0)`,
/// never NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowedStats {
    pub count: u64,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub stddev: Option<f64>,
}

impl WindowedStats {
    pub fn empty() -> Self {
        Self {
            count: 0,
            mean: None,
            min: None,
            max: None,
            stddev: None,
        }
    }
}

/// Streaming mean/variance accumulator (Welford), mergeable across buckets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WelfordAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl WelfordAccumulator {
    fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Parallel combination of two accumulators.
    fn merge(&self, other: &WelfordAccumulator) -> WelfordAccumulator {
        if self.count == 0 {
            return *other;
        }
        if other.count == 0 {
            return *self;
        }

        let count = self.count + other.count;
        let delta = other.mean - self.mean;
        let mean = self.mean + delta * other.count as f64 / count as f64;
        let m2 = self.m2
            + other.m2
            + delta * delta * self.count as f64 * other.count as f64 / count as f64;

        WelfordAccumulator {
            count,
            mean,
            m2,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    fn stats(&self) -> WindowedStats {
        if self.count == 0 {
            return WindowedStats::empty();
        }

        let stddev = if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).max(0.0).sqrt()
        };

        WindowedStats {
            count: self.count,
            mean: Some(self.mean),
            min: Some(self.min),
            max: Some(self.max),
            stddev: Some(stddev),
        }
    }
}

/// One tier's sliding window: a deque of `(bucket index, accumulator)` pairs,
/// pruned as the window advances.
#[derive(Debug, Clone)]
pub(crate) struct TierWindow {
    window: StatsWindow,
    buckets: VecDeque<(i64, WelfordAccumulator)>,
}

impl TierWindow {
    pub(crate) fn new(window: StatsWindow) -> Self {
        Self {
            window,
            buckets: VecDeque::new(),
        }
    }

    fn bucket_index(&self, at: DateTime<Utc>) -> i64 {
        at.timestamp().div_euclid(self.window.bucket_seconds())
    }

    /// Oldest bucket index still inside the window ending at `now`.
    fn horizon(&self, now: DateTime<Utc>) -> i64 {
        self.bucket_index(now - self.window.span()) + 1
    }

    pub(crate) fn record(&mut self, at: DateTime<Utc>, value: f64, now: DateTime<Utc>) {
        self.prune(now);

        let index = self.bucket_index(at);
        if index < self.horizon(now) {
            // Sample older than the window; nothing to fold in.
            return;
        }

        match self.buckets.iter_mut().find(|(i, _)| *i == index) {
            Some((_, acc)) => acc.add(value),
            None => {
                let mut acc = WelfordAccumulator::new();
                acc.add(value);
                // Keep the deque ordered by bucket index for cheap pruning.
                let pos = self.buckets.partition_point(|(i, _)| *i < index);
                self.buckets.insert(pos, (index, acc));
            }
        }
    }

    pub(crate) fn stats(&mut self, now: DateTime<Utc>) -> WindowedStats {
        self.prune(now);

        let merged = self
            .buckets
            .iter()
            .fold(WelfordAccumulator::new(), |acc, (_, b)| acc.merge(b));
        merged.stats()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let horizon = self.horizon(now);
        while matches!(self.buckets.front(), Some((i, _)) if *i < horizon) {
            self.buckets.pop_front();
        }
    }
}
