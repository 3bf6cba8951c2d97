//! Summary instrument
//!
//! The `prometheus` crate ships counters, gauges and histograms but no
//! summary. This module provides one as a [`Collector`], so it registers in
//! the same [`prometheus::Registry`] and is rendered by the text encoder with
//! `quantile` labels plus cumulative `_sum` and `_count` series.
//!
//! Quantiles are computed over a sliding window of `max_age`, split into
//! `age_buckets` slices that expire one at a time. Count and sum are never
//! reset.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::{proto, Opts};

use crate::error::{Error, Result};

/// Default window over which quantiles are computed
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Default number of slices the window is rotated in
pub const DEFAULT_AGE_BUCKETS: usize = 5;

// =============================================================================
// Options
// =============================================================================

/// Options for creating a [`Summary`]. Mirrors `prometheus::HistogramOpts`.
#[derive(Debug, Clone)]
pub struct SummaryOpts {
    /// Name, help, namespace, subsystem and constant labels
    pub common_opts: Opts,

    /// `(quantile, allowed error)` pairs
    pub objectives: Vec<(f64, f64)>,

    /// Observations older than this no longer affect quantiles
    pub max_age: Duration,

    /// Number of slices the window is rotated in
    pub age_buckets: usize,
}

impl SummaryOpts {
    pub fn new<S1: Into<String>, S2: Into<String>>(name: S1, help: S2) -> Self {
        Self {
            common_opts: Opts::new(name, help),
            objectives: Vec::new(),
            max_age: DEFAULT_MAX_AGE,
            age_buckets: DEFAULT_AGE_BUCKETS,
        }
    }

    pub fn namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.common_opts.namespace = namespace.into();
        self
    }

    pub fn subsystem<S: Into<String>>(mut self, subsystem: S) -> Self {
        self.common_opts.subsystem = subsystem.into();
        self
    }

    pub fn const_labels(mut self, const_labels: HashMap<String, String>) -> Self {
        self.common_opts.const_labels = const_labels;
        self
    }

    pub fn objectives(mut self, objectives: Vec<(f64, f64)>) -> Self {
        self.objectives = objectives;
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn age_buckets(mut self, age_buckets: usize) -> Self {
        self.age_buckets = age_buckets;
        self
    }

    /// Fully qualified metric name
    pub fn fq_name(&self) -> String {
        self.common_opts.fq_name()
    }

    fn validate(&self) -> Result<()> {
        for &(quantile, error) in &self.objectives {
            if !(quantile > 0.0 && quantile < 1.0) {
                return Err(Error::Config(format!(
                    "summary quantile {} is outside (0, 1)",
                    quantile
                )));
            }
            if !error.is_finite() || error < 0.0 {
                return Err(Error::Config(format!(
                    "summary error tolerance {} for quantile {} is invalid",
                    error, quantile
                )));
            }
        }
        if self.max_age.is_zero() {
            return Err(Error::Config("summary max age must be non-zero".into()));
        }
        if self.age_buckets == 0 {
            return Err(Error::Config("summary needs at least one age bucket".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Sliding Window
// =============================================================================

#[derive(Debug)]
struct AgeBucket {
    started: Instant,
    samples: Vec<f64>,
}

#[derive(Debug, Default)]
struct SummaryState {
    count: u64,
    sum: f64,
    window: VecDeque<AgeBucket>,
}

impl SummaryState {
    fn expire(&mut self, now: Instant, max_age: Duration) {
        while let Some(front) = self.window.front() {
            if now.saturating_duration_since(front.started) >= max_age {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn observe(&mut self, value: f64, now: Instant, max_age: Duration, width: Duration) {
        self.count += 1;
        self.sum += value;

        self.expire(now, max_age);
        let rotate = match self.window.back() {
            Some(back) => now.saturating_duration_since(back.started) >= width,
            None => true,
        };
        if rotate {
            self.window.push_back(AgeBucket {
                started: now,
                samples: Vec::new(),
            });
        }
        if let Some(back) = self.window.back_mut() {
            back.samples.push(value);
        }
    }

    fn sorted_samples(&self) -> Vec<f64> {
        let mut samples: Vec<f64> = self
            .window
            .iter()
            .flat_map(|bucket| bucket.samples.iter().copied())
            .collect();
        samples.sort_by(f64::total_cmp);
        samples
    }
}

/// Nearest-rank quantile of already sorted samples; NaN when empty.
fn rank_quantile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

// =============================================================================
// Summary
// =============================================================================

struct SummaryCore {
    desc: Desc,
    objectives: Vec<(f64, f64)>,
    max_age: Duration,
    bucket_width: Duration,
    state: Mutex<SummaryState>,
}

struct Snapshot {
    count: u64,
    sum: f64,
    quantiles: Vec<(f64, f64)>,
}

/// A summary metric. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Summary {
    core: Arc<SummaryCore>,
}

impl Summary {
    /// Create a summary from options
    pub fn with_opts(opts: SummaryOpts) -> Result<Self> {
        opts.validate()?;

        let desc = Desc::new(
            opts.fq_name(),
            opts.common_opts.help.clone(),
            Vec::new(),
            opts.common_opts.const_labels.clone(),
        )?;

        let mut objectives = opts.objectives;
        objectives.sort_by(|a, b| a.0.total_cmp(&b.0));
        objectives.dedup_by(|a, b| a.0 == b.0);

        Ok(Self {
            core: Arc::new(SummaryCore {
                desc,
                objectives,
                max_age: opts.max_age,
                bucket_width: opts.max_age / opts.age_buckets as u32,
                state: Mutex::new(SummaryState::default()),
            }),
        })
    }

    /// Record one observation
    pub fn observe(&self, value: f64) {
        self.observe_at(value, Instant::now());
    }

    fn observe_at(&self, value: f64, now: Instant) {
        let core = &self.core;
        core.state
            .lock()
            .observe(value, now, core.max_age, core.bucket_width);
    }

    /// Total number of observations
    pub fn sample_count(&self) -> u64 {
        self.core.state.lock().count
    }

    /// Sum of all observations
    pub fn sample_sum(&self) -> f64 {
        self.core.state.lock().sum
    }

    /// `(quantile, value)` for every objective over the current window
    pub fn quantiles(&self) -> Vec<(f64, f64)> {
        self.quantiles_at(Instant::now())
    }

    fn quantiles_at(&self, now: Instant) -> Vec<(f64, f64)> {
        self.snapshot_at(now).quantiles
    }

    /// Count, sum and windowed quantiles read under a single lock.
    fn snapshot_at(&self, now: Instant) -> Snapshot {
        let core = &self.core;
        let (count, sum, sorted) = {
            let mut state = core.state.lock();
            state.expire(now, core.max_age);
            (state.count, state.sum, state.sorted_samples())
        };
        let quantiles = core
            .objectives
            .iter()
            .map(|&(quantile, _)| (quantile, rank_quantile(&sorted, quantile)))
            .collect();

        Snapshot {
            count,
            sum,
            quantiles,
        }
    }

    fn metric_family(&self) -> proto::MetricFamily {
        self.metric_family_at(Instant::now())
    }

    fn metric_family_at(&self, now: Instant) -> proto::MetricFamily {
        let snapshot = self.snapshot_at(now);

        let quantiles: Vec<proto::Quantile> = snapshot
            .quantiles
            .into_iter()
            .map(|(quantile, value)| {
                let mut q = proto::Quantile::default();
                q.set_quantile(quantile);
                q.set_value(value);
                q
            })
            .collect();

        let mut summary = proto::Summary::default();
        summary.set_sample_count(snapshot.count);
        summary.set_sample_sum(snapshot.sum);
        summary.set_quantile(quantiles.into());

        let mut metric = proto::Metric::default();
        metric.set_label(self.core.desc.const_label_pairs.clone().into());
        metric.set_summary(summary);

        let mut family = proto::MetricFamily::default();
        family.set_name(self.core.desc.fq_name.clone());
        family.set_help(self.core.desc.help.clone());
        family.set_field_type(proto::MetricType::SUMMARY);
        family.set_metric(vec![metric].into());
        family
    }
}

impl Collector for Summary {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.core.desc]
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        vec![self.metric_family()]
    }
}

impl std::fmt::Debug for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Summary")
            .field("name", &self.core.desc.fq_name)
            .field("objectives", &self.core.objectives)
            .field("max_age", &self.core.max_age)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
