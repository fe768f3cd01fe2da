//! Per-operation-class latency recording.
//!
//! Each worker thread owns a [`LatencyProbe`] with pre-sized append-only
//! buffers, so recording a sample costs one `Vec` push and never blocks on a
//! shared structure. Probes are merged into a [`LatencyReport`] at finalize.

/// Mutation outcome classes latencies are bucketed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// A vertex or edge that did not exist before.
    Insert,
    /// A vertex or edge removal.
    Delete,
    /// An edge insert that found the edge already present (weight refresh).
    Update,
}

impl OpClass {
    /// All classes, in persisted order.
    pub const ALL: [OpClass; 3] = [OpClass::Insert, OpClass::Delete, OpClass::Update];

    /// The label the class is persisted under.
    pub fn label(&self) -> &'static str {
        match self {
            OpClass::Insert => "inserts",
            OpClass::Delete => "deletes",
            OpClass::Update => "updates",
        }
    }

    fn index(&self) -> usize {
        match self {
            OpClass::Insert => 0,
            OpClass::Delete => 1,
            OpClass::Update => 2,
        }
    }
}

/// Thread-local latency accumulator. A disabled probe records nothing and
/// costs a single branch per operation.
#[derive(Debug)]
pub struct LatencyProbe {
    enabled: bool,
    samples: [Vec<u64>; 3],
}

impl LatencyProbe {
    /// Creates a probe, pre-sizing each class buffer to `capacity_hint`.
    pub fn new(enabled: bool, capacity_hint: usize) -> Self {
        let mk = || {
            if enabled {
                Vec::with_capacity(capacity_hint)
            } else {
                Vec::new()
            }
        };
        Self {
            enabled,
            samples: [mk(), mk(), mk()],
        }
    }

    /// Whether this probe records anything.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Appends one duration, in nanoseconds, to the class bucket.
    #[inline]
    pub fn record(&mut self, class: OpClass, nanos: u64) {
        if self.enabled {
            self.samples[class.index()].push(nanos);
        }
    }

    fn into_samples(self) -> [Vec<u64>; 3] {
        self.samples
    }
}

/// Percentile summary of one operation class, all values in nanoseconds.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct LatencySummary {
    /// Class label (`inserts`, `deletes` or `updates`).
    pub label: &'static str,
    /// Number of samples summarized.
    pub count: u64,
    /// Arithmetic mean.
    pub mean: f64,
    /// 50th percentile.
    pub median: f64,
    /// Population standard deviation.
    pub stddev: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 97th percentile.
    pub p97: f64,
    /// 99th percentile.
    pub p99: f64,
}

/// Merged summaries for the three operation classes. A class nobody hit is
/// `None`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct LatencyReport {
    /// Summary of insert latencies.
    pub inserts: Option<LatencySummary>,
    /// Summary of delete latencies.
    pub deletes: Option<LatencySummary>,
    /// Summary of update latencies.
    pub updates: Option<LatencySummary>,
}

impl LatencyReport {
    /// Merges per-thread probes into one report.
    pub fn merge(probes: Vec<LatencyProbe>) -> Self {
        let mut merged: [Vec<u64>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for probe in probes {
            for (target, source) in merged.iter_mut().zip(probe.into_samples()) {
                target.extend(source);
            }
        }
        let [mut inserts, mut deletes, mut updates] = merged;
        Self {
            inserts: summarize(OpClass::Insert.label(), &mut inserts),
            deletes: summarize(OpClass::Delete.label(), &mut deletes),
            updates: summarize(OpClass::Update.label(), &mut updates),
        }
    }

    /// The summaries that exist, in persisted order.
    pub fn summaries(&self) -> impl Iterator<Item = &LatencySummary> {
        [&self.inserts, &self.deletes, &self.updates]
            .into_iter()
            .filter_map(Option::as_ref)
    }
}

fn summarize(label: &'static str, samples: &mut Vec<u64>) -> Option<LatencySummary> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();
    let count = samples.len() as u64;
    let sum: u128 = samples.iter().map(|&s| s as u128).sum();
    let mean = sum as f64 / count as f64;
    let variance = samples
        .iter()
        .map(|&s| {
            let d = s as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / count as f64;
    Some(LatencySummary {
        label,
        count,
        mean,
        median: percentile(samples, 0.50),
        stddev: variance.sqrt(),
        p90: percentile(samples, 0.90),
        p95: percentile(samples, 0.95),
        p97: percentile(samples, 0.97),
        p99: percentile(samples, 0.99),
    })
}

/// Nearest-rank percentile over a sorted slice.
fn percentile(sorted: &[u64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let rank = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[rank.min(sorted.len() - 1)] as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_probe_records_nothing() {
        let mut probe = LatencyProbe::new(false, 128);
        probe.record(OpClass::Insert, 100);
        let report = LatencyReport::merge(vec![probe]);
        assert!(report.inserts.is_none());
    }

    #[test]
    fn percentiles_over_uniform_ramp() {
        let mut probe = LatencyProbe::new(true, 128);
        for n in 1..=100u64 {
            probe.record(OpClass::Insert, n);
        }
        let report = LatencyReport::merge(vec![probe]);
        let summary = report.inserts.expect("inserts summarized");
        assert_eq!(summary.count, 100);
        assert!((summary.mean - 50.5).abs() < 1e-9);
        assert_eq!(summary.median, 51.0);
        assert_eq!(summary.p90, 90.0);
        assert_eq!(summary.p99, 99.0);
    }

    #[test]
    fn probes_merge_across_threads() {
        let mut a = LatencyProbe::new(true, 4);
        let mut b = LatencyProbe::new(true, 4);
        a.record(OpClass::Delete, 10);
        b.record(OpClass::Delete, 30);
        let report = LatencyReport::merge(vec![a, b]);
        let summary = report.deletes.expect("deletes summarized");
        assert_eq!(summary.count, 2);
        assert!((summary.mean - 20.0).abs() < 1e-9);
        assert!(report.updates.is_none());
    }

    #[test]
    fn single_sample_summary() {
        let mut probe = LatencyProbe::new(true, 1);
        probe.record(OpClass::Update, 42);
        let report = LatencyReport::merge(vec![probe]);
        let summary = report.updates.expect("updates summarized");
        assert_eq!(summary.median, 42.0);
        assert_eq!(summary.p99, 42.0);
        assert_eq!(summary.stddev, 0.0);
    }
}
