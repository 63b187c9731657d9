//! Metrics for work cycles and node state

use crate::storage::RepoUsage;
use crate::worker::JobKind;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const NAMESPACE: &str = "pincast";

/// Sink for cycle observations
pub trait Observer: Send + Sync {
    /// One directive finished; `duration` covers the whole cycle it ran in
    fn job_finished(&self, kind: JobKind, success: bool, duration: Duration);

    fn node_peers(&self, peers: usize);

    fn repo_usage(&self, usage: &RepoUsage);
}

#[derive(Debug, Default)]
struct JobCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    duration_micros: AtomicU64,
}

/// Metrics handle for recording counters/gauges
#[derive(Debug, Default)]
pub struct Metrics {
    download: JobCounters,
    pin: JobCounters,
    delete: JobCounters,
    peers: AtomicU64,
    repo_used_bytes: AtomicU64,
    repo_capacity_bytes: AtomicU64,
    repo_objects: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, kind: JobKind) -> &JobCounters {
        match kind {
            JobKind::Download => &self.download,
            JobKind::Pin => &self.pin,
            JobKind::Delete => &self.delete,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let job = |kind| {
            let counters = self.counters(kind);
            JobCounts {
                succeeded: counters.succeeded.load(Ordering::Relaxed),
                failed: counters.failed.load(Ordering::Relaxed),
                duration: Duration::from_micros(counters.duration_micros.load(Ordering::Relaxed)),
            }
        };

        MetricsSnapshot {
            jobs: JobKind::ALL.map(job),
            peers: self.peers.load(Ordering::Relaxed),
            repo_used_bytes: self.repo_used_bytes.load(Ordering::Relaxed),
            repo_capacity_bytes: self.repo_capacity_bytes.load(Ordering::Relaxed),
            repo_objects: self.repo_objects.load(Ordering::Relaxed),
        }
    }

    /// Render current values in the Prometheus text exposition format
    pub fn render_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        let _ = writeln!(out, "# TYPE {NAMESPACE}_jobs_total counter");
        for (kind, counts) in JobKind::ALL.iter().zip(&snapshot.jobs) {
            let _ = writeln!(
                out,
                "{NAMESPACE}_jobs_total{{kind=\"{kind}\",result=\"success\"}} {}",
                counts.succeeded
            );
            let _ = writeln!(
                out,
                "{NAMESPACE}_jobs_total{{kind=\"{kind}\",result=\"error\"}} {}",
                counts.failed
            );
        }

        let _ = writeln!(out, "# TYPE {NAMESPACE}_job_duration_seconds_total counter");
        for (kind, counts) in JobKind::ALL.iter().zip(&snapshot.jobs) {
            let _ = writeln!(
                out,
                "{NAMESPACE}_job_duration_seconds_total{{kind=\"{kind}\"}} {}",
                counts.duration.as_secs_f64()
            );
        }

        let gauges = [
            ("node_peers", snapshot.peers),
            ("repo_used_bytes", snapshot.repo_used_bytes),
            ("repo_capacity_bytes", snapshot.repo_capacity_bytes),
            ("repo_objects", snapshot.repo_objects),
        ];
        for (name, value) in gauges {
            let _ = writeln!(out, "# TYPE {NAMESPACE}_{name} gauge");
            let _ = writeln!(out, "{NAMESPACE}_{name} {value}");
        }

        out
    }
}

impl Observer for Metrics {
    fn job_finished(&self, kind: JobKind, success: bool, duration: Duration) {
        let counters = self.counters(kind);
        if success {
            counters.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        counters.duration_micros.fetch_add(micros, Ordering::Relaxed);
        tracing::debug!(%kind, success, ?duration, "Job observed");
    }

    fn node_peers(&self, peers: usize) {
        self.peers.store(peers as u64, Ordering::Relaxed);
    }

    fn repo_usage(&self, usage: &RepoUsage) {
        self.repo_used_bytes.store(usage.used_bytes, Ordering::Relaxed);
        self.repo_capacity_bytes
            .store(usage.capacity_bytes, Ordering::Relaxed);
        self.repo_objects.store(usage.object_count, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub succeeded: u64,
    pub failed: u64,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Indexed in [`JobKind::ALL`] order
    pub jobs: [JobCounts; 3],
    pub peers: u64,
    pub repo_used_bytes: u64,
    pub repo_capacity_bytes: u64,
    pub repo_objects: u64,
}

impl MetricsSnapshot {
    pub fn job(&self, kind: JobKind) -> JobCounts {
        match kind {
            JobKind::Download => self.jobs[0],
            JobKind::Pin => self.jobs[1],
            JobKind::Delete => self.jobs[2],
        }
    }
}
