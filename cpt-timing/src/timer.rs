use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock used for round origins and reaction times.
pub trait Timer: Clone + Send + Sync {
    type Timestamp: Copy + Clone + Send + Sync;
    fn now(&self) -> Self::Timestamp;
    /// Span from `from` to `to`, zero if `to` precedes `from`.
    fn between(&self, from: Self::Timestamp, to: Self::Timestamp) -> Duration;
    /// Records one tick-to-paint latency sample.
    fn record_latency(&mut self, d: Duration);
    fn latency_stats(&self) -> LatencyStats;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyStats {
    pub samples: usize,
    pub average_ns: f64,
    pub jitter_ns: f64,
    pub min_ns: f64,
    pub max_ns: f64,
}

/// Bounded ring of latency samples shared by both timer flavours.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: Vec<Duration>,
    max_samples: usize,
}

impl LatencyWindow {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: Vec::with_capacity(max_samples.min(1024)),
            max_samples,
        }
    }

    pub fn push(&mut self, d: Duration) {
        if self.max_samples == 0 {
            return;
        }
        if self.samples.len() >= self.max_samples {
            self.samples.remove(0);
        }
        self.samples.push(d);
    }

    pub fn stats(&self) -> LatencyStats {
        if self.samples.is_empty() {
            return LatencyStats::default();
        }
        let times: Vec<f64> = self.samples.iter().map(|d| d.as_nanos() as f64).collect();
        let n = times.len() as f64;
        let avg = times.iter().sum::<f64>() / n;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / n;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        LatencyStats {
            samples: times.len(),
            average_ns: avg,
            jitter_ns: var.sqrt(),
            min_ns: min,
            max_ns: max,
        }
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Wall-clock monotonic timer, nanoseconds since construction.
#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    latencies: LatencyWindow,
}

impl Timer for HighPrecisionTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
    fn between(&self, from: u64, to: u64) -> Duration {
        Duration::from_nanos(to.saturating_sub(from))
    }
    fn record_latency(&mut self, d: Duration) {
        self.latencies.push(d);
    }
    fn latency_stats(&self) -> LatencyStats {
        self.latencies.stats()
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            latencies: LatencyWindow::default(),
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Virtual clock advanced explicitly. Clones share the same time source,
/// so a driver can move time forward under a controller holding a copy.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now_ns: Arc<AtomicU64>,
    latencies: LatencyWindow,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, d: Duration) {
        self.now_ns
            .fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Moves time to `ns`; never goes backwards.
    pub fn advance_to(&self, ns: u64) {
        self.now_ns.fetch_max(ns, Ordering::SeqCst);
    }
}

impl Timer for ManualTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
    fn between(&self, from: u64, to: u64) -> Duration {
        Duration::from_nanos(to.saturating_sub(from))
    }
    fn record_latency(&mut self, d: Duration) {
        self.latencies.push(d);
    }
    fn latency_stats(&self) -> LatencyStats {
        self.latencies.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timer_clones_share_time() {
        let a = ManualTimer::new();
        let b = a.clone();
        a.advance(Duration::from_millis(240));
        assert_eq!(b.now(), 240_000_000);
        b.advance(Duration::from_millis(10));
        assert_eq!(a.between(0, a.now()), Duration::from_millis(250));
        a.advance_to(100);
        assert_eq!(a.now(), 250_000_000);
    }

    #[test]
    fn latency_window_is_bounded() {
        let mut w = LatencyWindow::new(2);
        w.push(Duration::from_nanos(10));
        w.push(Duration::from_nanos(20));
        w.push(Duration::from_nanos(40));
        let s = w.stats();
        assert_eq!(s.samples, 2);
        assert_eq!(s.average_ns, 30.0);
        assert_eq!(s.min_ns, 20.0);
        assert_eq!(s.max_ns, 40.0);
        assert_eq!(s.jitter_ns, 10.0);
    }

    #[test]
    fn empty_stats_are_zero() {
        assert_eq!(LatencyWindow::default().stats(), LatencyStats::default());
    }

    #[test]
    fn high_precision_timer_is_monotonic() {
        let t = HighPrecisionTimer::new();
        let a = t.now();
        std::thread::sleep(Duration::from_millis(1));
        let b = t.now();
        assert!(b > a);
        assert_eq!(t.between(b, a), Duration::ZERO);
    }
}
