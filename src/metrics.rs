use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    // Session metrics
    pub sessions: u64,
    pub disconnects: u64,
    pub jobs_received: u64,
    pub short_packets: u64,

    // Search metrics
    pub batches: u64,
    pub nonces_tested: u64,
    pub shares_found: u64,
    pub average_batch_ms: f64,
    pub min_batch_us: u64,
    pub max_batch_us: u64,
    pub hashrate: f64,

    // Error metrics
    pub network_errors: u64,
    pub compute_errors: u64,

    pub uptime_seconds: u64,
    pub timestamp: String,
}

#[derive(Debug)]
pub struct MetricsCollector {
    sessions: AtomicU64,
    disconnects: AtomicU64,
    jobs_received: AtomicU64,
    short_packets: AtomicU64,
    batches: AtomicU64,
    nonces_tested: AtomicU64,
    shares_found: AtomicU64,
    network_errors: AtomicU64,
    compute_errors: AtomicU64,

    start_time: Instant,

    // Batch timing, microseconds
    total_batch_us: AtomicU64,
    min_batch_us: AtomicU64,
    max_batch_us: AtomicU64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            sessions: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            jobs_received: AtomicU64::new(0),
            short_packets: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            nonces_tested: AtomicU64::new(0),
            shares_found: AtomicU64::new(0),
            network_errors: AtomicU64::new(0),
            compute_errors: AtomicU64::new(0),
            start_time: Instant::now(),
            total_batch_us: AtomicU64::new(0),
            min_batch_us: AtomicU64::new(u64::MAX),
            max_batch_us: AtomicU64::new(0),
        }
    }

    pub fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_job(&self) {
        self.jobs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, nonces: u32, shares: usize, elapsed: Duration) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.nonces_tested.fetch_add(nonces as u64, Ordering::Relaxed);
        self.shares_found.fetch_add(shares as u64, Ordering::Relaxed);

        let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        self.total_batch_us.fetch_add(us, Ordering::Relaxed);

        let mut current_min = self.min_batch_us.load(Ordering::Relaxed);
        while us < current_min {
            match self.min_batch_us.compare_exchange_weak(
                current_min, us, Ordering::Relaxed, Ordering::Relaxed
            ) {
                Ok(_) => break,
                Err(new_min) => current_min = new_min,
            }
        }

        let mut current_max = self.max_batch_us.load(Ordering::Relaxed);
        while us > current_max {
            match self.max_batch_us.compare_exchange_weak(
                current_max, us, Ordering::Relaxed, Ordering::Relaxed
            ) {
                Ok(_) => break,
                Err(new_max) => current_max = new_max,
            }
        }
    }

    pub fn record_error(&self, error_type: ErrorType) {
        match error_type {
            ErrorType::Network => self.network_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::Compute => self.compute_errors.fetch_add(1, Ordering::Relaxed),
            ErrorType::ShortPacket => self.short_packets.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn get_metrics(&self) -> Metrics {
        let batches = self.batches.load(Ordering::Relaxed);
        let nonces_tested = self.nonces_tested.load(Ordering::Relaxed);
        let total_batch_us = self.total_batch_us.load(Ordering::Relaxed);
        let min_batch_us = self.min_batch_us.load(Ordering::Relaxed);

        let average_batch_ms = if batches > 0 {
            total_batch_us as f64 / batches as f64 / 1000.0
        } else {
            0.0
        };

        // Nonces per second of accelerator time, not wall time.
        let hashrate = if total_batch_us > 0 {
            nonces_tested as f64 * 1_000_000.0 / total_batch_us as f64
        } else {
            0.0
        };

        Metrics {
            sessions: self.sessions.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            jobs_received: self.jobs_received.load(Ordering::Relaxed),
            short_packets: self.short_packets.load(Ordering::Relaxed),
            batches,
            nonces_tested,
            shares_found: self.shares_found.load(Ordering::Relaxed),
            average_batch_ms,
            min_batch_us: if min_batch_us == u64::MAX { 0 } else { min_batch_us },
            max_batch_us: self.max_batch_us.load(Ordering::Relaxed),
            hashrate,
            network_errors: self.network_errors.load(Ordering::Relaxed),
            compute_errors: self.compute_errors.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Network,
    Compute,
    ShortPacket,
}
