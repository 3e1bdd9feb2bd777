use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Point-in-time view of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub parts_done: u32,
    pub parts_total: u32,
    pub bytes_per_second: f64,
    pub eta: Option<Duration>,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Fraction complete in `0.0..=1.0`. An empty transfer counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.transferred_bytes as f64 / self.total_bytes as f64).min(1.0)
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.transferred_bytes)
    }
}

/// Shared progress counter for one upload or download.
///
/// Part workers call [`complete_part`](Self::complete_part) from
/// concurrent tasks; the orchestrator reads [`snapshot`](Self::snapshot)
/// to build progress events.
pub struct TransferProgress {
    inner: RwLock<ProgressInner>,
    speed: SpeedCalculator,
}

struct ProgressInner {
    total_bytes: u64,
    transferred_bytes: u64,
    parts_total: u32,
    parts_done: u32,
    started_at: Instant,
}

impl TransferProgress {
    pub fn new(total_bytes: u64, parts_total: u32) -> Self {
        Self {
            inner: RwLock::new(ProgressInner {
                total_bytes,
                transferred_bytes: 0,
                parts_total,
                parts_done: 0,
                started_at: Instant::now(),
            }),
            speed: SpeedCalculator::new(None, None),
        }
    }

    /// Records a finished part of `bytes` length.
    pub fn complete_part(&self, bytes: u64) {
        {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            inner.transferred_bytes += bytes;
            inner.parts_done += 1;
        }
        self.speed.add_sample(bytes);
    }

    /// Records bytes that are not tied to a part boundary (download blocks).
    pub fn add_bytes(&self, bytes: u64) {
        {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            inner.transferred_bytes += bytes;
        }
        self.speed.add_sample(bytes);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let remaining = inner.total_bytes.saturating_sub(inner.transferred_bytes);
        ProgressSnapshot {
            total_bytes: inner.total_bytes,
            transferred_bytes: inner.transferred_bytes,
            parts_done: inner.parts_done,
            parts_total: inner.parts_total,
            bytes_per_second: self.speed.bytes_per_second(),
            eta: self.speed.eta(remaining),
            elapsed: inner.started_at.elapsed(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Transfer speed over a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// `window_size` defaults to 5 s, `max_samples` to 100.
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    pub fn add_sample(&self, bytes: u64) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Average bytes/second within the window; 0.0 with fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        if s.samples.len() < 2 {
            return 0.0;
        }

        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = s.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// `None` while the speed is unknown.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining_bytes as f64 / speed).ok()
    }
}
