use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Process-wide prediction counters.
#[derive(Debug)]
pub struct PredictionStats {
    started: Instant,
    predictions: AtomicU64,
    churn_predictions: AtomicU64,
    rejected_inputs: AtomicU64,
    model_errors: AtomicU64,
    total_latency_us: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub predictions: u64,
    pub churn_predictions: u64,
    pub churn_rate: f64,
    pub rejected_inputs: u64,
    pub model_errors: u64,
    pub avg_latency_ms: f64,
    pub uptime_secs: u64,
}

impl Default for PredictionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            predictions: AtomicU64::new(0),
            churn_predictions: AtomicU64::new(0),
            rejected_inputs: AtomicU64::new(0),
            model_errors: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
        }
    }

    pub fn record_prediction(&self, churn: bool, latency: Duration) {
        self.predictions.fetch_add(1, Ordering::Relaxed);
        if churn {
            self.churn_predictions.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected_inputs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_model_error(&self) {
        self.model_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let predictions = self.predictions.load(Ordering::Relaxed);
        let churn_predictions = self.churn_predictions.load(Ordering::Relaxed);
        let total_latency_us = self.total_latency_us.load(Ordering::Relaxed);

        let (churn_rate, avg_latency_ms) = if predictions == 0 {
            (0.0, 0.0)
        } else {
            (
                churn_predictions as f64 / predictions as f64,
                total_latency_us as f64 / predictions as f64 / 1000.0,
            )
        };

        StatsSnapshot {
            predictions,
            churn_predictions,
            churn_rate,
            rejected_inputs: self.rejected_inputs.load(Ordering::Relaxed),
            model_errors: self.model_errors.load(Ordering::Relaxed),
            avg_latency_ms,
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }
}
