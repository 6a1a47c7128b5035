//! Pipeline throughput and quality counters.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::domains::monitoring::models::MonitoringEvent;

const LATENCY_SAMPLES: usize = 128;

/// Counters owned by the orchestrator. Reads never block ingestion: plain
/// atomics plus short-lived locks over small maps.
pub struct PipelineMetrics {
    events_processed: AtomicU64,
    alerts_generated: AtomicU64,
    duplicates_filtered: AtomicU64,
    latencies_ms: Mutex<VecDeque<u64>>,
    recent_batches: Mutex<VecDeque<(Instant, u64)>>,
    sentiment_counts: Mutex<HashMap<String, u64>>,
    platform_counts: Mutex<HashMap<String, u64>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            events_processed: AtomicU64::new(0),
            alerts_generated: AtomicU64::new(0),
            duplicates_filtered: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_SAMPLES)),
            recent_batches: Mutex::new(VecDeque::new()),
            sentiment_counts: Mutex::new(HashMap::new()),
            platform_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_batch(
        &self,
        accepted: &[MonitoringEvent],
        filtered: u64,
        alerts: u64,
        latency: Duration,
    ) {
        let processed = accepted.len() as u64 + filtered;
        self.events_processed.fetch_add(processed, Ordering::SeqCst);
        self.duplicates_filtered.fetch_add(filtered, Ordering::SeqCst);
        self.alerts_generated.fetch_add(alerts, Ordering::SeqCst);

        {
            let mut latencies = self.latencies_ms.lock().expect("metrics lock poisoned");
            if latencies.len() == LATENCY_SAMPLES {
                latencies.pop_front();
            }
            latencies.push_back(latency.as_millis() as u64);
        }

        if processed > 0 {
            let mut recent = self.recent_batches.lock().expect("metrics lock poisoned");
            recent.push_back((Instant::now(), processed));
        }

        {
            let mut sentiment = self.sentiment_counts.lock().expect("metrics lock poisoned");
            for event in accepted {
                *sentiment.entry(event.sentiment.label.to_string()).or_insert(0) += 1;
            }
        }
        {
            let mut platforms = self.platform_counts.lock().expect("metrics lock poisoned");
            for event in accepted {
                *platforms.entry(event.platform.clone()).or_insert(0) += 1;
            }
        }
    }

    pub fn duplicates_filtered(&self) -> u64 {
        self.duplicates_filtered.load(Ordering::SeqCst)
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::SeqCst)
    }

    /// Events processed in the trailing 60 seconds.
    pub fn events_per_minute(&self) -> u64 {
        let mut recent = self.recent_batches.lock().expect("metrics lock poisoned");
        let horizon = Duration::from_secs(60);
        while let Some((when, _)) = recent.front() {
            if when.elapsed() > horizon {
                recent.pop_front();
            } else {
                break;
            }
        }
        recent.iter().map(|(_, count)| count).sum()
    }

    pub fn snapshot(&self, persistence_failures: u64) -> MetricsSnapshot {
        let processing_latency_ms = {
            let latencies = self.latencies_ms.lock().expect("metrics lock poisoned");
            if latencies.is_empty() {
                0
            } else {
                latencies.iter().sum::<u64>() / latencies.len() as u64
            }
        };

        MetricsSnapshot {
            events_processed_total: self.events_processed.load(Ordering::SeqCst),
            events_per_minute: self.events_per_minute(),
            alerts_generated: self.alerts_generated.load(Ordering::SeqCst),
            duplicates_filtered: self.duplicates_filtered.load(Ordering::SeqCst),
            processing_latency_ms,
            persistence_failures,
            sentiment_distribution: self
                .sentiment_counts
                .lock()
                .expect("metrics lock poisoned")
                .clone(),
            platform_distribution: self
                .platform_counts
                .lock()
                .expect("metrics lock poisoned")
                .clone(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable point-in-time view, returned by `get_metrics()` and pushed
/// to the metrics channel each cycle.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub events_processed_total: u64,
    pub events_per_minute: u64,
    pub alerts_generated: u64,
    pub duplicates_filtered: u64,
    pub processing_latency_ms: u64,
    pub persistence_failures: u64,
    pub sentiment_distribution: HashMap<String, u64>,
    pub platform_distribution: HashMap<String, u64>,
}
