//! Per-operation latency and status bookkeeping.
//!
//! Every execution is recorded, successful or not. Latencies of exchanges that reached the
//! service are kept for [`SAMPLE_WINDOW`] and reported back to the service as `l_<op>` query
//! parameters (average seconds, three decimals) on subsequent requests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::endpoint::OperationType;

/// How long a latency sample stays relevant.
pub const SAMPLE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct TelemetryState {
    latencies: HashMap<&'static str, VecDeque<(Instant, Duration)>>,
    outcomes: HashMap<(OperationType, Option<u16>), u64>,
}

/// Shared telemetry aggregator owned by the client.
#[derive(Debug)]
pub struct TelemetryManager {
    enabled: bool,
    state: Mutex<TelemetryState>,
}

impl TelemetryManager {
    /// Create a manager. When `enabled` is false nothing is reported to the service, but
    /// outcomes are still counted locally.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            state: Mutex::new(TelemetryState::default()),
        }
    }

    /// Whether latencies are reported to the service.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record one execution. `status_code` is `None` when no response was received.
    pub fn record(&self, operation: OperationType, latency: Duration, status_code: Option<u16>) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        *state.outcomes.entry((operation, status_code)).or_default() += 1;

        if let (Some(key), Some(_)) = (operation.telemetry_key(), status_code) {
            let samples = state.latencies.entry(key).or_default();
            samples.push_back((now, latency));
            prune(samples, now);
        }
    }

    /// Number of recorded executions of `operation` that ended with `status_code`.
    pub fn outcome_count(&self, operation: OperationType, status_code: Option<u16>) -> u64 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .outcomes
            .get(&(operation, status_code))
            .copied()
            .unwrap_or(0)
    }

    /// `l_<op>` parameters for the current window, sorted by key. Empty when disabled.
    pub fn query_params(&self) -> Vec<(String, String)> {
        if !self.enabled {
            return Vec::new();
        }

        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut params: Vec<(String, String)> = state
            .latencies
            .iter_mut()
            .filter_map(|(key, samples)| {
                prune(samples, now);
                if samples.is_empty() {
                    return None;
                }
                let total: f64 = samples.iter().map(|(_, l)| l.as_secs_f64()).sum();
                let average = total / samples.len() as f64;
                Some((format!("l_{key}"), format!("{average:.3}")))
            })
            .collect();
        params.sort();
        params
    }
}

fn prune(samples: &mut VecDeque<(Instant, Duration)>, now: Instant) {
    while let Some((at, _)) = samples.front() {
        if now.duration_since(*at) <= SAMPLE_WINDOW {
            break;
        }
        samples.pop_front();
    }
}
