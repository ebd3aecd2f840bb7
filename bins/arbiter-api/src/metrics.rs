// Prometheus metrics for the judge service

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref JUDGE_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "arbiter_judge_requests_total",
        "Completed judge calls by language and verdict",
        &["language", "verdict"]
    )
    .expect("judge request counter registers once");
    pub static ref REJECTED_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "arbiter_rejected_requests_total",
        "Judge calls refused before running, by reason",
        &["reason"]
    )
    .expect("rejection counter registers once");
    pub static ref JUDGE_DURATION: HistogramVec = register_histogram_vec!(
        "arbiter_judge_duration_seconds",
        "Wall time of one judge call",
        &["language"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    )
    .expect("duration histogram registers once");
    pub static ref EXECUTE_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "arbiter_execute_requests_total",
        "Completed free-form runs by language and outcome",
        &["language", "outcome"]
    )
    .expect("execute request counter registers once");
    pub static ref JUDGES_IN_FLIGHT: IntGauge = register_int_gauge!(
        "arbiter_judges_in_flight",
        "Judge and execute calls currently running"
    )
    .expect("in-flight gauge registers once");
}

/// Keeps a gauge raised for as long as it lives
pub struct InFlight {
    gauge: IntGauge,
}

impl InFlight {
    pub fn start(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self {
            gauge: gauge.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics are not valid UTF-8")
}
