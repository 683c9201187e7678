//! Prometheus metrics exposition
//!
//! Service-level metrics for the generation endpoint:
//!
//! - `art_requests_total` (counter): label `outcome`
//! - `art_request_duration_seconds` (histogram): label `outcome`
//!
//! Rotation-level counters (`keypool_exhausted_keys_total`, …) are emitted by
//! the keypool crate and rendered through the same recorder.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `art_request_duration_seconds` with explicit buckets so it
/// renders as a histogram (with `_bucket` lines) rather than a summary.
/// Generation calls routinely take tens of seconds, so the buckets run out
/// to the 60s timeout ceiling.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "art_request_duration_seconds".to_string(),
            ),
            &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed generation request with its outcome label.
///
/// Outcomes: `delivered`, `content_filtered`, `rejected`, `exhausted`,
/// `sink_error`.
pub fn record_request(outcome: &str, duration_secs: f64) {
    metrics::counter!("art_requests_total", "outcome" => outcome.to_string()).increment(1);
    metrics::histogram!("art_request_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_request_does_not_panic_without_recorder() {
        // When no recorder is installed, metrics calls are no-ops.
        record_request("delivered", 12.5);
    }

    /// Create an isolated recorder/handle pair for unit tests. Uses
    /// build_recorder() instead of install_recorder() because only one global
    /// recorder can exist per process.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full(
                    "art_request_duration_seconds".to_string(),
                ),
                &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0],
            )
            .expect("failed to set histogram buckets")
            .build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_renders_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("delivered", 8.2);
        record_request("exhausted", 31.0);

        let output = handle.render();
        assert!(output.contains("art_requests_total"));
        assert!(output.contains("outcome=\"delivered\""));
        assert!(output.contains("outcome=\"exhausted\""));
        assert!(
            output.contains("art_request_duration_seconds_bucket"),
            "histogram must render _bucket lines for histogram_quantile() queries"
        );
    }

    #[test]
    fn histogram_buckets_reach_the_timeout_ceiling() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("delivered", 0.05);

        let output = handle.render();
        assert!(output.contains("le=\"0.1\""));
        assert!(output.contains("le=\"60\""));
        assert!(output.contains("le=\"+Inf\""));
    }
}
