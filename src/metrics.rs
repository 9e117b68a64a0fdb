use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

lazy_static! {
    pub static ref PACKETS_SENT: IntCounter = register_int_counter!(
        "wol_packets_sent_total",
        "Magic packets handed to the network stack."
    )
    .unwrap();
    pub static ref SEND_FAILURES: IntCounterVec = register_int_counter_vec!(
        "wol_send_failures_total",
        "Failed wake requests, by failure reason.",
        &["reason"]
    )
    .unwrap();
    pub static ref DISPATCH_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "wol_dispatch_requests_total",
        "Service requests, by method.",
        &["method"]
    )
    .unwrap();
}

/// Renders every registered metric in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    let metrics = prometheus::gather();
    let encoder = prometheus::TextEncoder::new();
    encoder.encode_to_string(&metrics)
}

#[cfg(test)]
mod tests {
    use crate::metrics::*;

    #[test]
    fn test_render_includes_counters() {
        PACKETS_SENT.inc_by(0);
        SEND_FAILURES.with_label_values(&["validation"]).inc();
        let text = render().unwrap();
        assert!(text.contains("wol_packets_sent_total"));
        assert!(text.contains("wol_send_failures_total{reason=\"validation\"}"));
    }
}
