use crate::api::Error;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, TextEncoder};

lazy_static! {
    pub static ref REQUESTS: IntCounterVec = register_int_counter_vec!(
        opts!("solarlog_requests_total", "requests issued to the device"),
        &["kind"],
    )
    .unwrap();
    pub static ref REQUEST_FAILURES: IntCounterVec = register_int_counter_vec!(
        opts!(
            "solarlog_request_failures_total",
            "device requests that failed on the transport",
        ),
        &["kind"],
    )
    .unwrap();
    pub static ref LOGIN_FAILURES: IntCounter = register_int_counter!(opts!(
        "solarlog_login_failures_total",
        "failed logins and login status checks",
    ))
    .unwrap();
    pub static ref PUBLISHED_MESSAGES: IntCounter = register_int_counter!(opts!(
        "mqtt_published_messages_total",
        "messages handed to the MQTT client",
    ))
    .unwrap();
    pub static ref DEVICES: IntGauge = register_int_gauge!(opts!(
        "solarlog_devices",
        "devices discovered on the device",
    ))
    .unwrap();
}

/// Read metrics from Prometheus exporter registry.
pub fn read() -> Result<String, Error> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| Error::DecodeFailure(format!("Unable to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| Error::DecodeFailure(format!("Metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_show_up_in_text_output() {
        LOGIN_FAILURES.inc();
        REQUESTS.with_label_values(&["fast"]).inc();

        let text = read().unwrap();
        assert!(text.contains("solarlog_login_failures_total"));
        assert!(text.contains("solarlog_requests_total{kind=\"fast\"}"));
    }
}
