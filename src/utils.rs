//! Small helpers shared across modules.

use crate::messaging::Properties;

/// Describe a message using its ids, exchange and routing key
pub fn message_info(exchange: &str, routing_key: &str, properties: &Properties) -> String {
    let mut output = Vec::new();
    if let Some(message_id) = &properties.message_id {
        output.push(message_id.clone());
    }
    if let Some(correlation_id) = &properties.correlation_id {
        output.push(format!("[correlation_id=\"{correlation_id}\"]"));
    }
    if !exchange.is_empty() {
        output.push(format!("published to \"{exchange}\""));
    }
    if !routing_key.is_empty() {
        output.push(format!("using \"{routing_key}\""));
    }
    output.join(" ")
}

/// Nearest-rank percentile of `values`; `None` for an empty slice
pub fn percentile(values: &[f64], k: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let index = (sorted.len() as f64 * (k / 100.0)) - 1.0;
    let index = index.ceil().max(0.0) as usize;
    sorted.get(index.min(sorted.len() - 1)).copied()
}
