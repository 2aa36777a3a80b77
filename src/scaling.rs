/// Applies unit-aware scaling to a raw metric value. Response-time metrics
/// come back in microseconds and are converted to milliseconds, either by
/// declared unit or by metric-identifier naming convention; byte values are
/// converted to kilobytes. Everything else passes through unchanged.
pub fn scale_value(metric_id: &str, unit: &str, value: f64) -> f64 {
    if unit == "MicroSecond" || metric_id.contains("builtin:service.response.time") {
        return value / 1000.0;
    }
    if unit == "Byte" {
        return value / 1024.0;
    }
    value
}

/// Plain arithmetic mean over the values present in a tuple; the backend pads
/// series with nulls, which are skipped. `None` when no value remains.
pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}
