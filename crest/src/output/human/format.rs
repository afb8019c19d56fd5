use std::time::Duration;

pub(crate) fn format_duration_single(d: Duration) -> String {
    // Single rounded component in one of: ms, s, m.
    let total_ms = d.as_millis();

    const MS_PER_S: u128 = 1_000;
    const MS_PER_M: u128 = 60_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        // Round to nearest integer (ties round up).
        (value + (unit / 2)) / unit
    }

    if total_ms >= 10 * MS_PER_M {
        return format!("{}m", round_div(total_ms, MS_PER_M));
    }
    if total_ms >= MS_PER_S {
        return format!("{}s", round_div(total_ms, MS_PER_S));
    }
    format!("{total_ms}ms")
}

/// `mm:ss` (or `h:mm:ss`) clock for elapsed run time.
pub(crate) fn format_clock(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

pub(crate) fn format_ms(v: f64) -> String {
    if !v.is_finite() {
        return "-".to_string();
    }
    if v >= 100.0 {
        format!("{v:.0}ms")
    } else {
        format!("{v:.1}ms")
    }
}

pub(crate) fn format_pct(ratio: f64) -> String {
    if ratio.is_finite() {
        format!("{:.2}%", ratio * 100.0)
    } else {
        "0.00%".to_string()
    }
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}
