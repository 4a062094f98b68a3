const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// `HH:MM:SS`, with a leading `00:` hour dropped. Wraps at 24h.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64 % 86_400
    } else {
        0
    };
    let full = format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    );
    match full.strip_prefix("00:") {
        Some(rest) => rest.to_string(),
        None => full,
    }
}

/// Human size in base 1024 with up to two decimals; missing or zero is `N/A`.
pub fn format_bytes(bytes: Option<u64>) -> String {
    let bytes = match bytes {
        Some(b) if b > 0 => b,
        _ => return "N/A".to_string(),
    };

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let fixed = format!("{:.2}", value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
