//! Pace and display formatting.

/// Minutes-per-kilometer pace as `M:SS`.
///
/// Zero distance yields `"0:00"`. Seconds are rounded, and a rounding result
/// of 60 carries into the minutes so the seconds field stays within `00..59`.
pub fn format_pace(distance_km: f64, duration_min: f64) -> String {
    if distance_km <= 0.0 {
        return "0:00".to_string();
    }

    let pace = duration_min / distance_km;
    let mut minutes = pace.trunc() as u64;
    let mut seconds = (pace.fract() * 60.0).round() as u64;
    if seconds == 60 {
        minutes += 1;
        seconds = 0;
    }

    format!("{}:{:02}", minutes, seconds)
}

/// Format pace from meters per second to "min:sec" per km
pub fn format_speed_pace(meters_per_second: f64) -> String {
    if meters_per_second <= 0.0 || !meters_per_second.is_finite() {
        return "N/A".to_string();
    }

    let total_seconds = (1000.0 / meters_per_second).round() as u64;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Format a duration in minutes as "Xh Ym", "Ym Zs" or "Ym".
pub fn format_minutes(duration_min: f64) -> String {
    let total_seconds = (duration_min.max(0.0) * 60.0).round() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if secs > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}m", minutes)
    }
}

/// Kilometers with 2 decimal places
pub fn format_km(km: f64) -> String {
    format!("{:.2}", km)
}
