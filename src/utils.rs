//! Utility functions shared by the runner and the pipeline
use std::time::Duration;

/// Format a duration to a human-readable string (e.g., "2m 30s", "1h 15m")
pub fn format_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let secs_remaining = secs % 60.0;
        format!("{}m {:.0}s", mins, secs_remaining)
    } else {
        let hours = (secs / 3600.0).floor();
        let mins_remaining = ((secs % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours, mins_remaining)
    }
}

/// Population variance; `None` for fewer than two samples
pub fn variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration_ranges() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(150)), "2m 30s");
        assert_eq!(format_duration(Duration::from_secs(4500)), "1h 15m");
    }

    #[test]
    fn test_variance() {
        assert_eq!(variance(&[1.0]), None);
        assert_eq!(variance(&[2.0, 2.0, 2.0]), Some(0.0));
        assert_eq!(variance(&[1.0, 3.0]), Some(1.0));
    }
}
