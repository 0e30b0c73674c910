pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// Formats whole minutes as `1h 05m` or `25m`.
pub fn format_minutes(minutes: i64) -> String {
    let minutes = minutes.max(0);
    if minutes >= 60 {
        format!("{}h {:02}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

/// Formats a remaining time in seconds as `mm:ss`.
pub fn format_clock(secs: f64) -> String {
    let total = secs.max(0.0).ceil() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[1., 2., 3.]), Some(2.0));
        assert_eq!(mean(&[3., 3., 2., 1.]), Some(2.25));
    }

    #[test]
    fn test_mean_empty_slice() {
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0), "0m");
        assert_eq!(format_minutes(25), "25m");
        assert_eq!(format_minutes(65), "1h 05m");
        assert_eq!(format_minutes(-3), "0m");
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "00:00");
        assert_eq!(format_clock(9.2), "00:10");
        assert_eq!(format_clock(1500.0), "25:00");
        assert_eq!(format_clock(-1.0), "00:00");
    }
}
