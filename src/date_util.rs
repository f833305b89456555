use chrono::{Duration, NaiveDate};

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    first_day_of_next_month(year, month) - Duration::days(1)
}

fn first_day_of_next_month(year: i32, month: u32) -> NaiveDate {
    let (y, m) = if month >= 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(y, m, 1).unwrap_or(NaiveDate::MAX)
}

/// Get the quarter (1-4) for a month number (1-12).
pub fn quarter_of_month(month: u32) -> u8 {
    ((month.clamp(1, 12) - 1) / 3 + 1) as u8
}

/// Shift a (year, month) pair by `delta` months, carrying across year boundaries.
pub fn add_months(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + (month as i32 - 1) + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2025, 1),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
        assert_eq!(
            last_day_of_month(2025, 2),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        ); // Leap year
        assert_eq!(
            last_day_of_month(2025, 12),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_quarter_of_month() {
        assert_eq!(quarter_of_month(1), 1);
        assert_eq!(quarter_of_month(3), 1);
        assert_eq!(quarter_of_month(4), 2);
        assert_eq!(quarter_of_month(9), 3);
        assert_eq!(quarter_of_month(12), 4);
    }

    #[test]
    fn test_add_months() {
        assert_eq!(add_months(2025, 6, -5), (2025, 1));
        assert_eq!(add_months(2025, 1, -1), (2024, 12));
        assert_eq!(add_months(2025, 12, 1), (2026, 1));
        assert_eq!(add_months(2025, 3, -15), (2023, 12));
        assert_eq!(add_months(2025, 3, 0), (2025, 3));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(112.200_000_000_000_02, 2), 112.2);
        assert_eq!(round_to(0.123_456, 4), 0.1235);
        assert_eq!(round_to(4.66, 1), 4.7);
        assert_eq!(round_to(-1.005, 0), -1.0);
    }
}
