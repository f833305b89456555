use super::types::Direction;

/// Fractional change of `current` against `prior`.
///
/// Only defined for a present, non-zero prior; otherwise the delta is `None`
/// and the direction is flat.
pub fn compute_delta(current: f64, prior: Option<f64>) -> (Option<f64>, Direction) {
    match prior {
        Some(prev) if prev != 0.0 => {
            let direction = if current > prev {
                Direction::Up
            } else if current < prev {
                Direction::Down
            } else {
                Direction::Flat
            };
            (Some((current - prev) / prev), direction)
        }
        _ => (None, Direction::Flat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up() {
        assert_eq!(compute_delta(110.0, Some(100.0)), (Some(0.1), Direction::Up));
    }

    #[test]
    fn test_down() {
        assert_eq!(compute_delta(90.0, Some(100.0)), (Some(-0.1), Direction::Down));
    }

    #[test]
    fn test_zero_or_absent_prior() {
        assert_eq!(compute_delta(90.0, Some(0.0)), (None, Direction::Flat));
        assert_eq!(compute_delta(90.0, None), (None, Direction::Flat));
    }

    #[test]
    fn test_unchanged() {
        assert_eq!(compute_delta(50.0, Some(50.0)), (Some(0.0), Direction::Flat));
    }

    #[test]
    fn test_negative_prior_direction_follows_difference() {
        // From a loss of 100 to a loss of 50 is an improvement.
        let (delta, dir) = compute_delta(-50.0, Some(-100.0));
        assert_eq!(dir, Direction::Up);
        assert_eq!(delta, Some(-0.5));
    }
}
