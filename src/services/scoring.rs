/// Final numbers frozen onto a completed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AttemptScore {
    pub(crate) score: f64,
    pub(crate) percentage: f64,
    pub(crate) band_score: f64,
    pub(crate) is_passed: bool,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ScoringInput {
    pub(crate) total_questions: i32,
    pub(crate) correct_answers: i32,
    pub(crate) points_earned: f64,
    pub(crate) total_points: f64,
    pub(crate) passing_score: Option<f64>,
}

pub(crate) fn score_attempt(input: ScoringInput) -> AttemptScore {
    let percentage = percentage(input.points_earned, input.total_points);
    AttemptScore {
        score: input.points_earned,
        percentage,
        band_score: band_score(input.correct_answers, input.total_questions),
        is_passed: is_passed(percentage, input.passing_score),
    }
}

pub(crate) fn percentage(points_earned: f64, total_points: f64) -> f64 {
    if total_points <= 0.0 {
        return 0.0;
    }
    points_earned / total_points * 100.0
}

pub(crate) fn is_passed(percentage: f64, passing_score: Option<f64>) -> bool {
    match passing_score {
        Some(threshold) if threshold > 0.0 => percentage >= threshold,
        _ => false,
    }
}

/// IELTS-style band from the share of correct answers. Segments are half-open
/// on the right except the last, which includes 100.
pub(crate) fn band_score(correct_answers: i32, total_questions: i32) -> f64 {
    if total_questions <= 0 {
        return 0.0;
    }
    let pct = (correct_answers as f64 / total_questions as f64 * 100.0).clamp(0.0, 100.0);
    band_for_percentage(pct)
}

fn band_for_percentage(pct: f64) -> f64 {
    if pct < 12.5 {
        pct / 12.5 * 3.0
    } else if pct < 30.0 {
        3.0 + (pct - 12.5) / 17.5 * 1.5
    } else if pct < 50.0 {
        4.5 + (pct - 30.0) / 20.0 * 1.0
    } else if pct < 70.0 {
        5.5 + (pct - 50.0) / 20.0 * 1.5
    } else if pct < 85.0 {
        7.0 + (pct - 70.0) / 15.0 * 1.0
    } else if pct < 95.0 {
        8.0 + (pct - 85.0) / 10.0 * 0.5
    } else {
        8.5 + (pct - 95.0) / 5.0 * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_boundaries_are_exact() {
        assert_eq!(band_for_percentage(0.0), 0.0);
        assert_eq!(band_for_percentage(12.5), 3.0);
        assert_eq!(band_for_percentage(30.0), 4.5);
        assert_eq!(band_for_percentage(50.0), 5.5);
        assert_eq!(band_for_percentage(70.0), 7.0);
        assert_eq!(band_for_percentage(85.0), 8.0);
        assert_eq!(band_for_percentage(95.0), 8.5);
        assert_eq!(band_for_percentage(100.0), 9.0);
    }

    #[test]
    fn band_is_continuous_inside_segments() {
        assert!((band_for_percentage(75.0) - (7.0 + 5.0 / 15.0)).abs() < 1e-12);
        assert!((band_for_percentage(90.0) - 8.25).abs() < 1e-12);
        assert!(band_for_percentage(49.999) < 5.5);
    }

    #[test]
    fn band_from_counts() {
        assert_eq!(band_score(10, 20), 5.5);
        assert_eq!(band_score(19, 20), 8.5);
        assert_eq!(band_score(40, 40), 9.0);
        assert_eq!(band_score(0, 0), 0.0);
        assert_eq!(band_score(5, 4), 9.0);
    }

    #[test]
    fn band_is_deterministic() {
        let first = band_score(7, 13);
        let second = band_score(7, 13);
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn zero_total_points_gives_zero_percentage() {
        assert_eq!(percentage(3.0, 0.0), 0.0);
        assert_eq!(percentage(0.0, 0.0), 0.0);
    }

    #[test]
    fn passing_requires_positive_threshold() {
        assert!(is_passed(70.0, Some(70.0)));
        assert!(!is_passed(69.9, Some(70.0)));
        assert!(!is_passed(100.0, Some(0.0)));
        assert!(!is_passed(100.0, None));
    }

    #[test]
    fn three_of_four_multiple_choice() {
        let result = score_attempt(ScoringInput {
            total_questions: 4,
            correct_answers: 3,
            points_earned: 3.0,
            total_points: 4.0,
            passing_score: Some(70.0),
        });

        assert_eq!(result.score, 3.0);
        assert_eq!(result.percentage, 75.0);
        assert!(result.is_passed);
        assert!((result.band_score - 7.333_333).abs() < 1e-5);
    }
}
