//! Exact / loose prediction scoring.

use std::fmt;

use crate::constants::SILENCE_LABEL;

/// A class name interpreted as a DOA label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DoaLabel {
    Silence,
    Angle(f32),
}

impl DoaLabel {
    /// `None` for class names that are neither `silence` nor a finite number.
    pub fn parse(name: &str) -> Option<Self> {
        if name == SILENCE_LABEL {
            Some(Self::Silence)
        } else {
            name.trim()
                .parse::<f32>()
                .ok()
                .filter(|a| a.is_finite())
                .map(Self::Angle)
        }
    }
}

/// Shortest distance between two bearings, in degrees.
pub fn angular_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

pub fn exact_match(expected: &str, got: &str) -> bool {
    expected == got
}

/// `true` when `got` lies within `tolerance_deg` of `expected`.
///
/// `silence` only ever matches `silence`; names that do not parse as a
/// label fall back to exact comparison.
pub fn loose_match(expected: &str, got: &str, tolerance_deg: f32) -> bool {
    match (DoaLabel::parse(expected), DoaLabel::parse(got)) {
        (Some(DoaLabel::Silence), Some(DoaLabel::Silence)) => true,
        (Some(DoaLabel::Angle(a)), Some(DoaLabel::Angle(b))) => {
            angular_distance(a, b) <= tolerance_deg
        }
        (Some(_), Some(_)) => false,
        _ => exact_match(expected, got),
    }
}

/// Running exact / loose hit counts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccuracyReport {
    pub total: usize,
    pub exact: usize,
    pub loose: usize,
}

impl AccuracyReport {
    pub fn record(&mut self, expected: &str, got: &str, tolerance_deg: f32) {
        self.total += 1;
        if exact_match(expected, got) {
            self.exact += 1;
        }
        if loose_match(expected, got, tolerance_deg) {
            self.loose += 1;
        }
    }

    pub fn exact_percent(&self) -> f32 {
        percent(self.exact, self.total)
    }

    pub fn loose_percent(&self) -> f32 {
        percent(self.loose, self.total)
    }
}

fn percent(hits: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        hits as f32 * 100.0 / total as f32
    }
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Exact accuracy: {:.2}% ({}/{})",
            self.exact_percent(),
            self.exact,
            self.total
        )?;
        write!(
            f,
            "Loose accuracy: {:.2}% ({}/{})",
            self.loose_percent(),
            self.loose,
            self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_matches_only_silence() {
        assert!(exact_match("silence", "silence"));
        assert!(loose_match("silence", "silence", 11.25));
        assert!(!loose_match("silence", "0.000", 360.0));
        assert!(!loose_match("0.000", "silence", 360.0));
    }

    #[test]
    fn loose_match_wraps_around() {
        assert!(loose_match("354.375", "5.625", 11.25));
        assert!(!exact_match("354.375", "5.625"));
        assert!(!loose_match("354.375", "16.875", 11.25));
        assert!(loose_match("90.000", "90", 0.0));
    }

    #[test]
    fn unknown_names_compare_exactly() {
        assert!(loose_match("noise", "noise", 5.0));
        assert!(!loose_match("noise", "10.0", 5.0));
    }

    #[test]
    fn non_finite_names_compare_exactly() {
        assert_eq!(DoaLabel::parse("nan"), None);
        assert_eq!(DoaLabel::parse("inf"), None);
        assert!(loose_match("nan", "nan", 11.25));
        assert!(loose_match("inf", "inf", 11.25));
        assert!(!loose_match("inf", "0.000", 360.0));
    }

    #[test]
    fn report_percentages() {
        let mut r = AccuracyReport::default();
        r.record("45.000", "45.000", 11.25);
        r.record("45.000", "50.625", 11.25);
        r.record("silence", "0.000", 11.25);
        r.record("silence", "silence", 11.25);

        assert_eq!(r.total, 4);
        assert_eq!(r.exact, 2);
        assert_eq!(r.loose, 3);
        assert_eq!(r.exact_percent(), 50.0);
        assert_eq!(r.loose_percent(), 75.0);
        assert_eq!(AccuracyReport::default().loose_percent(), 0.0);
    }

    #[test]
    fn angular_distance_is_symmetric() {
        assert_eq!(angular_distance(10.0, 350.0), 20.0);
        assert_eq!(angular_distance(350.0, 10.0), 20.0);
        assert_eq!(angular_distance(0.0, 180.0), 180.0);
    }
}
