//! Academic terms and the policy deciding which terms a run touches.

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the three offering periods in a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Semester {
    Spring,
    Summer,
    Fall,
}

impl Semester {
    /// Database representation (`FALL`, `SPRING`, `SUMMER`).
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Semester::Spring => "SPRING",
            Semester::Summer => "SUMMER",
            Semester::Fall => "FALL",
        }
    }

    /// Parses either the database form or a human label, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spring" => Some(Semester::Spring),
            "summer" => Some(Semester::Summer),
            "fall" => Some(Semester::Fall),
            _ => None,
        }
    }

    /// Month (1-based) of the representative date for this semester.
    fn start_month(&self) -> u32 {
        match self {
            Semester::Spring => 1,
            Semester::Summer => 5,
            Semester::Fall => 8,
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// A (year, semester) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Term {
    pub year: i32,
    pub semester: Semester,
}

impl Term {
    pub fn new(year: i32, semester: Semester) -> Self {
        Self { year, semester }
    }

    /// Maps a calendar date onto the term it falls in.
    ///
    /// January through April is spring, May through July is summer and the
    /// rest of the year is fall.
    pub fn from_date(date: NaiveDate) -> Self {
        let semester = match date.month() {
            1..=4 => Semester::Spring,
            5..=7 => Semester::Summer,
            _ => Semester::Fall,
        };

        Self::new(date.year(), semester)
    }

    /// Representative date of the term: the first day of its first month.
    ///
    /// `Term::from_date(term.to_date()) == term` for every term.
    pub fn to_date(&self) -> NaiveDate {
        // Day 1 of a month in 1..=12 is always valid; the fallback only guards
        // years outside chrono's range.
        NaiveDate::from_ymd_opt(self.year, self.semester.start_month(), 1)
            .unwrap_or(NaiveDate::MIN)
    }

    /// Banner `term_in` code, `YYYYMM` of the representative date.
    pub fn banner_code(&self) -> String {
        format!("{:04}{:02}", self.year, self.semester.start_month())
    }

    /// The term immediately after this one.
    pub fn next(&self) -> Self {
        match self.semester {
            Semester::Spring => Self::new(self.year, Semester::Summer),
            Semester::Summer => Self::new(self.year, Semester::Fall),
            Semester::Fall => Self::new(self.year + 1, Semester::Spring),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.semester, self.year)
    }
}

/// Error returned when a term argument can't be understood.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid term '{input}' (expected e.g. fall-2024, 2024-fall or 202408)")]
pub struct ParseTermError {
    pub input: String,
}

impl FromStr for Term {
    type Err = ParseTermError;

    /// Accepts `fall-2024`, `2024-fall`, `fall 2024` and Banner codes like `202408`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseTermError {
            input: s.to_string(),
        };
        let trimmed = s.trim();

        if trimmed.len() == 6 && trimmed.chars().all(|c| c.is_ascii_digit()) {
            let year: i32 = trimmed[..4].parse().map_err(|_| err())?;
            let month: u32 = trimmed[4..].parse().map_err(|_| err())?;
            let date = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(err)?;
            return Ok(Term::from_date(date));
        }

        let parts: Vec<&str> = trimmed
            .split(|c: char| c == '-' || c == ' ' || c == '_')
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 2 {
            return Err(err());
        }

        let (year, semester) = match (parts[0].parse::<i32>(), parts[1].parse::<i32>()) {
            (Ok(year), Err(_)) => (year, Semester::parse(parts[1])),
            (Err(_), Ok(year)) => (year, Semester::parse(parts[0])),
            _ => return Err(err()),
        };

        semester.map(|s| Term::new(year, s)).ok_or_else(err)
    }
}

/// Supplies the ordered list of terms a run should process.
pub trait TermPolicy: Send + Sync {
    fn terms_to_process(&self) -> Vec<Term>;
}

/// The term containing `today`, followed by the next one.
#[derive(Debug, Clone)]
pub struct CalendarTermPolicy {
    today: NaiveDate,
}

impl CalendarTermPolicy {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    /// Uses the local date at construction time.
    pub fn today() -> Self {
        Self::new(Local::now().date_naive())
    }
}

impl TermPolicy for CalendarTermPolicy {
    fn terms_to_process(&self) -> Vec<Term> {
        let current = Term::from_date(self.today);
        vec![current, current.next()]
    }
}

/// An explicit override, used for targeted reprocessing.
#[derive(Debug, Clone)]
pub struct ExplicitTerms(Vec<Term>);

impl ExplicitTerms {
    pub fn new(terms: Vec<Term>) -> Self {
        Self(terms)
    }
}

impl TermPolicy for ExplicitTerms {
    fn terms_to_process(&self) -> Vec<Term> {
        dedup_terms(self.0.clone())
    }
}

/// Removes repeated terms, keeping the first occurrence.
pub fn dedup_terms(terms: Vec<Term>) -> Vec<Term> {
    let mut out: Vec<Term> = Vec::with_capacity(terms.len());
    for term in terms {
        if !out.contains(&term) {
            out.push(term);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_term_roundtrip() {
        for year in [1999, 2020, 2024] {
            for semester in [Semester::Spring, Semester::Summer, Semester::Fall] {
                let term = Term::new(year, semester);
                assert_eq!(Term::from_date(term.to_date()), term);
            }
        }
    }

    #[test]
    fn test_from_date_boundaries() {
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        assert_eq!(Term::from_date(d(4, 30)).semester, Semester::Spring);
        assert_eq!(Term::from_date(d(5, 1)).semester, Semester::Summer);
        assert_eq!(Term::from_date(d(7, 31)).semester, Semester::Summer);
        assert_eq!(Term::from_date(d(8, 1)).semester, Semester::Fall);
        assert_eq!(Term::from_date(d(12, 31)).semester, Semester::Fall);
    }

    #[test]
    fn test_banner_code() {
        assert_eq!(Term::new(2024, Semester::Fall).banner_code(), "202408");
        assert_eq!(Term::new(2025, Semester::Spring).banner_code(), "202501");
    }

    #[test]
    fn test_parse_term() {
        let fall = Term::new(2024, Semester::Fall);
        assert_eq!("fall-2024".parse::<Term>(), Ok(fall));
        assert_eq!("2024-FALL".parse::<Term>(), Ok(fall));
        assert_eq!("202408".parse::<Term>(), Ok(fall));
        assert!("202413".parse::<Term>().is_err());
        assert!("winter-2024".parse::<Term>().is_err());
        assert!("2024".parse::<Term>().is_err());
    }

    #[test]
    fn test_calendar_policy_wraps_year() {
        let policy = CalendarTermPolicy::new(NaiveDate::from_ymd_opt(2024, 10, 2).unwrap());
        assert_eq!(
            policy.terms_to_process(),
            vec![
                Term::new(2024, Semester::Fall),
                Term::new(2025, Semester::Spring)
            ]
        );
    }

    #[test]
    fn test_explicit_terms_dedup() {
        let fall = Term::new(2024, Semester::Fall);
        let spring = Term::new(2025, Semester::Spring);
        let policy = ExplicitTerms::new(vec![spring, fall, spring]);
        assert_eq!(policy.terms_to_process(), vec![spring, fall]);
    }
}
