//! Calendar handling for bucketed analytics
//!
//! Everything date-shaped lives here:
//!
//! - **`Resolution`**: the four rollup granularities and the set of
//!   coarser rollups each one maintains
//! - **label formatting**: the canonical text a date renders to at a
//!   given granularity, which becomes the timestamp segment of store keys
//! - **`DateSpec`**: a per-call timestamp, either already parsed or raw
//!   `YYYY-MM-DD` text resolved when the operation runs
//! - **`TimeFrame`**: discrete date parts addressing one stored label
//!   directly, used by point reads
//!
//! Labels are write-time artifacts: a read only ever matches data that
//! was written under the byte-identical label, so the formatting rules
//! here are load-bearing and pinned by tests.
//!
//! # Example
//!
//! ```rust
//! use redistat::{Resolution, TimeFrame};
//!
//! let date = redistat::time::parse_date("2026-01-05").unwrap();
//! assert_eq!(Resolution::Day.label(date), "2026-01-05");
//! assert_eq!(Resolution::Week.label(date), "2026-W2");
//!
//! let frame = TimeFrame::year(2026).month(1).day(5);
//! assert_eq!(frame.label(), "2026-01-05");
//! ```

use crate::error::Error;
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date format accepted for raw timestamp text.
const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Resolution
// =============================================================================

/// Rollup granularity of a metric.
///
/// A metric configured at some resolution is readable at that granularity
/// and every coarser one, because each write fans out to all of them (see
/// [`Resolution::scoped`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Calendar day.
    Day,
    /// ISO week.
    Week,
    /// Calendar month.
    Month,
    /// Calendar year.
    Year,
}

impl Resolution {
    /// Granularities a write at this resolution maintains, finest first.
    ///
    /// Rollups only widen: a day-resolution metric also keeps week, month
    /// and year totals, while a year-resolution metric keeps years only.
    pub fn scoped(self) -> &'static [Resolution] {
        match self {
            Resolution::Day => &[
                Resolution::Day,
                Resolution::Week,
                Resolution::Month,
                Resolution::Year,
            ],
            Resolution::Week => &[Resolution::Week, Resolution::Month, Resolution::Year],
            Resolution::Month => &[Resolution::Month, Resolution::Year],
            Resolution::Year => &[Resolution::Year],
        }
    }

    /// Canonical label for `date` at this granularity.
    ///
    /// - day: `YYYY-MM-DD`
    /// - week: `YYYY-W<week>`, ISO week number without zero padding,
    ///   prefixed with the calendar year of the date itself
    /// - month: `YYYY-MM`
    /// - year: `YYYY`
    ///
    /// Note the week rule: a late-December date belonging to ISO week 1
    /// of the next year labels as e.g. `2025-W1`. Reads and writes agree
    /// on the rule, so such dates stay self-consistent.
    pub fn label(self, date: NaiveDate) -> String {
        match self {
            Resolution::Day => date.format("%Y-%m-%d").to_string(),
            Resolution::Week => format!("{}-W{}", date.year(), date.iso_week().week()),
            Resolution::Month => date.format("%Y-%m").to_string(),
            Resolution::Year => date.format("%Y").to_string(),
        }
    }

    /// The next interval point after `date` at this granularity.
    ///
    /// Month and year steps are calendar-aware and clamp to the last day
    /// of shorter months, so walking from Jan 31 yields Feb 28 (or 29).
    pub fn advance(self, date: NaiveDate) -> NaiveDate {
        let next = match self {
            Resolution::Day => date.checked_add_days(Days::new(1)),
            Resolution::Week => date.checked_add_days(Days::new(7)),
            Resolution::Month => date.checked_add_months(Months::new(1)),
            Resolution::Year => date.checked_add_months(Months::new(12)),
        };
        next.unwrap_or(NaiveDate::MAX)
    }

    /// Short lowercase name, matching the configuration file spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Day => "day",
            Resolution::Week => "week",
            Resolution::Month => "month",
            Resolution::Year => "year",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "days" => Ok(Resolution::Day),
            "week" | "weeks" => Ok(Resolution::Week),
            "month" | "months" => Ok(Resolution::Month),
            "year" | "years" => Ok(Resolution::Year),
            other => Err(Error::InvalidConfiguration(format!(
                "unknown resolution {other:?}"
            ))),
        }
    }
}

// =============================================================================
// Date parsing
// =============================================================================

/// Parse `YYYY-MM-DD` text into a date.
pub fn parse_date(input: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| Error::InvalidTimestamp(input.to_string()))
}

/// A per-call timestamp: either an already-parsed date or raw text.
///
/// Raw text is parsed lazily, when the operation that received it runs,
/// so a bad date surfaces as [`Error::InvalidTimestamp`] from the
/// operation itself rather than at call-chain construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSpec {
    /// Already-parsed calendar date.
    Date(NaiveDate),
    /// Raw text parsed as `YYYY-MM-DD` when the operation runs.
    Text(String),
}

impl DateSpec {
    /// Resolve to a concrete date.
    pub fn resolve(&self) -> Result<NaiveDate, Error> {
        match self {
            DateSpec::Date(date) => Ok(*date),
            DateSpec::Text(text) => parse_date(text),
        }
    }
}

impl From<NaiveDate> for DateSpec {
    fn from(date: NaiveDate) -> Self {
        DateSpec::Date(date)
    }
}

impl From<&str> for DateSpec {
    fn from(text: &str) -> Self {
        DateSpec::Text(text.to_string())
    }
}

impl From<String> for DateSpec {
    fn from(text: String) -> Self {
        DateSpec::Text(text)
    }
}

// =============================================================================
// TimeFrame
// =============================================================================

/// Discrete date parts addressing one stored label.
///
/// Point reads take a frame instead of a date because the parts map
/// directly onto a label: whichever parts are present are rendered in
/// year, month, week, day order. `TimeFrame::year(2026).month(1)` reads
/// the monthly rollup, `.week(3)` on its own the weekly one, and a frame
/// must carry the parts the target rollup was written with to match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFrame {
    year: i32,
    month: Option<u32>,
    week: Option<u32>,
    day: Option<u32>,
}

impl TimeFrame {
    /// Frame addressing a yearly label.
    pub fn year(year: i32) -> Self {
        TimeFrame {
            year,
            month: None,
            week: None,
            day: None,
        }
    }

    /// Add a month part (zero-padded to two digits in the label).
    pub fn month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    /// Add an ISO week part (rendered unpadded, as `W<week>`).
    pub fn week(mut self, week: u32) -> Self {
        self.week = Some(week);
        self
    }

    /// Add a day part (zero-padded to two digits in the label).
    pub fn day(mut self, day: u32) -> Self {
        self.day = Some(day);
        self
    }

    /// Render the label this frame addresses: `YYYY[-MM][-W<w>][-DD]`.
    pub fn label(&self) -> String {
        let mut label = self.year.to_string();
        if let Some(month) = self.month {
            label.push_str(&format!("-{month:02}"));
        }
        if let Some(week) = self.week {
            label.push_str(&format!("-W{week}"));
        }
        if let Some(day) = self.day {
            label.push_str(&format!("-{day:02}"));
        }
        label
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ===== Label formatting tests =====

    #[test]
    fn day_labels_are_zero_padded() {
        assert_eq!(Resolution::Day.label(date(2026, 1, 5)), "2026-01-05");
        assert_eq!(Resolution::Day.label(date(2026, 11, 25)), "2026-11-25");
    }

    #[test]
    fn week_labels_use_unpadded_iso_weeks() {
        // 2026-01-05 is the Monday of ISO week 2.
        assert_eq!(Resolution::Week.label(date(2026, 1, 1)), "2026-W1");
        assert_eq!(Resolution::Week.label(date(2026, 1, 5)), "2026-W2");
        assert_eq!(Resolution::Week.label(date(2026, 3, 18)), "2026-W12");
    }

    #[test]
    fn week_labels_keep_the_calendar_year() {
        // 2025-12-29 falls in ISO week 1 of 2026 but labels under 2025.
        assert_eq!(Resolution::Week.label(date(2025, 12, 29)), "2025-W1");
    }

    #[test]
    fn month_and_year_labels() {
        assert_eq!(Resolution::Month.label(date(2026, 1, 5)), "2026-01");
        assert_eq!(Resolution::Year.label(date(2026, 1, 5)), "2026");
    }

    // ===== Scoped rollup tests =====

    #[test]
    fn scoped_rollups_only_widen() {
        assert_eq!(
            Resolution::Day.scoped(),
            &[
                Resolution::Day,
                Resolution::Week,
                Resolution::Month,
                Resolution::Year
            ]
        );
        assert_eq!(
            Resolution::Week.scoped(),
            &[Resolution::Week, Resolution::Month, Resolution::Year]
        );
        assert_eq!(
            Resolution::Month.scoped(),
            &[Resolution::Month, Resolution::Year]
        );
        assert_eq!(Resolution::Year.scoped(), &[Resolution::Year]);
    }

    // ===== Advance tests =====

    #[test]
    fn day_and_week_advance_by_fixed_spans() {
        assert_eq!(Resolution::Day.advance(date(2026, 1, 31)), date(2026, 2, 1));
        assert_eq!(Resolution::Week.advance(date(2026, 1, 5)), date(2026, 1, 12));
    }

    #[test]
    fn month_advance_clamps_to_shorter_months() {
        assert_eq!(
            Resolution::Month.advance(date(2026, 1, 31)),
            date(2026, 2, 28)
        );
        assert_eq!(
            Resolution::Month.advance(date(2024, 1, 31)),
            date(2024, 2, 29)
        );
    }

    #[test]
    fn year_advance_clamps_leap_days() {
        assert_eq!(
            Resolution::Year.advance(date(2024, 2, 29)),
            date(2025, 2, 28)
        );
    }

    // ===== Parsing tests =====

    #[test]
    fn parse_date_accepts_iso_dates() {
        assert_eq!(parse_date("2026-01-05").unwrap(), date(2026, 1, 5));
        assert_eq!(parse_date("  2026-01-05 ").unwrap(), date(2026, 1, 5));
    }

    #[test]
    fn parse_date_rejects_garbage() {
        for input in ["2026-13-01", "2026-02-30", "yesterday", "", "2026/01/05"] {
            let err = parse_date(input).unwrap_err();
            assert!(matches!(err, Error::InvalidTimestamp(_)), "input {input:?}");
        }
    }

    #[test]
    fn date_spec_resolves_lazily() {
        let spec = DateSpec::from("2026-02-30");
        assert!(spec.resolve().is_err());

        let spec = DateSpec::from(date(2026, 1, 5));
        assert_eq!(spec.resolve().unwrap(), date(2026, 1, 5));
    }

    #[test]
    fn resolution_parses_singular_and_plural() {
        assert_eq!("day".parse::<Resolution>().unwrap(), Resolution::Day);
        assert_eq!("weeks".parse::<Resolution>().unwrap(), Resolution::Week);
        assert_eq!("Months".parse::<Resolution>().unwrap(), Resolution::Month);
        assert!("fortnight".parse::<Resolution>().is_err());
    }

    // ===== TimeFrame tests =====

    #[test]
    fn frames_render_their_parts_in_order() {
        assert_eq!(TimeFrame::year(2026).label(), "2026");
        assert_eq!(TimeFrame::year(2026).month(1).label(), "2026-01");
        assert_eq!(TimeFrame::year(2026).week(3).label(), "2026-W3");
        assert_eq!(TimeFrame::year(2026).month(1).day(5).label(), "2026-01-05");
    }

    #[test]
    fn frame_labels_match_date_labels() {
        let d = date(2026, 1, 5);
        assert_eq!(
            TimeFrame::year(2026).month(1).day(5).label(),
            Resolution::Day.label(d)
        );
        assert_eq!(TimeFrame::year(2026).week(2).label(), Resolution::Week.label(d));
        assert_eq!(TimeFrame::year(2026).month(1).label(), Resolution::Month.label(d));
        assert_eq!(TimeFrame::year(2026).label(), Resolution::Year.label(d));
    }
}
