//! Fiscal reporting cycles. A cycle runs from the 16th of one month to the
//! 15th of the next, both days inclusive.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Serialize;

use crate::text::{ParseError, canonical_digits, to_bengali_digits};

pub const CYCLE_START_DAY: u32 = 16;
pub const CYCLE_END_DAY: u32 = 15;

const LABEL_JOINER: &str = "হতে";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    /// First instant of the 16th.
    pub start: NaiveDateTime,
    /// Last millisecond of the 15th.
    pub end: NaiveDateTime,
    pub label: String,
}

/// Returns the cycle containing `reference`.
pub fn resolve_cycle(reference: NaiveDate) -> Cycle {
    let day = reference.day();
    let (start, end) = if day >= CYCLE_START_DAY {
        let start = reference - Days::new(u64::from(day - CYCLE_START_DAY));
        // 16th + 30 days always lands on the 15th..18th of the next month.
        let probe = start + Days::new(30);
        let end = probe - Days::new(u64::from(probe.day() - CYCLE_END_DAY));
        (start, end)
    } else {
        let end = reference + Days::new(u64::from(CYCLE_END_DAY - day));
        // Day zero of this month, i.e. the last day of the previous one.
        let prev_month_last = reference - Days::new(u64::from(day));
        let start = prev_month_last - Days::new(u64::from(prev_month_last.day() - CYCLE_START_DAY));
        (start, end)
    };
    Cycle::from_dates(start, end)
}

/// The cycle selected by a month picker: the one that ends on the 15th of
/// `year-month`.
pub fn cycle_for_month(year: i32, month: u32) -> Result<Cycle, ParseError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ParseError::InvalidMonth(format!("{year:04}-{month:02}")))?;
    Ok(resolve_cycle(first))
}

/// `count` consecutive cycles starting with `first`.
pub fn consecutive_cycles(first: &Cycle, count: usize) -> Vec<Cycle> {
    let mut out = Vec::with_capacity(count);
    let mut current = first.clone();
    for _ in 0..count {
        let next = current.next();
        out.push(current);
        current = next;
    }
    out
}

impl Cycle {
    fn from_dates(start: NaiveDate, end: NaiveDate) -> Self {
        let start_at = start.and_time(NaiveTime::MIN);
        let end_at = (end + Days::new(1)).and_time(NaiveTime::MIN) - TimeDelta::milliseconds(1);
        let label = format!(
            "{} {LABEL_JOINER} {}",
            start.format("%d/%m/%Y"),
            end.format("%d/%m/%Y")
        );
        Self {
            start: start_at,
            end: end_at,
            label,
        }
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end.date()
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn previous(&self) -> Cycle {
        resolve_cycle(self.start_date() - Days::new(1))
    }

    pub fn next(&self) -> Cycle {
        resolve_cycle(self.end_date() + Days::new(1))
    }

    /// The label as shown to users, with Bengali digits.
    pub fn localized_label(&self) -> String {
        to_bengali_digits(&self.label)
    }
}

/// Parses `YYYY-MM`, accepting Bengali digits.
pub fn parse_month(raw: &str) -> Result<(i32, u32), ParseError> {
    let canonical = canonical_digits(raw.trim());
    let invalid = || ParseError::InvalidMonth(raw.to_string());
    let (y, m) = canonical.split_once('-').ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(invalid());
    }
    Ok((year, month))
}

/// Parses a calendar date typed by a user: `YYYY-MM-DD` or `dd/MM/yyyy`,
/// with ASCII or Bengali digits.
pub fn parse_date(raw: &str) -> Result<NaiveDate, ParseError> {
    let canonical = canonical_digits(raw.trim());
    NaiveDate::parse_from_str(&canonical, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&canonical, "%d/%m/%Y"))
        .map_err(|_| ParseError::InvalidDate(raw.to_string()))
}

/// Parses a stored issue date. Accepts RFC3339 (kept in its own local time),
/// a naive ISO timestamp, or a plain date (midnight). Returns `None` for
/// anything else.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let canonical = canonical_digits(raw.trim());
    if canonical.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&canonical) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&canonical, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    parse_date(&canonical)
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}
