//! Opening, current-period and closing balances of one entity for one cycle.
//!
//! Everything here is a pure function of the entries and baseline passed in.
//! Entries whose issue date is missing or unparseable fall in no window at all:
//! they count neither towards the opening balance nor the current period.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cycle::Cycle;
use crate::domain::{Balance, CumulativeStats, ParagraphStatus, SettlementEntry};
use crate::text::normalize_name;

/// Raised and settled figures of the entries inside one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeriodFigures {
    pub raised_count: i64,
    pub raised_amount: Decimal,
    /// Fully settled paragraphs only.
    pub settled_count: i64,
    /// Recovered plus adjusted money of every paragraph, full or partial.
    pub settled_amount: Decimal,
    pub full_settled_count: i64,
    pub partial_settled_count: i64,
}

impl PeriodFigures {
    fn absorb(&mut self, entry: &SettlementEntry) {
        self.raised_count = self.raised_count.saturating_add(entry.raised_count());
        if !entry.manual_raised_amount.is_zero() {
            self.raised_amount = self.raised_amount.saturating_add(entry.manual_raised_amount);
        }

        for para in &entry.paragraphs {
            match para.status {
                ParagraphStatus::FullySettled => {
                    self.settled_count = self.settled_count.saturating_add(1);
                    self.full_settled_count = self.full_settled_count.saturating_add(1);
                }
                ParagraphStatus::PartiallySettled => {
                    self.partial_settled_count = self.partial_settled_count.saturating_add(1);
                }
            }
            self.settled_amount = self.settled_amount.saturating_add(para.settled_amount());
        }
    }
}

impl std::ops::AddAssign for PeriodFigures {
    fn add_assign(&mut self, rhs: Self) {
        self.raised_count = self.raised_count.saturating_add(rhs.raised_count);
        self.raised_amount = self.raised_amount.saturating_add(rhs.raised_amount);
        self.settled_count = self.settled_count.saturating_add(rhs.settled_count);
        self.settled_amount = self.settled_amount.saturating_add(rhs.settled_amount);
        self.full_settled_count = self.full_settled_count.saturating_add(rhs.full_settled_count);
        self.partial_settled_count = self
            .partial_settled_count
            .saturating_add(rhs.partial_settled_count);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleBalance {
    pub opening: Balance,
    pub current: PeriodFigures,
    pub closing: Balance,
}

fn tally<F>(entity_name: &str, entries: &[SettlementEntry], in_window: F) -> PeriodFigures
where
    F: Fn(NaiveDateTime) -> bool,
{
    let key = normalize_name(entity_name);
    let mut figures = PeriodFigures::default();
    for entry in entries {
        if entry.entity_key() != key {
            continue;
        }
        let Some(issued_at) = entry.issued_at() else {
            continue;
        };
        if !in_window(issued_at) {
            continue;
        }
        figures.absorb(entry);
    }
    figures
}

/// Baseline folded with every entry of `entity_name` issued strictly before
/// `cycle_start`. Unsettled figures are floored at zero; settled are not.
pub fn opening_balance(
    entity_name: &str,
    cycle_start: NaiveDateTime,
    baseline: &CumulativeStats,
    entries: &[SettlementEntry],
) -> Balance {
    let base = baseline.get(entity_name);
    let prior = tally(entity_name, entries, |ts| ts < cycle_start);

    Balance {
        unsettled_count: base.unsettled_count.saturating_add(prior.raised_count).max(0),
        unsettled_amount: base
            .unsettled_amount
            .saturating_add(prior.raised_amount)
            .max(Decimal::ZERO),
        settled_count: base.settled_count.saturating_add(prior.settled_count),
        settled_amount: base.settled_amount.saturating_add(prior.settled_amount),
    }
}

/// Figures of the entries of `entity_name` issued inside `cycle`, bounds inclusive.
pub fn current_period(
    entity_name: &str,
    cycle: &Cycle,
    entries: &[SettlementEntry],
) -> PeriodFigures {
    tally(entity_name, entries, |ts| cycle.contains(ts))
}

/// `closing unsettled = opening unsettled + raised - settled`, exactly.
/// Sums saturate at the numeric limits instead of overflowing.
pub fn closing_balance(opening: &Balance, current: &PeriodFigures) -> Balance {
    Balance {
        unsettled_count: opening
            .unsettled_count
            .saturating_add(current.raised_count)
            .saturating_sub(current.settled_count),
        unsettled_amount: opening
            .unsettled_amount
            .saturating_add(current.raised_amount)
            .saturating_sub(current.settled_amount),
        settled_count: opening.settled_count.saturating_add(current.settled_count),
        settled_amount: opening.settled_amount.saturating_add(current.settled_amount),
    }
}

pub fn cycle_balance(
    entity_name: &str,
    cycle: &Cycle,
    baseline: &CumulativeStats,
    entries: &[SettlementEntry],
) -> CycleBalance {
    let opening = opening_balance(entity_name, cycle.start, baseline, entries);
    let current = current_period(entity_name, cycle, entries);
    let closing = closing_balance(&opening, &current);
    CycleBalance {
        opening,
        current,
        closing,
    }
}

/// Ids of entries that no window can hold because their issue date is
/// missing or unparseable.
pub fn undated_entries(entries: &[SettlementEntry]) -> Vec<&str> {
    entries
        .iter()
        .filter(|e| e.issued_at().is_none())
        .map(|e| e.id.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::{consecutive_cycles, cycle_for_month, resolve_cycle};
    use crate::domain::Paragraph;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn entry(entity: &str, issued: Option<&str>) -> SettlementEntry {
        SettlementEntry {
            id: format!("settle_{}", issued.unwrap_or("none")),
            entity_name: entity.to_string(),
            ministry_name: "Ministry of Local Government".to_string(),
            branch_name: String::new(),
            paragraphs: Vec::new(),
            manual_raised_count: None,
            manual_raised_amount: Decimal::ZERO,
            issue_date_iso: issued.map(str::to_string),
            cycle_label: None,
            approval_status: None,
            created_by: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn para(status: ParagraphStatus, recovered: i64, adjusted: i64) -> Paragraph {
        Paragraph {
            number: "1".to_string(),
            status,
            involved_amount: Decimal::from(recovered + adjusted),
            recovered_amount: Decimal::from(recovered),
            adjusted_amount: Decimal::from(adjusted),
        }
    }

    fn baseline(entity: &str, b: Balance) -> CumulativeStats {
        let mut stats = CumulativeStats::default();
        stats.set(entity, b);
        stats
    }

    fn march_2024() -> Cycle {
        resolve_cycle(NaiveDate::from_ymd_opt(2024, 3, 20).unwrap())
    }

    #[test]
    fn prior_manual_raise_folds_into_opening_balance() {
        let stats = baseline(
            "Barishal WASA",
            Balance {
                unsettled_count: 5,
                unsettled_amount: Decimal::from(10000),
                settled_count: 2,
                settled_amount: Decimal::from(4000),
            },
        );
        let mut e = entry("Barishal WASA", Some("2024-03-01"));
        e.manual_raised_count = Some("3".to_string());
        e.manual_raised_amount = Decimal::from(1500);

        let opening = opening_balance("Barishal WASA", march_2024().start, &stats, &[e]);
        assert_eq!(
            opening,
            Balance {
                unsettled_count: 8,
                unsettled_amount: Decimal::from(11500),
                settled_count: 2,
                settled_amount: Decimal::from(4000),
            }
        );
    }

    #[test]
    fn localized_zero_count_does_not_raise() {
        let cycle = march_2024();
        let mut e = entry("Barishal WASA", Some("2024-03-20"));
        e.manual_raised_count = Some("০".to_string());
        e.manual_raised_amount = Decimal::from(900);

        let current = current_period("Barishal WASA", &cycle, &[e]);
        assert_eq!(current.raised_count, 0);
        assert_eq!(current.raised_amount, Decimal::from(900));
    }

    #[test]
    fn partial_settlement_adds_money_but_not_count() {
        let cycle = march_2024();
        let mut e = entry("Barishal WASA", Some("2024-04-01"));
        e.paragraphs.push(para(ParagraphStatus::PartiallySettled, 500, 200));
        e.paragraphs.push(para(ParagraphStatus::FullySettled, 100, 0));

        let current = current_period("Barishal WASA", &cycle, &[e]);
        assert_eq!(current.settled_amount, Decimal::from(800));
        assert_eq!(current.settled_count, 1);
        assert_eq!(current.full_settled_count, 1);
        assert_eq!(current.partial_settled_count, 1);
    }

    #[test]
    fn cycle_bounds_are_inclusive_and_opening_is_strict() {
        let cycle = march_2024();
        let mut on_start = entry("X", Some("2024-03-16T00:00:00"));
        on_start.manual_raised_count = Some("1".to_string());
        let mut on_end = entry("X", Some("2024-04-15T23:59:59"));
        on_end.manual_raised_count = Some("1".to_string());
        let mut before = entry("X", Some("2024-03-15T23:59:59"));
        before.manual_raised_count = Some("1".to_string());
        let entries = vec![on_start, on_end, before];

        let current = current_period("X", &cycle, &entries);
        assert_eq!(current.raised_count, 2);
        let opening = opening_balance("X", cycle.start, &CumulativeStats::default(), &entries);
        assert_eq!(opening.unsettled_count, 1);
    }

    #[test]
    fn undated_entries_count_nowhere() {
        let cycle = march_2024();
        let mut missing = entry("X", None);
        missing.manual_raised_count = Some("4".to_string());
        let mut garbage = entry("X", Some("sometime in march"));
        garbage.manual_raised_count = Some("4".to_string());
        let entries = vec![missing, garbage];

        let b = cycle_balance("X", &cycle, &CumulativeStats::default(), &entries);
        assert_eq!(b.opening, Balance::default());
        assert_eq!(b.current, PeriodFigures::default());
        assert_eq!(undated_entries(&entries).len(), 2);
    }

    #[test]
    fn names_match_after_normalization() {
        let cycle = march_2024();
        let mut e = entry("  Sylhet\u{200C}  Zilla Parishad", Some("2024-03-18"));
        e.manual_raised_count = Some("২".to_string());
        let mut other = entry("Sylhet Upazila", Some("2024-03-18"));
        other.manual_raised_count = Some("7".to_string());

        let current = current_period("Sylhet Zilla Parishad", &cycle, &[e, other]);
        assert_eq!(current.raised_count, 2);
    }

    #[test]
    fn unsettled_is_clamped_but_settled_is_not() {
        let stats = baseline(
            "X",
            Balance {
                unsettled_count: 1,
                unsettled_amount: Decimal::from(100),
                settled_count: 0,
                settled_amount: Decimal::ZERO,
            },
        );
        let mut e = entry("X", Some("2024-01-05"));
        e.manual_raised_count = Some("-5".to_string());
        e.manual_raised_amount = Decimal::from(-1000);
        e.paragraphs.push(para(ParagraphStatus::PartiallySettled, -300, 0));

        let opening = opening_balance("X", march_2024().start, &stats, &[e]);
        assert_eq!(opening.unsettled_count, 0);
        assert_eq!(opening.unsettled_amount, Decimal::ZERO);
        assert_eq!(opening.settled_count, 0);
        assert_eq!(opening.settled_amount, Decimal::from(-300));
    }

    #[test]
    fn closing_identity_holds_across_consecutive_cycles() {
        let stats = baseline(
            "Rangpur City Corporation",
            Balance {
                unsettled_count: 12,
                unsettled_amount: Decimal::from(250_000),
                settled_count: 3,
                settled_amount: Decimal::from(40_000),
            },
        );

        let mut entries = Vec::new();
        let dates = [
            "2024-01-03", "2024-01-20", "2024-02-15", "2024-02-16", "2024-03-01",
            "2024-04-10", "2024-04-30", "2024-05-16", "2024-06-15", "2024-07-02",
        ];
        for (i, date) in dates.iter().enumerate() {
            let mut e = entry("Rangpur City Corporation", Some(date));
            e.id = format!("settle_{i}");
            e.manual_raised_count = Some(format!("{}", i % 3));
            e.manual_raised_amount = Decimal::from(1000 * (i as i64 + 1));
            e.paragraphs.push(para(ParagraphStatus::FullySettled, 700, 50));
            if i % 2 == 0 {
                e.paragraphs.push(para(ParagraphStatus::PartiallySettled, 120, 30));
            }
            entries.push(e);
        }

        let first = cycle_for_month(2024, 1).unwrap();
        let cycles = consecutive_cycles(&first, 7);
        for cycle in &cycles {
            let b = cycle_balance("Rangpur City Corporation", cycle, &stats, &entries);
            assert_eq!(
                b.closing.unsettled_count,
                b.opening.unsettled_count + b.current.raised_count - b.current.settled_count,
                "{}",
                cycle.label
            );
            assert_eq!(
                b.closing.unsettled_amount,
                b.opening.unsettled_amount + b.current.raised_amount - b.current.settled_amount,
                "{}",
                cycle.label
            );
            assert_eq!(
                b.closing.settled_count,
                b.opening.settled_count + b.current.settled_count
            );
        }

        // Every dated entry lands in exactly one of the walked cycles.
        let mut total = PeriodFigures::default();
        for cycle in &cycles {
            total += current_period("Rangpur City Corporation", cycle, &entries);
        }
        assert_eq!(total.full_settled_count, dates.len() as i64);
        assert_eq!(total.partial_settled_count, 5);
    }

    #[test]
    fn huge_figures_saturate_instead_of_overflowing() {
        let cycle = march_2024();
        let mut a = entry("X", Some("2024-03-20"));
        a.manual_raised_count = Some(i64::MAX.to_string());
        a.manual_raised_amount = Decimal::MAX;
        let mut b = entry("X", Some("2024-03-21"));
        b.manual_raised_count = Some("1".to_string());
        b.manual_raised_amount = Decimal::ONE;
        b.paragraphs.push(Paragraph {
            number: "1".to_string(),
            status: ParagraphStatus::FullySettled,
            involved_amount: Decimal::MAX,
            recovered_amount: Decimal::MAX,
            adjusted_amount: Decimal::MAX,
        });
        let entries = vec![a, b];

        let current = current_period("X", &cycle, &entries);
        assert_eq!(current.raised_count, i64::MAX);
        assert_eq!(current.raised_amount, Decimal::MAX);
        assert_eq!(current.settled_amount, Decimal::MAX);

        let stats = baseline(
            "X",
            Balance {
                unsettled_count: i64::MAX,
                unsettled_amount: Decimal::MAX,
                settled_count: i64::MAX,
                settled_amount: Decimal::MAX,
            },
        );
        let next = cycle.next();
        let b = cycle_balance("X", &next, &stats, &entries);
        assert_eq!(b.opening.unsettled_count, i64::MAX);
        assert_eq!(b.opening.settled_amount, Decimal::MAX);
        assert_eq!(b.closing.settled_count, i64::MAX);

        let mut total = CycleBalance::default();
        total.opening += b.opening;
        total.opening += b.opening;
        assert_eq!(total.opening.unsettled_amount, Decimal::MAX);
    }
}
