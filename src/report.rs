use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::balance::{CycleBalance, cycle_balance, undated_entries};
use crate::cycle::{Cycle, consecutive_cycles};
use crate::domain::{CumulativeStats, SettlementEntry};
use crate::text::normalize_name;

#[derive(Debug, Clone, Default)]
pub struct ReturnFilter {
    pub ministry: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnRow {
    pub entity: String,
    pub ministry: String,
    #[serde(flatten)]
    pub balance: CycleBalance,
}

#[derive(Debug, Clone, Serialize)]
pub struct MinistrySummary {
    pub ministry: String,
    pub entities: usize,
    #[serde(flatten)]
    pub balance: CycleBalance,
}

/// The cycle return: one row per entity plus per-ministry and grand totals.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReturn {
    pub cycle: Cycle,
    pub rows: Vec<ReturnRow>,
    pub ministries: Vec<MinistrySummary>,
    pub total: CycleBalance,
    /// Approved entries left out of every window for lack of a usable date.
    pub undated: Vec<String>,
    pub pending: usize,
}

fn add_balance(into: &mut CycleBalance, other: &CycleBalance) {
    into.opening += other.opening;
    into.current += other.current;
    into.closing += other.closing;
}

fn approved(entries: &[SettlementEntry]) -> Vec<SettlementEntry> {
    entries.iter().filter(|e| e.is_approved()).cloned().collect()
}

/// Builds the return for `cycle`. Only approved entries participate; entities
/// that exist only in the baseline still get a row.
pub fn build_return(
    cycle: &Cycle,
    baseline: &CumulativeStats,
    entries: &[SettlementEntry],
    filter: &ReturnFilter,
) -> CycleReturn {
    let pending = entries.len() - entries.iter().filter(|e| e.is_approved()).count();
    let entries = approved(entries);
    let ministry_key = filter.ministry.as_deref().map(normalize_name);

    // entity key -> (display name, ministry display name)
    let mut entities: BTreeMap<String, (String, String)> = BTreeMap::new();
    for e in &entries {
        entities
            .entry(e.entity_key())
            .or_insert_with(|| (normalize_name(&e.entity_name), normalize_name(&e.ministry_name)));
    }
    for name in baseline.entities.keys() {
        let key = normalize_name(name);
        entities
            .entry(key.clone())
            .or_insert_with(|| (key, String::new()));
    }

    let mut rows: Vec<ReturnRow> = entities
        .into_values()
        .filter(|(_, ministry)| match &ministry_key {
            Some(wanted) => ministry == wanted,
            None => true,
        })
        .map(|(entity, ministry)| {
            let balance = cycle_balance(&entity, cycle, baseline, &entries);
            ReturnRow {
                entity,
                ministry,
                balance,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.ministry
            .cmp(&b.ministry)
            .then_with(|| a.entity.cmp(&b.entity))
    });

    let mut by_ministry: BTreeMap<String, MinistrySummary> = BTreeMap::new();
    let mut total = CycleBalance::default();
    for row in &rows {
        let summary = by_ministry
            .entry(row.ministry.clone())
            .or_insert_with(|| MinistrySummary {
                ministry: row.ministry.clone(),
                entities: 0,
                balance: CycleBalance::default(),
            });
        summary.entities += 1;
        add_balance(&mut summary.balance, &row.balance);
        add_balance(&mut total, &row.balance);
    }

    let undated: Vec<String> = undated_entries(&entries)
        .into_iter()
        .map(str::to_string)
        .collect();
    for id in &undated {
        tracing::warn!(entry = %id, "entry has no usable issue date; excluded from every cycle");
    }

    CycleReturn {
        cycle: cycle.clone(),
        rows,
        ministries: by_ministry.into_values().collect(),
        total,
        undated,
        pending,
    }
}

/// Balances of one entity over `count` consecutive cycles from `first`.
pub fn build_history(
    entity: &str,
    first: &Cycle,
    count: usize,
    baseline: &CumulativeStats,
    entries: &[SettlementEntry],
) -> Vec<(Cycle, CycleBalance)> {
    let entries = approved(entries);
    consecutive_cycles(first, count)
        .into_iter()
        .map(|cycle| {
            let balance = cycle_balance(entity, &cycle, baseline, &entries);
            (cycle, balance)
        })
        .collect()
}

pub const RETURN_HEADERS: &[&str] = &[
    "ministry",
    "entity",
    "open_unsettled",
    "open_unsettled_amt",
    "raised",
    "raised_amt",
    "settled_full",
    "settled_partial",
    "settled_amt",
    "close_unsettled",
    "close_unsettled_amt",
    "close_settled",
    "close_settled_amt",
];

pub fn balance_cells(b: &CycleBalance) -> Vec<String> {
    let amt = |d: Decimal| d.round_dp(2).normalize().to_string();
    vec![
        b.opening.unsettled_count.to_string(),
        amt(b.opening.unsettled_amount),
        b.current.raised_count.to_string(),
        amt(b.current.raised_amount),
        b.current.full_settled_count.to_string(),
        b.current.partial_settled_count.to_string(),
        amt(b.current.settled_amount),
        b.closing.unsettled_count.to_string(),
        amt(b.closing.unsettled_amount),
        b.closing.settled_count.to_string(),
        amt(b.closing.settled_amount),
    ]
}

pub fn return_table_rows(ret: &CycleReturn) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    for row in &ret.rows {
        let mut cells = vec![display_or_dash(&row.ministry), row.entity.clone()];
        cells.extend(balance_cells(&row.balance));
        out.push(cells);
    }
    for m in &ret.ministries {
        let mut cells = vec![
            display_or_dash(&m.ministry),
            format!("(subtotal, {} entities)", m.entities),
        ];
        cells.extend(balance_cells(&m.balance));
        out.push(cells);
    }
    let mut cells = vec!["TOTAL".to_string(), String::new()];
    cells.extend(balance_cells(&ret.total));
    out.push(cells);
    out
}

fn display_or_dash(s: &str) -> String {
    if s.is_empty() { "-".to_string() } else { s.to_string() }
}
