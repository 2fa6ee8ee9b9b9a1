use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::cycle::parse_timestamp;
use crate::text::{
    canonical_digits, de_count_text, de_localized_count, de_localized_decimal, is_textual_zero,
    normalize_name, parse_localized_count,
};

/// Reserved store id of the opening-balance baseline row.
pub const BASELINE_ID: &str = "cumulative_stats_baseline";
pub const SETTLEMENT_PREFIX: &str = "settle_";
pub const CORRESPONDENCE_PREFIX: &str = "corr_";

pub fn new_settlement_id() -> String {
    format!("{SETTLEMENT_PREFIX}{}", Uuid::new_v4().simple())
}

pub fn new_correspondence_id() -> String {
    format!("{CORRESPONDENCE_PREFIX}{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[serde(alias = "Approved")]
    Approved,
    #[serde(alias = "Pending")]
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParagraphStatus {
    #[serde(alias = "full", alias = "পূর্ণাঙ্গ")]
    FullySettled,
    #[serde(alias = "partial", alias = "আংশিক")]
    PartiallySettled,
}

impl ParagraphStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "full" | "fully_settled" | "পূর্ণাঙ্গ" => Some(Self::FullySettled),
            "partial" | "partially_settled" | "আংশিক" => Some(Self::PartiallySettled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub number: String,
    pub status: ParagraphStatus,
    #[serde(default, deserialize_with = "de_localized_decimal", alias = "involvedAmount")]
    pub involved_amount: Decimal,
    #[serde(default, deserialize_with = "de_localized_decimal", alias = "recoveredAmount")]
    pub recovered_amount: Decimal,
    #[serde(default, deserialize_with = "de_localized_decimal", alias = "adjustedAmount")]
    pub adjusted_amount: Decimal,
}

impl Paragraph {
    /// Money a paragraph settles, whether fully or partially.
    pub fn settled_amount(&self) -> Decimal {
        self.recovered_amount.saturating_add(self.adjusted_amount)
    }

    /// Paragraph numbers match regardless of Bengali or ASCII digits.
    pub fn has_number(&self, number: &str) -> bool {
        canonical_digits(self.number.trim()) == canonical_digits(number.trim())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementEntry {
    pub id: String,
    #[serde(alias = "entityName")]
    pub entity_name: String,
    #[serde(default, alias = "ministryName")]
    pub ministry_name: String,
    #[serde(default, alias = "branchName")]
    pub branch_name: String,

    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,

    /// Free text; may hold Bengali digits.
    #[serde(default, deserialize_with = "de_count_text", alias = "manualRaisedCount")]
    pub manual_raised_count: Option<String>,
    #[serde(default, deserialize_with = "de_localized_decimal", alias = "manualRaisedAmount")]
    pub manual_raised_amount: Decimal,

    #[serde(alias = "issueDateISO")]
    pub issue_date_iso: Option<String>,
    /// Cached display label; never used to place the entry in a cycle.
    #[serde(default, alias = "cycleLabel")]
    pub cycle_label: Option<String>,
    #[serde(default, alias = "approvalStatus")]
    pub approval_status: Option<ApprovalStatus>,

    #[serde(default, alias = "createdBy")]
    pub created_by: Option<String>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl SettlementEntry {
    /// A missing status predates approval gating and counts as approved.
    pub fn is_approved(&self) -> bool {
        !matches!(self.approval_status, Some(ApprovalStatus::Pending))
    }

    pub fn issued_at(&self) -> Option<NaiveDateTime> {
        self.issue_date_iso.as_deref().and_then(parse_timestamp)
    }

    pub fn entity_key(&self) -> String {
        normalize_name(&self.entity_name)
    }

    /// Raised count from the manual override field. Empty and zero sentinels
    /// contribute nothing; unparseable text is treated as zero.
    pub fn raised_count(&self) -> i64 {
        let Some(raw) = self.manual_raised_count.as_deref() else {
            return 0;
        };
        if is_textual_zero(raw) {
            return 0;
        }
        match parse_localized_count(raw) {
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(entry = %self.id, %err, "ignoring unparseable raised count");
                0
            }
        }
    }

    pub fn has_manual_raised(&self) -> bool {
        self.raised_count() != 0 || !self.manual_raised_amount.is_zero()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrespondenceEntry {
    pub id: String,
    #[serde(alias = "entityName")]
    pub entity_name: String,
    #[serde(default, alias = "ministryName")]
    pub ministry_name: String,
    pub letter_no: String,
    pub letter_date: Option<String>,
    #[serde(default)]
    pub diary_no: Option<String>,
    #[serde(default)]
    pub diary_date: Option<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub approval_status: Option<ApprovalStatus>,
    pub created_at: DateTime<Utc>,
}

/// Counts and amounts of unsettled and settled objections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    #[serde(default, deserialize_with = "de_localized_count", alias = "unsettledCount")]
    pub unsettled_count: i64,
    #[serde(default, deserialize_with = "de_localized_decimal", alias = "unsettledAmount")]
    pub unsettled_amount: Decimal,
    #[serde(default, deserialize_with = "de_localized_count", alias = "settledCount")]
    pub settled_count: i64,
    #[serde(default, deserialize_with = "de_localized_decimal", alias = "settledAmount")]
    pub settled_amount: Decimal,
}

impl std::ops::AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.unsettled_count = self.unsettled_count.saturating_add(rhs.unsettled_count);
        self.unsettled_amount = self.unsettled_amount.saturating_add(rhs.unsettled_amount);
        self.settled_count = self.settled_count.saturating_add(rhs.settled_count);
        self.settled_amount = self.settled_amount.saturating_add(rhs.settled_amount);
    }
}

/// Admin-entered prior balances per entity, the seed every cycle replays from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CumulativeStats {
    #[serde(default, alias = "entitiesSFI")]
    pub entities: BTreeMap<String, Balance>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CumulativeStats {
    pub fn get(&self, entity_name: &str) -> Balance {
        let key = normalize_name(entity_name);
        self.entities
            .iter()
            .find(|(name, _)| normalize_name(name) == key)
            .map(|(_, b)| *b)
            .unwrap_or_default()
    }

    /// Replaces the baseline of an entity, dropping any key that only differs
    /// by normalization.
    pub fn set(&mut self, entity_name: &str, balance: Balance) {
        let key = normalize_name(entity_name);
        self.entities.retain(|name, _| normalize_name(name) != key);
        self.entities.insert(key, balance);
    }

    pub fn remove(&mut self, entity_name: &str) -> bool {
        let key = normalize_name(entity_name);
        let before = self.entities.len();
        self.entities.retain(|name, _| normalize_name(name) != key);
        before != self.entities.len()
    }
}

/// JSON content of a store row, disambiguated by its `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentRecord {
    Settlement(SettlementEntry),
    Correspondence(CorrespondenceEntry),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_content_accepts_localized_numbers() {
        let raw = r#"{
            "type": "settlement",
            "id": "settle_1",
            "entity_name": "Rajshahi WASA",
            "paragraphs": [
                {"number": "1", "status": "পূর্ণাঙ্গ", "recovered_amount": "৫০০", "adjusted_amount": 200},
                {"number": "2", "status": "partial", "recovered_amount": null}
            ],
            "manual_raised_count": 3,
            "manual_raised_amount": "১,৫০০",
            "issue_date_iso": "2024-03-01",
            "created_at": "2024-03-01T00:00:00Z"
        }"#;
        let ContentRecord::Settlement(entry) = serde_json::from_str(raw).unwrap() else {
            panic!("expected settlement");
        };
        assert_eq!(entry.manual_raised_count.as_deref(), Some("3"));
        assert_eq!(entry.raised_count(), 3);
        assert_eq!(entry.manual_raised_amount, Decimal::from(1500));
        assert_eq!(entry.paragraphs[0].status, ParagraphStatus::FullySettled);
        assert_eq!(entry.paragraphs[0].settled_amount(), Decimal::from(700));
        assert_eq!(entry.paragraphs[1].settled_amount(), Decimal::ZERO);
        assert!(entry.is_approved());
    }

    #[test]
    fn raised_count_zero_sentinels_contribute_nothing() {
        let mut entry: SettlementEntry = serde_json::from_value(serde_json::json!({
            "id": "settle_2",
            "entity_name": "x",
            "manual_raised_count": "০",
            "issue_date_iso": null,
            "created_at": "2024-03-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(entry.raised_count(), 0);
        assert!(!entry.has_manual_raised());
        entry.manual_raised_count = Some("৪".to_string());
        assert_eq!(entry.raised_count(), 4);
    }

    #[test]
    fn browser_register_rows_decode_with_camel_case_keys() {
        let record: ContentRecord = serde_json::from_value(serde_json::json!({
            "type": "settlement",
            "id": "settle_9",
            "entityName": "Cumilla City Corporation",
            "ministryName": "LGD",
            "paragraphs": [
                {"number": "৭", "status": "আংশিক", "recoveredAmount": 100, "adjustedAmount": "৫০"}
            ],
            "manualRaisedCount": "২",
            "issueDateISO": "2024-04-02T10:30:00+06:00",
            "approvalStatus": "pending",
            "createdAt": "2024-04-02T04:30:00Z"
        }))
        .unwrap();
        let ContentRecord::Settlement(entry) = record else {
            panic!("expected settlement");
        };
        assert_eq!(entry.ministry_name, "LGD");
        assert_eq!(entry.raised_count(), 2);
        assert_eq!(entry.paragraphs[0].settled_amount(), Decimal::from(150));
        assert!(!entry.is_approved());
        assert_eq!(
            entry.issued_at().map(|ts| ts.to_string()).as_deref(),
            Some("2024-04-02 10:30:00")
        );
    }

    #[test]
    fn paragraph_numbers_match_across_digit_scripts() {
        let para = Paragraph {
            number: "১২".to_string(),
            status: ParagraphStatus::FullySettled,
            involved_amount: Decimal::ZERO,
            recovered_amount: Decimal::ZERO,
            adjusted_amount: Decimal::ZERO,
        };
        assert!(para.has_number("12"));
        assert!(para.has_number(" ১২ "));
        assert!(!para.has_number("1"));
    }

    #[test]
    fn baseline_counts_accept_bengali_digit_strings() {
        let stats: CumulativeStats = serde_json::from_value(serde_json::json!({
            "entitiesSFI": {
                "Bogura Pourashava": {
                    "unsettledCount": "৫",
                    "unsettledAmount": "১০,০০০",
                    "settledCount": "2",
                    "settledAmount": 4000
                },
                "Pabna Pourashava": {"unsettled_count": 3}
            }
        }))
        .unwrap();
        let bogura = stats.get("Bogura Pourashava");
        assert_eq!(bogura.unsettled_count, 5);
        assert_eq!(bogura.unsettled_amount, Decimal::from(10_000));
        assert_eq!(bogura.settled_count, 2);
        assert_eq!(bogura.settled_amount, Decimal::from(4000));
        assert_eq!(stats.get("Pabna Pourashava").unsettled_count, 3);
    }

    #[test]
    fn baseline_lookup_uses_normalized_names() {
        let mut stats = CumulativeStats::default();
        stats.set(
            " Khulna  City Corporation",
            Balance {
                unsettled_count: 5,
                ..Balance::default()
            },
        );
        assert_eq!(stats.get("Khulna City\u{200B} Corporation").unsettled_count, 5);
        stats.set("Khulna City Corporation", Balance::default());
        assert_eq!(stats.entities.len(), 1);
        assert!(!stats.remove("khulna city corporation"));
        assert!(stats.remove("Khulna City Corporation"));
    }
}
