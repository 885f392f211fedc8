//! Kiosk Core Types
//!
//! Card identity, gatepass entries, the per-vehicle transaction and the
//! payloads exchanged with collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Toll amount in the smallest currency unit (IDR has no minor unit)
pub type Amount = i64;

/// Card identity record parsed from the reader's raw string
///
/// Raw values look like `RFID_C100_TRK55`: the second `_` token is the tag
/// (`main`) and the third the tractor number (`sub`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfidData {
    pub raw: String,
    pub main: String,
    pub sub: String,
}

impl RfidData {
    /// Parse a raw card string.
    ///
    /// Missing tokens fall back to the whole raw value (`main`) and the empty
    /// string (`sub`). Empty tokens count as missing.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.split('_').skip(1);
        let main = parts
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(raw)
            .to_string();
        let sub = parts.next().unwrap_or_default().to_string();

        Self {
            raw: raw.to_string(),
            main,
            sub,
        }
    }
}

/// Outcome of one gatepass validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum GatePassCheck {
    Accepted { detail: String },
    Rejected { error: String },
}

/// One scanned gatepass, valid or not, in scan order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatePass {
    pub code: String,
    #[serde(flatten)]
    pub check: GatePassCheck,
}

impl GatePass {
    pub fn accepted(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            check: GatePassCheck::Accepted {
                detail: detail.into(),
            },
        }
    }

    pub fn rejected(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            check: GatePassCheck::Rejected {
                error: error.into(),
            },
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        matches!(self.check, GatePassCheck::Accepted { .. })
    }

    /// Detail text for valid entries, error text for rejected ones
    pub fn note(&self) -> &str {
        match &self.check {
            GatePassCheck::Accepted { detail } => detail,
            GatePassCheck::Rejected { error } => error,
        }
    }
}

/// Transaction identifier threaded through gate-in, printing and truck-in
///
/// Decimal Unix-epoch milliseconds, strictly increasing within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn inner(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TransactionId> for String {
    fn from(id: TransactionId) -> Self {
        id.to_string()
    }
}

/// Millisecond-clock id generator
///
/// Two ids generated within the same millisecond (or after the wall clock
/// stepped backwards) get `last + 1`.
#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    last: u64,
}

impl TransactionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&mut self) -> TransactionId {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        self.generate_at(now)
    }

    fn generate_at(&mut self, now_millis: u64) -> TransactionId {
        let id = if now_millis > self.last {
            now_millis
        } else {
            self.last + 1
        };
        self.last = id;
        TransactionId(id)
    }
}

/// Resolved kiosk settings, read-only after startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KioskSettings {
    pub gate_name: String,
    pub toll_amount: Amount,
}

impl KioskSettings {
    pub const DEFAULT_GATE_NAME: &'static str = "Unknown Gate";
    pub const DEFAULT_TOLL_AMOUNT: Amount = 17000;
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self {
            gate_name: Self::DEFAULT_GATE_NAME.to_string(),
            toll_amount: Self::DEFAULT_TOLL_AMOUNT,
        }
    }
}

/// Settings as returned by the settings collaborator (fields may be absent)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub gate_name: Option<String>,
    pub toll_amount: Option<Amount>,
}

impl SettingsRecord {
    /// Apply fallbacks for missing, empty or non-positive values
    pub fn resolve(self) -> KioskSettings {
        let gate_name = self
            .gate_name
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| KioskSettings::DEFAULT_GATE_NAME.to_string());
        let toll_amount = self
            .toll_amount
            .filter(|a| *a > 0)
            .unwrap_or(KioskSettings::DEFAULT_TOLL_AMOUNT);

        KioskSettings {
            gate_name,
            toll_amount,
        }
    }
}

/// Card validation answer from the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardValidation {
    pub status: bool,
    pub message: Option<String>,
}

/// Charge result from the payment terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub success: bool,
    pub message: String,
    pub transaction_id: String,
    pub card_no: String,
    pub amount_paid: Amount,
    pub balance_after: Amount,
    pub timestamp: String,
    pub gate_name: String,
}

/// Container/truck movement record returned by gate-in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmsItem {
    pub daily_seq: Option<String>,
    pub cntr_number: Option<String>,
    pub truck_police_num: Option<String>,
    pub truck_in_time: Option<String>,
}

/// Gate-in registration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateInRequest {
    pub transaction_id: TransactionId,
    pub rfid: RfidData,
    pub gate_passes: Vec<String>,
    pub gate_name: String,
}

/// Gate-in registration answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateInResult {
    pub status: bool,
    pub result: Option<String>,
    pub transaction_id: Option<String>,
    pub cms_items: Option<Vec<CmsItem>>,
}

/// CMS document print job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CmsPrintJob {
    pub transaction_id: String,
    pub cms_items: Vec<CmsItem>,
    pub gate_name: String,
    pub tag_number: String,
    pub tractor_number: String,
}

/// Barrier command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    Open,
    Close,
}

impl GateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateAction::Open => "open",
            GateAction::Close => "close",
        }
    }
}

impl fmt::Display for GateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The unit of work for one vehicle pass
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub rfid: Option<RfidData>,
    pub gatepasses: Vec<GatePass>,
    pub transaction_id: Option<TransactionId>,
    pub final_progress: u8,
    pub final_progress_message: String,
    /// Gatepass wait ran out; a soft reset is pending
    pub expired: bool,
}

impl Transaction {
    /// Codes of valid entries, in scan order
    pub fn valid_codes(&self) -> Vec<String> {
        self.gatepasses
            .iter()
            .filter(|gp| gp.is_valid())
            .map(|gp| gp.code.clone())
            .collect()
    }

    pub fn has_valid_gatepass(&self) -> bool {
        self.gatepasses.iter().any(GatePass::is_valid)
    }

    /// Advance progress; never moves backwards
    pub fn set_progress(&mut self, percent: u8, message: impl Into<String>) {
        self.final_progress = self.final_progress.max(percent.min(100));
        self.final_progress_message = message.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfid_parse_full() {
        let rfid = RfidData::parse("RFID_C100_TRK55");
        assert_eq!(rfid.raw, "RFID_C100_TRK55");
        assert_eq!(rfid.main, "C100");
        assert_eq!(rfid.sub, "TRK55");
    }

    #[test]
    fn test_rfid_parse_two_tokens() {
        let rfid = RfidData::parse("RFID_C100");
        assert_eq!(rfid.main, "C100");
        assert_eq!(rfid.sub, "");
    }

    #[test]
    fn test_rfid_parse_single_token() {
        let rfid = RfidData::parse("SIMCARD0032");
        assert_eq!(rfid.main, "SIMCARD0032");
        assert_eq!(rfid.sub, "");
    }

    #[test]
    fn test_rfid_parse_ignores_extra_tokens() {
        let rfid = RfidData::parse("A_B_C_D");
        assert_eq!(rfid.main, "B");
        assert_eq!(rfid.sub, "C");
    }

    #[test]
    fn test_rfid_parse_empty_main_token() {
        let rfid = RfidData::parse("RFID__TRK55");
        assert_eq!(rfid.main, "RFID__TRK55");
        assert_eq!(rfid.sub, "TRK55");
    }

    #[test]
    fn test_transaction_id_monotonic() {
        let mut id_gen = TransactionIdGenerator::new();
        let a = id_gen.generate_at(1_000);
        let b = id_gen.generate_at(1_000);
        let c = id_gen.generate_at(999);
        let d = id_gen.generate_at(2_000);

        assert_eq!(a.inner(), 1_000);
        assert_eq!(b.inner(), 1_001);
        assert_eq!(c.inner(), 1_002);
        assert_eq!(d.inner(), 2_000);
    }

    #[test]
    fn test_transaction_id_from_clock() {
        let mut id_gen = TransactionIdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();
        assert!(id2 > id1);
        assert_eq!(serde_json::to_string(&id1).unwrap(), format!("\"{id1}\""));
    }

    #[test]
    fn test_settings_fallbacks() {
        let settings = SettingsRecord::default().resolve();
        assert_eq!(settings.gate_name, "Unknown Gate");
        assert_eq!(settings.toll_amount, 17000);

        let settings = SettingsRecord {
            gate_name: Some("  ".into()),
            toll_amount: Some(0),
        }
        .resolve();
        assert_eq!(settings, KioskSettings::default());

        let settings = SettingsRecord {
            gate_name: Some("GATE_A01".into()),
            toll_amount: Some(25000),
        }
        .resolve();
        assert_eq!(settings.gate_name, "GATE_A01");
        assert_eq!(settings.toll_amount, 25000);
    }

    #[test]
    fn test_gatepass_entries() {
        let ok = GatePass::accepted("GP001", "GatePass GP001 accepted and processed.");
        let bad = GatePass::rejected("GP", "Invalid GatePass format or content: GP");
        assert!(ok.is_valid());
        assert!(!bad.is_valid());
        assert_eq!(bad.note(), "Invalid GatePass format or content: GP");

        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["code"], "GP001");
        assert_eq!(json["result"], "accepted");
    }

    #[test]
    fn test_valid_codes_keep_scan_order_and_duplicates() {
        let tx = Transaction {
            gatepasses: vec![
                GatePass::accepted("GP002", "ok"),
                GatePass::rejected("BAD", "nope"),
                GatePass::accepted("GP001", "ok"),
                GatePass::accepted("GP002", "ok"),
            ],
            ..Default::default()
        };
        assert_eq!(tx.valid_codes(), vec!["GP002", "GP001", "GP002"]);
        assert!(tx.has_valid_gatepass());
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut tx = Transaction::default();
        tx.set_progress(50, "half");
        tx.set_progress(20, "back");
        assert_eq!(tx.final_progress, 50);
        assert_eq!(tx.final_progress_message, "back");
        tx.set_progress(150, "over");
        assert_eq!(tx.final_progress, 100);
    }
}
