//! Text Slip Printer
//!
//! Renders payment and CMS slips as plain-text files in an output directory.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::SlipPrinter;
use crate::kiosk::error::CollaboratorError;
use crate::kiosk::types::{Amount, CmsPrintJob, PaymentReceipt};

const RULE: &str = "------------------";
const MISSING: &str = "N/A";

pub struct TextSlipPrinter {
    output_dir: PathBuf,
}

impl TextSlipPrinter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn payment_slip_path(&self, transaction_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("payment_slip_{}.txt", file_safe(transaction_id)))
    }

    pub fn cms_slip_path(&self, transaction_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("cms_slip_{}.txt", file_safe(transaction_id)))
    }

    async fn write_slip(&self, path: &Path, content: String) -> Result<(), CollaboratorError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl SlipPrinter for TextSlipPrinter {
    async fn print_slip(&self, receipt: &PaymentReceipt) -> Result<(), CollaboratorError> {
        let path = self.payment_slip_path(&receipt.transaction_id);
        self.write_slip(&path, render_payment_slip(receipt)).await?;
        info!(transaction_id = %receipt.transaction_id, path = %path.display(), "Payment slip printed");
        Ok(())
    }

    async fn print_cms(&self, job: &CmsPrintJob) -> Result<(), CollaboratorError> {
        let path = self.cms_slip_path(&job.transaction_id);
        self.write_slip(&path, render_cms_slip(job)).await?;
        info!(
            transaction_id = %job.transaction_id,
            items = job.cms_items.len(),
            path = %path.display(),
            "CMS slip printed"
        );
        Ok(())
    }
}

/// Keep ids usable as file names
fn file_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn money(amount: Amount) -> String {
    format!("{amount}.00")
}

fn or_missing(value: &str) -> &str {
    if value.is_empty() { MISSING } else { value }
}

pub fn render_payment_slip(receipt: &PaymentReceipt) -> String {
    format!(
        "-- PAYMENT SLIP --\n\
         Gate: {}\n\
         Transaction ID: {}\n\
         Card No: {}\n\
         Amount Paid: {}\n\
         Balance After: {}\n\
         Timestamp: {}\n\
         {RULE}\n",
        receipt.gate_name,
        receipt.transaction_id,
        receipt.card_no,
        money(receipt.amount_paid),
        money(receipt.balance_after),
        receipt.timestamp,
    )
}

pub fn render_cms_slip(job: &CmsPrintJob) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "-- CMS SLIP --");
    let _ = writeln!(out, "Gate: {}", job.gate_name);
    let _ = writeln!(out, "Transaction ID: {}", job.transaction_id);
    let _ = writeln!(
        out,
        "Tag: {}, Tractor: {}",
        or_missing(&job.tag_number),
        or_missing(&job.tractor_number)
    );
    let _ = writeln!(out, "{RULE}");

    if job.cms_items.is_empty() {
        let _ = writeln!(out, "No CMS items found.");
    }
    for item in &job.cms_items {
        let _ = writeln!(
            out,
            "Seq: {}, CN: {}, Police: {}, Time: {}",
            item.daily_seq.as_deref().unwrap_or(MISSING),
            item.cntr_number.as_deref().unwrap_or(MISSING),
            item.truck_police_num.as_deref().unwrap_or(MISSING),
            item.truck_in_time.as_deref().unwrap_or(MISSING),
        );
    }
    let _ = writeln!(out, "{RULE}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiosk::types::CmsItem;

    fn receipt() -> PaymentReceipt {
        PaymentReceipt {
            success: true,
            message: "Payment successful".into(),
            transaction_id: "TXN_1700000000000".into(),
            card_no: "C100".into(),
            amount_paid: 17000,
            balance_after: 83000,
            timestamp: "2024-01-01T08:00:00+00:00".into(),
            gate_name: "GATE_A01".into(),
        }
    }

    fn job(items: Vec<CmsItem>) -> CmsPrintJob {
        CmsPrintJob {
            transaction_id: "1700000000123".into(),
            cms_items: items,
            gate_name: "GATE_A01".into(),
            tag_number: "C100".into(),
            tractor_number: String::new(),
        }
    }

    #[test]
    fn test_render_payment_slip() {
        let text = render_payment_slip(&receipt());
        assert!(text.starts_with("-- PAYMENT SLIP --\nGate: GATE_A01\n"));
        assert!(text.contains("Card No: C100\n"));
        assert!(text.contains("Amount Paid: 17000.00\n"));
        assert!(text.contains("Balance After: 83000.00\n"));
    }

    #[test]
    fn test_render_cms_slip_missing_fields() {
        let text = render_cms_slip(&job(vec![CmsItem {
            daily_seq: Some("CMS_SIM_001".into()),
            cntr_number: Some("GP001".into()),
            ..Default::default()
        }]));
        assert!(text.contains("Tag: C100, Tractor: N/A\n"));
        assert!(text.contains("Seq: CMS_SIM_001, CN: GP001, Police: N/A, Time: N/A\n"));
        assert!(!text.contains("No CMS items found."));
    }

    #[test]
    fn test_render_cms_slip_empty() {
        let text = render_cms_slip(&job(Vec::new()));
        assert!(text.contains("No CMS items found.\n"));
    }

    #[tokio::test]
    async fn test_print_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let printer = TextSlipPrinter::new(dir.path().join("slips"));

        printer.print_slip(&receipt()).await.unwrap();
        printer.print_cms(&job(Vec::new())).await.unwrap();

        let slip = std::fs::read_to_string(printer.payment_slip_path("TXN_1700000000000")).unwrap();
        assert_eq!(slip, render_payment_slip(&receipt()));
        assert!(printer.cms_slip_path("1700000000123").exists());
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let printer = TextSlipPrinter::new(&blocker);
        let err = printer.print_slip(&receipt()).await.unwrap_err();
        assert_eq!(err.code(), "UNAVAILABLE");
    }

    #[test]
    fn test_file_safe_ids() {
        assert_eq!(file_safe("TXN_12/34"), "TXN_12_34");
    }
}
