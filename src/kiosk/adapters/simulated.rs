//! Simulated Devices
//!
//! Stand-ins for the reader, SOAP backend, payment terminal and portal relay
//! so the kiosk can run on a workstation without hardware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CardReader, GateActuator, GateBackend, PaymentTerminal, SettingsProvider};
use crate::kiosk::channel::KioskHandle;
use crate::kiosk::error::CollaboratorError;
use crate::kiosk::types::{
    Amount, CardValidation, CmsItem, GateAction, GateInRequest, GateInResult, PaymentReceipt,
    SettingsRecord,
};

// ============================================================================
// Settings
// ============================================================================

pub struct SimulatedSettings {
    record: SettingsRecord,
}

impl SimulatedSettings {
    pub fn new(gate_name: Option<String>, toll_amount: Option<Amount>) -> Self {
        Self {
            record: SettingsRecord {
                gate_name,
                toll_amount,
            },
        }
    }
}

#[async_trait]
impl SettingsProvider for SimulatedSettings {
    async fn get_settings(&self) -> Result<SettingsRecord, CollaboratorError> {
        Ok(self.record.clone())
    }
}

// ============================================================================
// RFID Reader
// ============================================================================

/// Serial reader stand-in, optionally producing synthetic taps
pub struct SimulatedReader {
    port: String,
    baud_rate: u32,
    auto_tap: Option<Duration>,
    taps: Mutex<Option<KioskHandle>>,
    polling: Arc<AtomicBool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedReader {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            auto_tap: None,
            taps: Mutex::new(None),
            polling: Arc::new(AtomicBool::new(false)),
            poll_task: Mutex::new(None),
        }
    }

    /// Emit a synthetic `SIM_CARD_xxxx` tap every `interval` once detection runs
    pub fn with_auto_tap(mut self, interval: Option<Duration>) -> Self {
        self.auto_tap = interval.filter(|d| !d.is_zero());
        self
    }

    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }
}

#[async_trait]
impl CardReader for SimulatedReader {
    async fn init_reader(&self, taps: KioskHandle) -> Result<(), CollaboratorError> {
        info!(port = %self.port, baud = self.baud_rate, "RFID reader initialized");
        if let Ok(mut slot) = self.taps.lock() {
            *slot = Some(taps);
        }
        Ok(())
    }

    async fn start_detection(&self) -> Result<(), CollaboratorError> {
        if self.polling.swap(true, Ordering::AcqRel) {
            debug!("RFID detection already running");
            return Ok(());
        }

        let taps = self.taps.lock().ok().and_then(|slot| slot.clone());
        let Some(taps) = taps else {
            self.polling.store(false, Ordering::Release);
            return Err(CollaboratorError::Unavailable(
                "RFID reader not initialized".to_string(),
            ));
        };

        info!(port = %self.port, "RFID detection started");
        let Some(interval) = self.auto_tap else {
            return Ok(());
        };

        let polling = Arc::clone(&self.polling);
        let handle = tokio::spawn(async move {
            let mut counter: u32 = 0;
            while polling.load(Ordering::Acquire) {
                tokio::time::sleep(interval).await;
                counter = counter.wrapping_add(1);
                let card = format!("SIM_CARD_{counter:04X}");
                debug!(card = %card, "Simulated card detected");
                if taps.card_tapped(card).await.is_err() {
                    warn!("Kiosk channel closed, stopping simulated taps");
                    break;
                }
            }
            polling.store(false, Ordering::Release);
        });

        if let Ok(mut slot) = self.poll_task.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }
}

impl Drop for SimulatedReader {
    fn drop(&mut self) {
        self.polling.store(false, Ordering::Release);
        if let Ok(mut slot) = self.poll_task.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Rule-based card/gatepass registry
#[derive(Default)]
pub struct SimulatedBackend {
    gate_in_count: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate_in_count(&self) -> usize {
        self.gate_in_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GateBackend for SimulatedBackend {
    async fn validate_card(&self, raw: &str) -> Result<CardValidation, CollaboratorError> {
        if raw.trim().is_empty() || raw.contains("INVALID") {
            return Ok(CardValidation {
                status: false,
                message: Some("Card not registered".to_string()),
            });
        }
        Ok(CardValidation {
            status: true,
            message: Some("Card valid".to_string()),
        })
    }

    async fn validate_gatepass(&self, code: &str) -> Result<String, CollaboratorError> {
        if code.to_uppercase().contains("INVALID") || code.chars().count() < 4 {
            return Err(CollaboratorError::Rejected(format!(
                "Invalid GatePass format or content: {code}"
            )));
        }
        Ok(format!("GatePass {code} accepted and processed."))
    }

    async fn gate_in(&self, request: &GateInRequest) -> Result<GateInResult, CollaboratorError> {
        self.gate_in_count.fetch_add(1, Ordering::Relaxed);
        let now = chrono::Utc::now().to_rfc3339();

        let cms_items = request
            .gate_passes
            .iter()
            .enumerate()
            .map(|(i, code)| CmsItem {
                daily_seq: Some(format!("CMS_SIM_{:03}", i + 1)),
                cntr_number: Some(code.clone()),
                truck_police_num: Some(request.rfid.sub.clone()),
                truck_in_time: Some(now.clone()),
            })
            .collect();

        info!(
            transaction_id = %request.transaction_id,
            gate = %request.gate_name,
            passes = request.gate_passes.len(),
            "GateIn accepted"
        );
        Ok(GateInResult {
            status: true,
            result: Some("Success".to_string()),
            transaction_id: Some(request.transaction_id.to_string()),
            cms_items: Some(cms_items),
        })
    }

    async fn confirm_truck_in(&self, transaction_id: &str) -> Result<String, CollaboratorError> {
        info!(transaction_id, "TruckIn confirmed");
        Ok("TruckIn successful.".to_string())
    }
}

// ============================================================================
// Payment Terminal
// ============================================================================

/// Stored-value card terminal with per-card balances
pub struct SimulatedPayment {
    gate_name: String,
    opening_balance: Amount,
    balances: Mutex<HashMap<String, Amount>>,
}

impl SimulatedPayment {
    pub fn new(gate_name: impl Into<String>, opening_balance: Amount) -> Self {
        Self {
            gate_name: gate_name.into(),
            opening_balance,
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub fn balance(&self, card_raw: &str) -> Amount {
        self.balances
            .lock()
            .ok()
            .and_then(|b| b.get(card_raw).copied())
            .unwrap_or(self.opening_balance)
    }
}

/// Card number printed on the slip: second `_` token without reader prefixes
fn extract_card_number(raw: &str) -> String {
    match raw.split('_').nth(1) {
        Some(part) => part.replace("RFID_C", "").replace("_B", ""),
        None => "UNKNOWN".to_string(),
    }
}

#[async_trait]
impl PaymentTerminal for SimulatedPayment {
    async fn charge(
        &self,
        card_raw: &str,
        amount: Amount,
    ) -> Result<PaymentReceipt, CollaboratorError> {
        let now = chrono::Utc::now();
        let mut balances = self
            .balances
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("balance ledger poisoned".to_string()))?;
        let balance = balances
            .entry(card_raw.to_string())
            .or_insert(self.opening_balance);

        let success = *balance >= amount;
        if success {
            *balance -= amount;
        }
        info!(card = card_raw, amount, success, balance = *balance, "Payment processed");

        Ok(PaymentReceipt {
            success,
            message: if success {
                "Payment processed successfully".to_string()
            } else {
                "Insufficient balance".to_string()
            },
            transaction_id: format!("TXN_{}", now.timestamp_millis()),
            card_no: extract_card_number(card_raw),
            amount_paid: if success { amount } else { 0 },
            balance_after: *balance,
            timestamp: now.to_rfc3339(),
            gate_name: self.gate_name.clone(),
        })
    }
}

// ============================================================================
// Portal Relay
// ============================================================================

#[derive(Default)]
pub struct SimulatedGate {
    opened: AtomicU32,
    closed: AtomicU32,
}

impl SimulatedGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> u32 {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn close_count(&self) -> u32 {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GateActuator for SimulatedGate {
    async fn actuate_gate(&self, action: GateAction) -> Result<(), CollaboratorError> {
        match action {
            GateAction::Open => self.opened.fetch_add(1, Ordering::Relaxed),
            GateAction::Close => self.closed.fetch_add(1, Ordering::Relaxed),
        };
        info!(action = %action, "Portal command sent (simulated)");
        Ok(())
    }
}
