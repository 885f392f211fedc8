//! Collaborator Adapters
//!
//! The kiosk core talks to the outside world (settings store, RFID reader,
//! SOAP backend, payment terminal, printers, portal relay) only through the
//! traits below.

#[cfg(feature = "simulator")]
pub mod simulated;
pub mod slip_printer;

#[cfg(feature = "simulator")]
pub use simulated::{
    SimulatedBackend, SimulatedGate, SimulatedPayment, SimulatedReader, SimulatedSettings,
};
pub use slip_printer::TextSlipPrinter;

use std::sync::Arc;

use async_trait::async_trait;

use super::channel::KioskHandle;
use super::error::CollaboratorError;
use super::types::{
    Amount, CardValidation, CmsPrintJob, GateAction, GateInRequest, GateInResult,
    PaymentReceipt, SettingsRecord,
};

/// Settings storage
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get_settings(&self) -> Result<SettingsRecord, CollaboratorError>;
}

/// RFID reader
#[async_trait]
pub trait CardReader: Send + Sync {
    /// Open the reader. Detected cards are pushed through `taps`.
    async fn init_reader(&self, taps: KioskHandle) -> Result<(), CollaboratorError>;

    /// (Re-)engage scanning. Must be idempotent.
    async fn start_detection(&self) -> Result<(), CollaboratorError>;
}

/// Gate backend (card registry, gatepass registry, gate-in/truck-in)
#[async_trait]
pub trait GateBackend: Send + Sync {
    async fn validate_card(&self, raw: &str) -> Result<CardValidation, CollaboratorError>;

    /// Validate one gatepass.
    ///
    /// Returns the backend's detail text; an invalid gatepass is
    /// `Err(CollaboratorError::Rejected(reason))`.
    async fn validate_gatepass(&self, code: &str) -> Result<String, CollaboratorError>;

    async fn gate_in(&self, request: &GateInRequest) -> Result<GateInResult, CollaboratorError>;

    async fn confirm_truck_in(&self, transaction_id: &str) -> Result<String, CollaboratorError>;
}

/// Payment terminal
#[async_trait]
pub trait PaymentTerminal: Send + Sync {
    /// Charge the card. A declined charge is `Ok` with `success == false`.
    async fn charge(&self, card_raw: &str, amount: Amount)
    -> Result<PaymentReceipt, CollaboratorError>;
}

/// Slip/document printer
#[async_trait]
pub trait SlipPrinter: Send + Sync {
    async fn print_slip(&self, receipt: &PaymentReceipt) -> Result<(), CollaboratorError>;

    async fn print_cms(&self, job: &CmsPrintJob) -> Result<(), CollaboratorError>;
}

/// Portal barrier relay
#[async_trait]
pub trait GateActuator: Send + Sync {
    async fn actuate_gate(&self, action: GateAction) -> Result<(), CollaboratorError>;
}

/// Bundle of collaborator handles passed to the session
#[derive(Clone)]
pub struct Collaborators {
    pub settings: Arc<dyn SettingsProvider>,
    pub reader: Arc<dyn CardReader>,
    pub backend: Arc<dyn GateBackend>,
    pub payment: Arc<dyn PaymentTerminal>,
    pub printer: Arc<dyn SlipPrinter>,
    pub gate: Arc<dyn GateActuator>,
}

/// Configurable in-memory collaborators for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::kiosk::types::{CmsItem, RfidData};

    pub struct MockCollaborators {
        /// Call order, one entry per collaborator call
        calls: Mutex<Vec<&'static str>>,
        taps: Mutex<Option<KioskHandle>>,
        settings: Mutex<SettingsRecord>,

        detection_count: AtomicUsize,
        validate_card_count: AtomicUsize,
        charge_count: AtomicUsize,
        slip_count: AtomicUsize,
        gatepass_count: AtomicUsize,
        gate_in_count: AtomicUsize,

        /// Configured behavior
        fail_settings: Mutex<bool>,
        fail_reader_init: Mutex<bool>,
        fail_detection: Mutex<bool>,
        card_valid: Mutex<bool>,
        fail_card_call: Mutex<bool>,
        card_delay: Mutex<Option<Duration>>,
        decline_payment: Mutex<bool>,
        fail_payment_call: Mutex<bool>,
        fail_slip: Mutex<bool>,
        rejected_gatepasses: Mutex<HashSet<String>>,
        gate_in_override: Mutex<Option<GateInResult>>,
        fail_gate_in_call: Mutex<bool>,
        fail_print_cms: Mutex<bool>,
        fail_truck_in: Mutex<bool>,
        fail_gate: Mutex<bool>,

        /// Captured payloads
        charges: Mutex<Vec<(String, Amount)>>,
        gate_in_requests: Mutex<Vec<GateInRequest>>,
        cms_jobs: Mutex<Vec<CmsPrintJob>>,
        truck_in_ids: Mutex<Vec<String>>,
        gate_actions: Mutex<Vec<GateAction>>,
    }

    impl MockCollaborators {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                taps: Mutex::new(None),
                settings: Mutex::new(SettingsRecord {
                    gate_name: Some("GATE_TEST".to_string()),
                    toll_amount: Some(17000),
                }),
                detection_count: AtomicUsize::new(0),
                validate_card_count: AtomicUsize::new(0),
                charge_count: AtomicUsize::new(0),
                slip_count: AtomicUsize::new(0),
                gatepass_count: AtomicUsize::new(0),
                gate_in_count: AtomicUsize::new(0),
                fail_settings: Mutex::new(false),
                fail_reader_init: Mutex::new(false),
                fail_detection: Mutex::new(false),
                card_valid: Mutex::new(true),
                fail_card_call: Mutex::new(false),
                card_delay: Mutex::new(None),
                decline_payment: Mutex::new(false),
                fail_payment_call: Mutex::new(false),
                fail_slip: Mutex::new(false),
                rejected_gatepasses: Mutex::new(HashSet::new()),
                gate_in_override: Mutex::new(None),
                fail_gate_in_call: Mutex::new(false),
                fail_print_cms: Mutex::new(false),
                fail_truck_in: Mutex::new(false),
                fail_gate: Mutex::new(false),
                charges: Mutex::new(Vec::new()),
                gate_in_requests: Mutex::new(Vec::new()),
                cms_jobs: Mutex::new(Vec::new()),
                truck_in_ids: Mutex::new(Vec::new()),
                gate_actions: Mutex::new(Vec::new()),
            })
        }

        pub fn collaborators(self: &Arc<Self>) -> Collaborators {
            Collaborators {
                settings: self.clone(),
                reader: self.clone(),
                backend: self.clone(),
                payment: self.clone(),
                printer: self.clone(),
                gate: self.clone(),
            }
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn switch(flag: &Mutex<bool>) -> bool {
            *flag.lock().unwrap()
        }

        // --- behavior switches ---

        pub fn set_settings(&self, settings: SettingsRecord) {
            *self.settings.lock().unwrap() = settings;
        }

        pub fn set_fail_settings(&self, fail: bool) {
            *self.fail_settings.lock().unwrap() = fail;
        }

        pub fn set_fail_reader_init(&self, fail: bool) {
            *self.fail_reader_init.lock().unwrap() = fail;
        }

        pub fn set_fail_detection(&self, fail: bool) {
            *self.fail_detection.lock().unwrap() = fail;
        }

        pub fn set_card_valid(&self, valid: bool) {
            *self.card_valid.lock().unwrap() = valid;
        }

        pub fn set_fail_card_call(&self, fail: bool) {
            *self.fail_card_call.lock().unwrap() = fail;
        }

        pub fn set_card_delay(&self, delay: Option<Duration>) {
            *self.card_delay.lock().unwrap() = delay;
        }

        pub fn set_decline_payment(&self, decline: bool) {
            *self.decline_payment.lock().unwrap() = decline;
        }

        pub fn set_fail_payment_call(&self, fail: bool) {
            *self.fail_payment_call.lock().unwrap() = fail;
        }

        pub fn set_fail_slip(&self, fail: bool) {
            *self.fail_slip.lock().unwrap() = fail;
        }

        pub fn reject_gatepass(&self, code: &str) {
            self.rejected_gatepasses
                .lock()
                .unwrap()
                .insert(code.to_string());
        }

        pub fn set_gate_in_result(&self, result: GateInResult) {
            *self.gate_in_override.lock().unwrap() = Some(result);
        }

        pub fn set_fail_gate_in_call(&self, fail: bool) {
            *self.fail_gate_in_call.lock().unwrap() = fail;
        }

        pub fn set_fail_print_cms(&self, fail: bool) {
            *self.fail_print_cms.lock().unwrap() = fail;
        }

        pub fn set_fail_truck_in(&self, fail: bool) {
            *self.fail_truck_in.lock().unwrap() = fail;
        }

        pub fn set_fail_gate(&self, fail: bool) {
            *self.fail_gate.lock().unwrap() = fail;
        }

        // --- observations ---

        pub fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        /// Handle the reader received at init (None before init)
        pub fn taps(&self) -> Option<KioskHandle> {
            self.taps.lock().unwrap().clone()
        }

        pub fn detection_count(&self) -> usize {
            self.detection_count.load(Ordering::SeqCst)
        }

        pub fn validate_card_count(&self) -> usize {
            self.validate_card_count.load(Ordering::SeqCst)
        }

        pub fn charge_count(&self) -> usize {
            self.charge_count.load(Ordering::SeqCst)
        }

        pub fn slip_count(&self) -> usize {
            self.slip_count.load(Ordering::SeqCst)
        }

        pub fn gatepass_count(&self) -> usize {
            self.gatepass_count.load(Ordering::SeqCst)
        }

        pub fn gate_in_count(&self) -> usize {
            self.gate_in_count.load(Ordering::SeqCst)
        }

        pub fn charges(&self) -> Vec<(String, Amount)> {
            self.charges.lock().unwrap().clone()
        }

        pub fn gate_in_requests(&self) -> Vec<GateInRequest> {
            self.gate_in_requests.lock().unwrap().clone()
        }

        pub fn cms_jobs(&self) -> Vec<CmsPrintJob> {
            self.cms_jobs.lock().unwrap().clone()
        }

        pub fn truck_in_ids(&self) -> Vec<String> {
            self.truck_in_ids.lock().unwrap().clone()
        }

        pub fn gate_actions(&self) -> Vec<GateAction> {
            self.gate_actions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SettingsProvider for MockCollaborators {
        async fn get_settings(&self) -> Result<SettingsRecord, CollaboratorError> {
            self.record("get_settings");
            if Self::switch(&self.fail_settings) {
                return Err(CollaboratorError::Unavailable("settings store offline".into()));
            }
            Ok(self.settings.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl CardReader for MockCollaborators {
        async fn init_reader(&self, taps: KioskHandle) -> Result<(), CollaboratorError> {
            self.record("init_reader");
            if Self::switch(&self.fail_reader_init) {
                return Err(CollaboratorError::Unavailable("COM3 not found".into()));
            }
            *self.taps.lock().unwrap() = Some(taps);
            Ok(())
        }

        async fn start_detection(&self) -> Result<(), CollaboratorError> {
            self.record("start_detection");
            self.detection_count.fetch_add(1, Ordering::SeqCst);
            if Self::switch(&self.fail_detection) {
                return Err(CollaboratorError::Unavailable("reader not initialized".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GateBackend for MockCollaborators {
        async fn validate_card(&self, _raw: &str) -> Result<CardValidation, CollaboratorError> {
            self.record("validate_card");
            self.validate_card_count.fetch_add(1, Ordering::SeqCst);

            let delay = *self.card_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            if Self::switch(&self.fail_card_call) {
                return Err(CollaboratorError::Transport("connection refused".into()));
            }
            if Self::switch(&self.card_valid) {
                Ok(CardValidation {
                    status: true,
                    message: Some("Card valid".into()),
                })
            } else {
                Ok(CardValidation {
                    status: false,
                    message: Some("Card blocked".into()),
                })
            }
        }

        async fn validate_gatepass(&self, code: &str) -> Result<String, CollaboratorError> {
            self.record("validate_gatepass");
            self.gatepass_count.fetch_add(1, Ordering::SeqCst);

            if self.rejected_gatepasses.lock().unwrap().contains(code) {
                return Err(CollaboratorError::Rejected(format!(
                    "GatePass {code} not registered"
                )));
            }
            Ok(format!("GatePass {code} accepted"))
        }

        async fn gate_in(&self, request: &GateInRequest) -> Result<GateInResult, CollaboratorError> {
            self.record("gate_in");
            self.gate_in_count.fetch_add(1, Ordering::SeqCst);
            self.gate_in_requests.lock().unwrap().push(request.clone());

            if Self::switch(&self.fail_gate_in_call) {
                return Err(CollaboratorError::Transport("SOAP endpoint unreachable".into()));
            }
            if let Some(result) = self.gate_in_override.lock().unwrap().clone() {
                return Ok(result);
            }

            let cms_items = request
                .gate_passes
                .iter()
                .enumerate()
                .map(|(i, code)| CmsItem {
                    daily_seq: Some(format!("CMS_{:03}", i + 1)),
                    cntr_number: Some(code.clone()),
                    truck_police_num: Some(request.rfid.sub.clone()),
                    truck_in_time: None,
                })
                .collect();
            Ok(GateInResult {
                status: true,
                result: Some("OK".into()),
                transaction_id: None,
                cms_items: Some(cms_items),
            })
        }

        async fn confirm_truck_in(&self, transaction_id: &str) -> Result<String, CollaboratorError> {
            self.record("confirm_truck_in");
            self.truck_in_ids
                .lock()
                .unwrap()
                .push(transaction_id.to_string());

            if Self::switch(&self.fail_truck_in) {
                return Err(CollaboratorError::Rejected("TruckIn refused".into()));
            }
            Ok("TruckIn successful.".into())
        }
    }

    #[async_trait]
    impl PaymentTerminal for MockCollaborators {
        async fn charge(
            &self,
            card_raw: &str,
            amount: Amount,
        ) -> Result<PaymentReceipt, CollaboratorError> {
            self.record("charge");
            self.charge_count.fetch_add(1, Ordering::SeqCst);
            self.charges
                .lock()
                .unwrap()
                .push((card_raw.to_string(), amount));

            if Self::switch(&self.fail_payment_call) {
                return Err(CollaboratorError::Transport("terminal timeout".into()));
            }
            let success = !Self::switch(&self.decline_payment);
            Ok(PaymentReceipt {
                success,
                message: if success {
                    "Payment successful".into()
                } else {
                    "Insufficient balance".into()
                },
                transaction_id: "TXN_MOCK".into(),
                card_no: RfidData::parse(card_raw).main,
                amount_paid: if success { amount } else { 0 },
                balance_after: 50_000,
                timestamp: "2024-01-01T00:00:00Z".into(),
                gate_name: "GATE_TEST".into(),
            })
        }
    }

    #[async_trait]
    impl SlipPrinter for MockCollaborators {
        async fn print_slip(&self, _receipt: &PaymentReceipt) -> Result<(), CollaboratorError> {
            self.record("print_slip");
            self.slip_count.fetch_add(1, Ordering::SeqCst);
            if Self::switch(&self.fail_slip) {
                return Err(CollaboratorError::Unavailable("paper out".into()));
            }
            Ok(())
        }

        async fn print_cms(&self, job: &CmsPrintJob) -> Result<(), CollaboratorError> {
            self.record("print_cms");
            self.cms_jobs.lock().unwrap().push(job.clone());
            if Self::switch(&self.fail_print_cms) {
                return Err(CollaboratorError::Unavailable("paper out".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GateActuator for MockCollaborators {
        async fn actuate_gate(&self, action: GateAction) -> Result<(), CollaboratorError> {
            self.record("actuate_gate");
            self.gate_actions.lock().unwrap().push(action);
            if Self::switch(&self.fail_gate) {
                return Err(CollaboratorError::Transport("relay not responding".into()));
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_default_success() {
            let mock = MockCollaborators::new();
            let c = mock.collaborators();

            let v = c.backend.validate_card("RFID_C100_TRK55").await.unwrap();
            assert!(v.status);

            let receipt = c.payment.charge("RFID_C100_TRK55", 17000).await.unwrap();
            assert!(receipt.success);
            assert_eq!(receipt.card_no, "C100");
            assert_eq!(mock.charges(), vec![("RFID_C100_TRK55".to_string(), 17000)]);
            assert_eq!(mock.calls(), vec!["validate_card", "charge"]);
        }

        #[tokio::test]
        async fn test_mock_failure_switches() {
            let mock = MockCollaborators::new();
            let c = mock.collaborators();
            mock.set_card_valid(false);
            mock.set_fail_slip(true);
            mock.reject_gatepass("GP404");

            assert!(!c.backend.validate_card("X").await.unwrap().status);
            assert!(c.backend.validate_gatepass("GP404").await.unwrap_err().is_rejection());
            assert!(c.backend.validate_gatepass("GP001").await.is_ok());

            let receipt = c.payment.charge("X", 1).await.unwrap();
            assert!(c.printer.print_slip(&receipt).await.is_err());
            assert_eq!(mock.slip_count(), 1);
        }
    }
}

#[cfg(test)]
pub use mock::MockCollaborators;
