//! Kiosk Session
//!
//! Owns the single active transaction and drives the state machine. All
//! transitions happen inside [`KioskSession::dispatch`], called from one loop
//! over the kiosk channel. Collaborator calls are awaited inside the dispatch
//! of the event that caused them, so events arriving meanwhile wait in the
//! channel and meet the state guards of whatever state the call left behind.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::adapters::Collaborators;
use super::channel::{KioskEvent, KioskHandle, KioskReceiver, TimerPurpose};
use super::debounce::ScanDebouncer;
use super::error::KioskError;
use super::pipeline::{FinalPipeline, PipelineStage};
use super::state::{KioskState, Trigger};
use super::status::{KioskSnapshot, Status};
use super::timer::{Countdown, OneShot};
use super::types::{
    GateInRequest, GatePass, KioskSettings, RfidData, Transaction, TransactionIdGenerator,
};

/// Transition traces, filtered by `logging::FSM_TARGET`
macro_rules! fsm_trace {
    ($($arg:tt)+) => {
        tracing::info!(target: "KIOSK_FSM", $($arg)+);
    }
}

/// Timer settings for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KioskTiming {
    pub scan_quiet: Duration,
    pub gatepass_wait_secs: u32,
    pub next_gatepass_wait_secs: u32,
    /// Delay between the gatepass timeout and the automatic reset
    pub timeout_reset_grace: Duration,
    /// How long the success status stays up before the automatic reset
    pub success_display: Duration,
}

impl Default for KioskTiming {
    fn default() -> Self {
        Self {
            scan_quiet: ScanDebouncer::DEFAULT_QUIET,
            gatepass_wait_secs: 10,
            next_gatepass_wait_secs: 10,
            timeout_reset_grace: Duration::from_millis(1500),
            success_display: Duration::from_millis(4000),
        }
    }
}

pub struct KioskSession {
    collaborators: Collaborators,
    settings: KioskSettings,
    timing: KioskTiming,

    state: KioskState,
    status: Status,
    transaction: Transaction,
    id_gen: TransactionIdGenerator,

    gatepass_timer: Countdown,
    next_gatepass_timer: Countdown,
    /// Remaining seconds of the countdown owned by the current state
    countdown: Option<u32>,
    reset_delay: OneShot,
    debouncer: ScanDebouncer,

    /// Loop-back handle for timer callbacks and the reader
    handle: KioskHandle,
    snapshot_tx: watch::Sender<KioskSnapshot>,
}

impl KioskSession {
    pub fn new(collaborators: Collaborators, handle: KioskHandle, timing: KioskTiming) -> Self {
        let settings = KioskSettings::default();
        let state = KioskState::DetectingRfid;
        let status = Status::default();
        let transaction = Transaction::default();

        let (snapshot_tx, _) = watch::channel(KioskSnapshot {
            state,
            status_text: status.text.clone(),
            is_error: status.is_error,
            final_progress: 0,
            final_progress_message: String::new(),
            gatepasses: Vec::new(),
            rfid: None,
            gate_name: settings.gate_name.clone(),
            toll_amount: settings.toll_amount,
            countdown: None,
        });

        Self {
            collaborators,
            settings,
            debouncer: ScanDebouncer::new(timing.scan_quiet),
            timing,
            state,
            status,
            transaction,
            id_gen: TransactionIdGenerator::new(),
            gatepass_timer: Countdown::new("gatepass_wait"),
            next_gatepass_timer: Countdown::new("next_gatepass_wait"),
            countdown: None,
            reset_delay: OneShot::new("reset_delay"),
            handle,
            snapshot_tx,
        }
    }

    /// Load settings, open the reader and start detection.
    ///
    /// On failure the session is left in ERROR with the reason as status;
    /// the caller may keep running the loop so an operator reset can retry
    /// detection.
    pub async fn start(&mut self) -> Result<(), KioskError> {
        self.set_status(Status::info("Initializing..."));
        self.publish();

        match self.collaborators.settings.get_settings().await {
            Ok(record) => self.settings = record.resolve(),
            Err(e) => return Err(self.fail_startup(KioskError::Settings(e))),
        }
        info!(
            gate = %self.settings.gate_name,
            toll = self.settings.toll_amount,
            "Kiosk settings loaded"
        );

        self.set_status(Status::info("Initializing RFID Reader..."));
        self.publish();

        if let Err(e) = self
            .collaborators
            .reader
            .init_reader(self.handle.clone())
            .await
        {
            return Err(self.fail_startup(KioskError::ReaderInit(e)));
        }
        if let Err(e) = self.collaborators.reader.start_detection().await {
            return Err(self.fail_startup(KioskError::Detection(e)));
        }

        self.set_status(Status::info("Scanning for RFID tag..."));
        self.publish();
        info!("Kiosk ready");
        Ok(())
    }

    fn fail_startup(&mut self, e: KioskError) -> KioskError {
        error!(code = e.code(), error = %e, "Kiosk initialization failed");
        self.set_status(Status::error(format!("Error initializing: {e}")));
        self.transition(KioskState::Error);
        self.publish();
        e
    }

    /// Watch channel carrying the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<KioskSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn state(&self) -> KioskState {
        self.state
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn settings(&self) -> &KioskSettings {
        &self.settings
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn snapshot(&self) -> KioskSnapshot {
        KioskSnapshot {
            state: self.state,
            status_text: self.status.text.clone(),
            is_error: self.status.is_error,
            final_progress: self.transaction.final_progress,
            final_progress_message: self.transaction.final_progress_message.clone(),
            gatepasses: self.transaction.gatepasses.clone(),
            rfid: self.transaction.rfid.clone(),
            gate_name: self.settings.gate_name.clone(),
            toll_amount: self.settings.toll_amount,
            countdown: self.countdown,
        }
    }

    /// Consume events until `Shutdown` arrives
    pub async fn run(mut self, mut events: KioskReceiver) {
        info!(state = %self.state, "Kiosk dispatch loop started");
        while let Some(event) = events.recv().await {
            let stop = event == KioskEvent::Shutdown;
            self.dispatch(event).await;
            if stop {
                break;
            }
        }
        self.cancel_timers();
        info!("Kiosk dispatch loop stopped");
    }

    /// Apply one event
    pub async fn dispatch(&mut self, event: KioskEvent) {
        debug!(event = event.name(), state = %self.state, "Dispatch");

        match event {
            KioskEvent::CardTapped(raw) => self.on_card_tapped(raw).await,
            KioskEvent::ScanInput(value) => self.on_scan_input(&value),
            KioskEvent::ScanQuiet { generation } => self.on_scan_quiet(generation).await,
            KioskEvent::ConfirmPayment => self.on_confirm_payment().await,
            KioskEvent::Proceed => self.proceed().await,
            KioskEvent::Reset => self.reset().await,
            KioskEvent::CountdownTick {
                timer,
                generation,
                remaining,
            } => self.on_countdown_tick(timer, generation, remaining),
            KioskEvent::CountdownExpired { timer, generation } => {
                self.on_countdown_expired(timer, generation).await
            }
            KioskEvent::ResetDue { generation } => {
                if self.reset_delay.is_current(generation) {
                    self.reset().await;
                } else {
                    debug!(generation, "Stale delayed reset ignored");
                }
            }
            KioskEvent::Shutdown => {
                info!("Kiosk shutting down");
                self.cancel_timers();
            }
        }

        self.publish();
    }

    // ========================================================================
    // Card
    // ========================================================================

    async fn on_card_tapped(&mut self, raw: String) {
        if !self.permits(Trigger::CardTapped) {
            return;
        }

        self.transition(KioskState::ValidatingRfid);
        self.set_status(Status::info(format!("Card: {raw}. Validating...")));
        self.publish();

        match self.collaborators.backend.validate_card(&raw).await {
            Ok(validation) if validation.status => {
                let rfid = RfidData::parse(&raw);
                info!(card = %raw, tag = %rfid.main, tractor = %rfid.sub, "RFID validated");
                self.set_status(Status::info(format!(
                    "RFID Validated: {}. Proceed to payment.",
                    rfid.main
                )));
                self.transaction.rfid = Some(rfid);
                self.transition(KioskState::AwaitingPayment);
            }
            Ok(validation) => {
                let reason = message_or_unknown(validation.message.as_deref());
                warn!(card = %raw, reason, "RFID validation failed");
                self.set_status(Status::error(format!(
                    "RFID Validation Failed: {reason}. Tap card again."
                )));
                self.return_to_detection().await;
            }
            Err(e) => {
                error!(card = %raw, error = %e, "RFID validation error");
                self.set_status(Status::error(format!(
                    "Error validating RFID: {e}. Tap card again."
                )));
                self.return_to_detection().await;
            }
        }
    }

    async fn return_to_detection(&mut self) {
        self.transition(KioskState::DetectingRfid);
        self.ensure_detection().await;
    }

    async fn ensure_detection(&mut self) {
        if let Err(e) = self.collaborators.reader.start_detection().await {
            error!(error = %e, "Error restarting RFID detection");
        }
    }

    // ========================================================================
    // Payment
    // ========================================================================

    async fn on_confirm_payment(&mut self) {
        if !self.permits(Trigger::ConfirmPayment) {
            return;
        }
        let Some(card_raw) = self.transaction.rfid.as_ref().map(|r| r.raw.clone()) else {
            error!("Payment requested without a validated card");
            return;
        };
        let amount = self.settings.toll_amount;

        self.transition(KioskState::ProcessingPayment);
        self.set_status(Status::info("Processing payment..."));
        self.publish();

        match self.collaborators.payment.charge(&card_raw, amount).await {
            Ok(receipt) if receipt.success => {
                info!(
                    card = %card_raw,
                    amount,
                    payment_id = %receipt.transaction_id,
                    balance = receipt.balance_after,
                    "Payment successful"
                );
                self.set_status(Status::info("Payment successful. Printing slip..."));
                self.publish();

                // The charge has settled; a printer fault must not send the
                // driver back to payment.
                match self.collaborators.printer.print_slip(&receipt).await {
                    Ok(()) => self.set_status(Status::info(
                        "Payment slip printed. Scan GatePass QR Code.",
                    )),
                    Err(e) => {
                        error!(payment_id = %receipt.transaction_id, error = %e, "Slip printing failed");
                        self.set_status(Status::error(format!(
                            "Payment successful but slip printing failed: {e}. Scan GatePass QR Code."
                        )));
                    }
                }

                self.transition(KioskState::PaymentSuccessAwaitQr);
                self.arm_countdown(TimerPurpose::GatepassWait);
            }
            Ok(receipt) => {
                let reason = message_or_unknown(Some(receipt.message.as_str()));
                warn!(card = %card_raw, amount, reason, "Payment declined");
                self.set_status(Status::error(format!(
                    "Payment Failed: {reason}. Try again or contact support."
                )));
                self.transition(KioskState::AwaitingPayment);
            }
            Err(e) => {
                error!(card = %card_raw, amount, error = %e, "Payment error");
                self.set_status(Status::error(format!(
                    "Payment Error: {e}. Try again or contact support."
                )));
                self.transition(KioskState::AwaitingPayment);
            }
        }
    }

    // ========================================================================
    // Gatepasses
    // ========================================================================

    fn on_scan_input(&mut self, value: &str) {
        let handle = self.handle.clone();
        self.debouncer.on_input(value, move |generation| async move {
            handle.deliver(KioskEvent::ScanQuiet { generation }).await;
        });
    }

    async fn on_scan_quiet(&mut self, generation: u64) {
        let Some(code) = self.debouncer.settled(generation) else {
            return;
        };
        if !self.permits(Trigger::ScanCaptured) {
            return;
        }
        if self.transaction.expired {
            debug!(code = %code, "Scan ignored, gatepass wait already timed out");
            return;
        }

        self.debouncer.clear();
        self.on_scan_captured(code).await;
    }

    async fn on_scan_captured(&mut self, code: String) {
        self.set_status(Status::info(format!("GatePass {code} scanned. Validating...")));
        self.publish();

        match self.collaborators.backend.validate_gatepass(&code).await {
            Ok(detail) => {
                info!(code = %code, detail = %detail, "GatePass accepted");
                self.transaction
                    .gatepasses
                    .push(GatePass::accepted(code.as_str(), detail));
                self.set_status(Status::info(format!(
                    "GatePass {code} OK. Scan next or proceed."
                )));
                self.transition(KioskState::AwaitingNextQr);
                self.arm_countdown(TimerPurpose::NextGatepassWait);
            }
            Err(e) => {
                warn!(code = %code, error = %e, "GatePass rejected");
                self.transaction
                    .gatepasses
                    .push(GatePass::rejected(code.as_str(), e.to_string()));
                self.set_status(Status::error(format!("Invalid GatePass {code}: {e}. Try again.")));
                // Only the auto-proceed countdown restarts on a list change
                if self.state == KioskState::AwaitingNextQr {
                    self.arm_countdown(TimerPurpose::NextGatepassWait);
                }
            }
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn countdown_for(&mut self, timer: TimerPurpose) -> &mut Countdown {
        match timer {
            TimerPurpose::GatepassWait => &mut self.gatepass_timer,
            TimerPurpose::NextGatepassWait => &mut self.next_gatepass_timer,
        }
    }

    fn arm_countdown(&mut self, timer: TimerPurpose) {
        let seconds = match timer {
            TimerPurpose::GatepassWait => self.timing.gatepass_wait_secs,
            TimerPurpose::NextGatepassWait => self.timing.next_gatepass_wait_secs,
        };
        let tick_handle = self.handle.clone();
        let expire_handle = self.handle.clone();

        self.countdown_for(timer).arm(
            seconds,
            move |generation, remaining| {
                tick_handle.try_notify(KioskEvent::CountdownTick {
                    timer,
                    generation,
                    remaining,
                });
            },
            move |generation| async move {
                expire_handle
                    .deliver(KioskEvent::CountdownExpired { timer, generation })
                    .await;
            },
        );
        self.countdown = Some(seconds);
    }

    /// Check that a timer event belongs to the live run of a timer the
    /// current state owns
    fn timer_event_is_live(&mut self, timer: TimerPurpose, generation: u64) -> bool {
        let owner = match timer {
            TimerPurpose::GatepassWait => KioskState::PaymentSuccessAwaitQr,
            TimerPurpose::NextGatepassWait => KioskState::AwaitingNextQr,
        };
        self.state == owner && self.countdown_for(timer).is_current(generation)
    }

    fn on_countdown_tick(&mut self, timer: TimerPurpose, generation: u64, remaining: u32) {
        if self.timer_event_is_live(timer, generation) {
            self.countdown = Some(remaining);
        }
    }

    async fn on_countdown_expired(&mut self, timer: TimerPurpose, generation: u64) {
        if !self.timer_event_is_live(timer, generation) {
            debug!(timer = timer.as_str(), generation, "Stale countdown expiry ignored");
            return;
        }
        self.countdown = Some(0);

        match timer {
            TimerPurpose::GatepassWait => {
                if !self.permits(Trigger::GatepassWaitExpired) || self.transaction.expired {
                    return;
                }
                warn!("Gatepass scan timeout");
                self.transaction.expired = true;
                self.set_status(Status::error("Gatepass scan timeout. Resetting."));
                self.schedule_reset(self.timing.timeout_reset_grace);
            }
            TimerPurpose::NextGatepassWait => {
                if !self.permits(Trigger::NextGatepassExpired) {
                    return;
                }
                info!("Next gatepass wait elapsed, proceeding");
                self.proceed().await;
            }
        }
    }

    fn schedule_reset(&mut self, delay: Duration) {
        let handle = self.handle.clone();
        self.reset_delay.schedule(delay, move |generation| async move {
            handle.deliver(KioskEvent::ResetDue { generation }).await;
        });
    }

    fn cancel_timers(&mut self) {
        self.gatepass_timer.cancel();
        self.next_gatepass_timer.cancel();
        self.reset_delay.cancel();
        self.debouncer.clear();
        self.countdown = None;
    }

    // ========================================================================
    // Final processing
    // ========================================================================

    /// Operator proceed and auto-proceed share this path
    async fn proceed(&mut self) {
        if !self.permits(Trigger::Proceed) {
            return;
        }
        if !self.transaction.has_valid_gatepass() {
            warn!("Proceed requested without a valid gatepass");
            self.set_status(Status::error("No valid GatePasses scanned to proceed."));
            return;
        }
        let Some(rfid) = self.transaction.rfid.clone() else {
            error!("Proceed requested without a validated card");
            return;
        };

        self.transition(KioskState::ProcessingFinal);

        // Every run is a fresh attempt with its own id
        let transaction_id = self.id_gen.generate();
        self.transaction.transaction_id = Some(transaction_id);
        self.transaction.final_progress = 0;
        self.transaction.final_progress_message.clear();

        let request = GateInRequest {
            transaction_id,
            rfid,
            gate_passes: self.transaction.valid_codes(),
            gate_name: self.settings.gate_name.clone(),
        };
        info!(
            transaction_id = %transaction_id,
            passes = request.gate_passes.len(),
            "Final processing started"
        );

        let pipeline = FinalPipeline::new(self.collaborators.clone());
        let result = pipeline
            .run(request, |stage| self.on_pipeline_stage(stage))
            .await;

        match result {
            Ok(outcome) => {
                info!(
                    transaction_id = %outcome.transaction_id,
                    items = outcome.cms_items.len(),
                    "Transaction complete"
                );
                self.schedule_reset(self.timing.success_display);
            }
            Err(e) => {
                error!(
                    transaction_id = %transaction_id,
                    stage = e.stage().as_str(),
                    code = e.code(),
                    error = %e,
                    "Final processing failed"
                );
                self.set_status(Status::error(format!("Final processing error: {e}")));
                self.transition(KioskState::Error);
            }
        }
    }

    fn on_pipeline_stage(&mut self, stage: PipelineStage) {
        fsm_trace!(stage = stage.as_str(), progress = stage.progress(), "Pipeline stage");
        self.transaction
            .set_progress(stage.progress(), stage.message());
        self.set_status(Status::info(stage.message()));
        self.publish();
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Drop the transaction and return to card detection. Legal in every state.
    async fn reset(&mut self) {
        if !self.permits(Trigger::Reset) {
            return;
        }
        info!(state = %self.state, "Resetting kiosk");
        self.cancel_timers();
        self.transaction = Transaction::default();
        self.transition(KioskState::DetectingRfid);
        self.set_status(Status::info("Detecting RFID..."));
        self.publish();
        self.ensure_detection().await;
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn permits(&self, trigger: Trigger) -> bool {
        let allowed = self.state.accepts(trigger);
        if !allowed {
            debug!(?trigger, state = %self.state, "Trigger ignored");
        }
        allowed
    }

    /// Change state, cancelling the timer owned by the state being left
    fn transition(&mut self, next: KioskState) {
        let prev = self.state;
        if prev == next {
            return;
        }

        match prev {
            KioskState::PaymentSuccessAwaitQr => {
                self.gatepass_timer.cancel();
                self.countdown = None;
            }
            KioskState::AwaitingNextQr => {
                self.next_gatepass_timer.cancel();
                self.countdown = None;
            }
            _ => {}
        }

        debug_assert!(
            !next.requires_rfid() || self.transaction.rfid.is_some(),
            "{next} entered without a validated card"
        );
        self.state = next;
        fsm_trace!(from = %prev, to = %next, status = %self.status.text, "Transition");
    }

    fn set_status(&mut self, status: Status) {
        if status.is_error {
            debug!(status = %status.text, "Status (error)");
        }
        self.status = status;
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn set_state(&mut self, state: KioskState) {
        self.state = state;
        self.publish();
    }
}

fn message_or_unknown(message: Option<&str>) -> &str {
    message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("Unknown error")
}
