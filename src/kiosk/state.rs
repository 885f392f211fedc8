//! Kiosk FSM State Definitions
//!
//! The state enum plus the legality table that decides which operator and
//! device triggers a state will act on.

use std::fmt;

use serde::Serialize;

/// Kiosk FSM States
///
/// Exactly one state is current at any time. ERROR is the only state that
/// requires an operator `reset` to leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KioskState {
    /// Idle, reader scanning for a card
    DetectingRfid,

    /// Card presented, validation call in flight
    ValidatingRfid,

    /// Card valid, waiting for the operator to confirm payment
    AwaitingPayment,

    /// Charge call in flight
    ProcessingPayment,

    /// Paid and slip printed, waiting for the first gatepass
    PaymentSuccessAwaitQr,

    /// At least one valid gatepass collected, waiting for more or proceed
    AwaitingNextQr,

    /// Final processing pipeline running (or success display window)
    ProcessingFinal,

    /// Unrecoverable failure surfaced to the operator
    Error,
}

/// Trigger kinds checked against the current state before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    CardTapped,
    ConfirmPayment,
    ScanCaptured,
    GatepassWaitExpired,
    NextGatepassExpired,
    Proceed,
    Reset,
}

impl KioskState {
    pub const ALL: [KioskState; 8] = [
        KioskState::DetectingRfid,
        KioskState::ValidatingRfid,
        KioskState::AwaitingPayment,
        KioskState::ProcessingPayment,
        KioskState::PaymentSuccessAwaitQr,
        KioskState::AwaitingNextQr,
        KioskState::ProcessingFinal,
        KioskState::Error,
    ];

    /// Check whether this state acts on the given trigger.
    ///
    /// Triggers that are not accepted are dropped without side effects.
    pub fn accepts(&self, trigger: Trigger) -> bool {
        match trigger {
            Trigger::CardTapped => *self == KioskState::DetectingRfid,
            Trigger::ConfirmPayment => *self == KioskState::AwaitingPayment,
            Trigger::ScanCaptured => self.accepts_scans(),
            Trigger::GatepassWaitExpired => *self == KioskState::PaymentSuccessAwaitQr,
            Trigger::NextGatepassExpired | Trigger::Proceed => {
                *self == KioskState::AwaitingNextQr
            }
            Trigger::Reset => true,
        }
    }

    /// Check if the QR capture field feeds the FSM in this state
    #[inline]
    pub fn accepts_scans(&self) -> bool {
        matches!(
            self,
            KioskState::PaymentSuccessAwaitQr | KioskState::AwaitingNextQr
        )
    }

    /// Check if a card record must be present in this state
    #[inline]
    pub fn requires_rfid(&self) -> bool {
        !matches!(
            self,
            KioskState::DetectingRfid | KioskState::ValidatingRfid | KioskState::Error
        )
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            KioskState::DetectingRfid => "DETECTING_RFID",
            KioskState::ValidatingRfid => "VALIDATING_RFID",
            KioskState::AwaitingPayment => "AWAITING_PAYMENT",
            KioskState::ProcessingPayment => "PROCESSING_PAYMENT",
            KioskState::PaymentSuccessAwaitQr => "PAYMENT_SUCCESS_AWAIT_QR",
            KioskState::AwaitingNextQr => "AWAITING_NEXT_QR",
            KioskState::ProcessingFinal => "PROCESSING_FINAL",
            KioskState::Error => "ERROR",
        }
    }
}

impl fmt::Display for KioskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
