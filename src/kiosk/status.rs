//! Operator-facing status projection

use serde::Serialize;

use super::state::KioskState;
use super::types::{Amount, GatePass, RfidData};

/// Current status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub text: String,
    pub is_error: bool,
}

impl Status {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::info("Initializing...")
    }
}

/// Everything a display needs, recomputed after every dispatched event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KioskSnapshot {
    pub state: KioskState,
    pub status_text: String,
    pub is_error: bool,
    pub final_progress: u8,
    pub final_progress_message: String,
    pub gatepasses: Vec<GatePass>,
    pub rfid: Option<RfidData>,
    pub gate_name: String,
    pub toll_amount: Amount,
    /// Seconds left on the countdown owned by the current state
    pub countdown: Option<u32>,
}

impl KioskSnapshot {
    pub fn valid_gatepass_count(&self) -> usize {
        self.gatepasses.iter().filter(|gp| gp.is_valid()).count()
    }
}
