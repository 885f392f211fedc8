//! Kiosk Error Types
//!
//! Collaborator call failures, final-pipeline failures and startup errors.

use thiserror::Error;

use super::pipeline::PipelineStage;

/// Error returned by any external collaborator
///
/// `Rejected` is a declared business outcome; the other variants are call
/// failures. The FSM treats both the same way and only words them differently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("device unavailable: {0}")]
    Unavailable(String),
}

impl CollaboratorError {
    pub fn code(&self) -> &'static str {
        match self {
            CollaboratorError::Rejected(_) => "REJECTED",
            CollaboratorError::Transport(_) => "TRANSPORT",
            CollaboratorError::Unavailable(_) => "UNAVAILABLE",
        }
    }

    #[inline]
    pub fn is_rejection(&self) -> bool {
        matches!(self, CollaboratorError::Rejected(_))
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(e: std::io::Error) -> Self {
        CollaboratorError::Unavailable(e.to_string())
    }
}

/// Final processing failure
///
/// Display text is what the operator sees on the ERROR screen.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{0}")]
    GateInRejected(String),

    #[error("GateIn returned no CMS items.")]
    EmptyCms,

    #[error("GateIn call failed: {0}")]
    GateIn(CollaboratorError),

    #[error("CMS printing failed: {0}")]
    PrintCms(CollaboratorError),

    #[error("TruckIn confirmation failed: {0}")]
    TruckIn(CollaboratorError),

    #[error("Portal open failed: {0}")]
    Gate(CollaboratorError),
}

impl PipelineError {
    pub const DEFAULT_GATE_IN_FAILURE: &'static str = "GateIn processing failed at backend.";

    /// Stage that was running when the pipeline aborted
    pub fn stage(&self) -> PipelineStage {
        match self {
            PipelineError::GateInRejected(_)
            | PipelineError::EmptyCms
            | PipelineError::GateIn(_) => PipelineStage::GateIn,
            PipelineError::PrintCms(_) => PipelineStage::PrintCms,
            PipelineError::TruckIn(_) => PipelineStage::ConfirmTruckIn,
            PipelineError::Gate(_) => PipelineStage::OpenGate,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::GateInRejected(_) => "GATE_IN_REJECTED",
            PipelineError::EmptyCms => "EMPTY_CMS",
            PipelineError::GateIn(_) => "GATE_IN_FAILED",
            PipelineError::PrintCms(_) => "PRINT_CMS_FAILED",
            PipelineError::TruckIn(_) => "TRUCK_IN_FAILED",
            PipelineError::Gate(_) => "GATE_FAILED",
        }
    }
}

/// Kiosk runtime errors
#[derive(Error, Debug, Clone)]
pub enum KioskError {
    #[error("failed to load settings: {0}")]
    Settings(CollaboratorError),

    #[error("failed to initialize RFID reader: {0}")]
    ReaderInit(CollaboratorError),

    #[error("failed to start RFID detection: {0}")]
    Detection(CollaboratorError),

    #[error("kiosk event channel closed")]
    ChannelClosed,
}

impl KioskError {
    pub fn code(&self) -> &'static str {
        match self {
            KioskError::Settings(_) => "SETTINGS",
            KioskError::ReaderInit(_) => "READER_INIT",
            KioskError::Detection(_) => "DETECTION",
            KioskError::ChannelClosed => "CHANNEL_CLOSED",
        }
    }
}
