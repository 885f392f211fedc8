//! Gate Kiosk Transaction Core
//!
//! Sequences one vehicle pass through the gate: RFID card validation, toll
//! payment, gatepass QR collection and the final gate-in pipeline.
//!
//! # Architecture
//!
//! A single [`KioskSession`] owns the active transaction. Every input arrives
//! as a [`KioskEvent`] on one bounded channel and is applied by one dispatch
//! loop, so no two transitions ever run concurrently:
//! - **Devices** push card taps and scanner input through a [`KioskHandle`]
//! - **Operator** buttons (confirm payment, proceed, reset) use the same handle
//! - **Timers** post ticks and expirations tagged with a generation number
//!
//! # State Machine
//!
//! ```text
//! DETECTING_RFID → VALIDATING_RFID → AWAITING_PAYMENT → PROCESSING_PAYMENT
//!       ↑                 │                  ↑                 │
//!       └──── invalid ────┘                  └──── declined ───┤
//!                                                              ↓
//!                 AWAITING_NEXT_QR ←── valid scan ── PAYMENT_SUCCESS_AWAIT_QR
//!                        │                                     │
//!              proceed / timeout                      timeout → reset
//!                        ↓
//!                 PROCESSING_FINAL ── failure ──→ ERROR ── reset ──→ DETECTING_RFID
//!                        │
//!                  success → reset
//! ```
//!
//! # Invariants
//!
//! 1. **One transaction**: a new one starts only after reset
//! 2. **Card first**: `rfid` is set from AWAITING_PAYMENT onward
//! 3. **Valid passes only**: final processing submits only accepted gatepasses
//! 4. **Timers follow state**: leaving a state cancels its countdown, and stale
//!    timer events are discarded by generation

pub mod adapters;
pub mod channel;
pub mod debounce;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod status;
pub mod timer;
pub mod types;


// Re-exports for convenience
pub use adapters::Collaborators;
pub use channel::{KioskEvent, KioskHandle, KioskReceiver, TimerPurpose, kiosk_channel};
pub use error::{CollaboratorError, KioskError, PipelineError};
pub use pipeline::{FinalPipeline, PipelineOutcome, PipelineStage};
pub use session::{KioskSession, KioskTiming};
pub use state::{KioskState, Trigger};
pub use status::{KioskSnapshot, Status};
pub use types::{GatePass, RfidData, Transaction, TransactionId};
