//! Gate Kiosk - unattended truck gate-in terminal
//!
//! Drives one vehicle transaction at a time from RFID card tap to gate open.
//!
//! # Modules
//!
//! - [`kiosk`] - Transaction state machine, timers and device collaborators
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod kiosk;
pub mod logging;

// Convenient re-exports at crate root
pub use config::{AppConfig, ConfigError};
pub use kiosk::{
    Collaborators, KioskEvent, KioskHandle, KioskSession, KioskSnapshot, KioskState, KioskTiming,
    kiosk_channel,
};
