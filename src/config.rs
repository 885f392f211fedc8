use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::kiosk::KioskTiming;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Emit `KIOSK_FSM` transition traces
    #[serde(default)]
    pub trace_transitions: bool,
    /// Kiosk event channel capacity
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub printer: PrinterConfig,
}

fn default_queue_size() -> usize {
    64
}

/// Kiosk timers
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub scan_quiet_ms: u64,
    pub gatepass_wait_secs: u32,
    pub next_gatepass_wait_secs: u32,
    pub timeout_reset_grace_ms: u64,
    pub success_display_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            scan_quiet_ms: 250,
            gatepass_wait_secs: 10,
            next_gatepass_wait_secs: 10,
            timeout_reset_grace_ms: 1500,
            success_display_ms: 4000,
        }
    }
}

impl TimingConfig {
    pub fn to_kiosk_timing(&self) -> KioskTiming {
        KioskTiming {
            scan_quiet: Duration::from_millis(self.scan_quiet_ms),
            gatepass_wait_secs: self.gatepass_wait_secs,
            next_gatepass_wait_secs: self.next_gatepass_wait_secs,
            timeout_reset_grace: Duration::from_millis(self.timeout_reset_grace_ms),
            success_display: Duration::from_millis(self.success_display_ms),
        }
    }
}

/// Simulated device configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SimulatorConfig {
    pub gate_name: Option<String>,
    pub toll_amount: Option<i64>,
    pub reader_port: String,
    pub baud_rate: u32,
    pub opening_balance: i64,
    /// Synthetic card tap interval; 0 disables auto taps
    pub auto_tap_interval_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            gate_name: None,
            toll_amount: None,
            reader_port: "COM3".to_string(),
            baud_rate: 9600,
            opening_balance: 100_000,
            auto_tap_interval_ms: 0,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PrinterConfig {
    pub output_dir: String,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            output_dir: "./slips".to_string(),
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::from_file(format!("config/{}.yaml", env))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: kiosk.log
use_json: false
rotation: daily
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.log_level, "info");
        assert!(!config.trace_transitions);
        assert_eq!(config.queue_size, 64);
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.simulator.reader_port, "COM3");
        assert_eq!(config.printer.output_dir, "./slips");
        assert_eq!(config.timing.to_kiosk_timing(), KioskTiming::default());
    }

    #[test]
    fn test_partial_sections() {
        let yaml = format!(
            "{MINIMAL}trace_transitions: true\ntiming:\n  gatepass_wait_secs: 20\nsimulator:\n  gate_name: GATE_A01\n  toll_amount: 25000\n"
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert!(config.trace_transitions);
        assert_eq!(config.timing.gatepass_wait_secs, 20);
        assert_eq!(config.timing.next_gatepass_wait_secs, 10);
        assert_eq!(config.simulator.gate_name.as_deref(), Some("GATE_A01"));
        assert_eq!(config.simulator.toll_amount, Some(25000));
        assert_eq!(config.simulator.baud_rate, 9600);
    }

    #[test]
    fn test_missing_logging_field_is_error() {
        assert!(AppConfig::from_yaml("log_level: info\n").is_err());
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.yaml");
        assert!(matches!(
            AppConfig::from_file(&missing),
            Err(ConfigError::Io { .. })
        ));

        let broken = dir.path().join("broken.yaml");
        fs::write(&broken, "log_level: [").unwrap();
        assert!(matches!(
            AppConfig::from_file(&broken),
            Err(ConfigError::Parse { .. })
        ));

        let good = dir.path().join("good.yaml");
        fs::write(&good, MINIMAL).unwrap();
        assert_eq!(AppConfig::from_file(&good).unwrap().log_file, "kiosk.log");
    }

    #[test]
    fn test_shipped_dev_config_parses() {
        let config = AppConfig::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.yaml"))
            .unwrap();
        assert!(config.queue_size > 0);
    }
}
