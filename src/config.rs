//! Daemon settings: serial link, network ports, and timing parameters.
//!
//! Loading follows the teacher's tolerant style: a missing file or an
//! unparsable field falls back to a compiled default rather than failing
//! startup. CLI argument parsing is out of scope here (see SPEC_FULL.md); a
//! caller that wants flags layers them on top of [`DaemonConfig::default`].

use configparser::ini::Ini;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonConfig {
    pub serial_port: String,
    pub baud: u32,
    pub rigctl_port: u16,
    pub audio_port: u16,
    pub response_timeout_ms: u64,
    pub target_latency_ms: u64,
    pub heartbeat_interval_s: u64,
    pub heartbeat_timeout_multiplier: u32,
    pub verbose: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            serial_port: String::new(),
            baud: 38400,
            rigctl_port: 4532,
            audio_port: 4533,
            response_timeout_ms: 500,
            target_latency_ms: 100,
            heartbeat_interval_s: 5,
            heartbeat_timeout_multiplier: 3,
            verbose: false,
        }
    }
}

impl DaemonConfig {
    /// Default config file path under the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "ftx1-bridge", "ftx1-bridge")
            .map(|dirs| dirs.config_dir().join("settings.ini"))
    }

    /// Load from `path`, or return defaults if it doesn't exist or `path` is `None`.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        let mut ini = Ini::new();
        if ini.load(path).is_err() {
            return Self::default();
        }

        let defaults = Self::default();
        Self {
            serial_port: ini
                .get("serial", "port")
                .unwrap_or(defaults.serial_port),
            baud: ini
                .getuint("serial", "baud")
                .ok()
                .flatten()
                .map(|v| v as u32)
                .unwrap_or(defaults.baud),
            rigctl_port: ini
                .getuint("network", "rigctl_port")
                .ok()
                .flatten()
                .map(|v| v as u16)
                .unwrap_or(defaults.rigctl_port),
            audio_port: ini
                .getuint("network", "audio_port")
                .ok()
                .flatten()
                .map(|v| v as u16)
                .unwrap_or(defaults.audio_port),
            response_timeout_ms: ini
                .getuint("network", "response_timeout_ms")
                .ok()
                .flatten()
                .unwrap_or(defaults.response_timeout_ms),
            target_latency_ms: ini
                .getuint("audio", "target_latency_ms")
                .ok()
                .flatten()
                .unwrap_or(defaults.target_latency_ms),
            heartbeat_interval_s: ini
                .getuint("audio", "heartbeat_interval_s")
                .ok()
                .flatten()
                .unwrap_or(defaults.heartbeat_interval_s),
            heartbeat_timeout_multiplier: ini
                .getuint("audio", "heartbeat_timeout_multiplier")
                .ok()
                .flatten()
                .map(|v| v as u32)
                .unwrap_or(defaults.heartbeat_timeout_multiplier),
            verbose: ini
                .getbool("general", "verbose")
                .ok()
                .flatten()
                .unwrap_or(defaults.verbose),
        }
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create config directory: {}", e))?;
        }

        let mut ini = Ini::new();
        ini.set("serial", "port", Some(self.serial_port.clone()));
        ini.set("serial", "baud", Some(self.baud.to_string()));
        ini.set("network", "rigctl_port", Some(self.rigctl_port.to_string()));
        ini.set("network", "audio_port", Some(self.audio_port.to_string()));
        ini.set(
            "network",
            "response_timeout_ms",
            Some(self.response_timeout_ms.to_string()),
        );
        ini.set(
            "audio",
            "target_latency_ms",
            Some(self.target_latency_ms.to_string()),
        );
        ini.set(
            "audio",
            "heartbeat_interval_s",
            Some(self.heartbeat_interval_s.to_string()),
        );
        ini.set(
            "audio",
            "heartbeat_timeout_multiplier",
            Some(self.heartbeat_timeout_multiplier.to_string()),
        );
        ini.set("general", "verbose", Some(self.verbose.to_string()));

        ini.write(path)
            .map_err(|e| format!("failed to write config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = DaemonConfig::default();
        assert_eq!(c.baud, 38400);
        assert_eq!(c.rigctl_port, 4532);
        assert_eq!(c.audio_port, 4533);
        assert_eq!(c.response_timeout_ms, 500);
        assert_eq!(c.target_latency_ms, 100);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = PathBuf::from("/nonexistent/path/settings.ini");
        let c = DaemonConfig::load(Some(&path));
        assert_eq!(c, DaemonConfig::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!(
            "ftx1-bridge-test-{:?}",
            std::thread::current().id()
        ));
        let path = dir.join("settings.ini");
        let mut cfg = DaemonConfig::default();
        cfg.serial_port = "/dev/ttyUSB0".to_string();
        cfg.baud = 19200;
        cfg.verbose = true;
        cfg.save(&path).expect("save should succeed");

        let loaded = DaemonConfig::load(Some(&path));
        assert_eq!(loaded.serial_port, "/dev/ttyUSB0");
        assert_eq!(loaded.baud, 19200);
        assert!(loaded.verbose);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
