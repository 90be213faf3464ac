//! Configuration loaded from `atelier.toml`.
//!
//! # Configuration File Format
//!
//! ```toml
//! [gateway]
//! endpoint = "http://localhost:9400/generate"
//! request_timeout_secs = 120
//!
//! [session]
//! quality_threshold = 0.70
//! max_retries = 3
//! feedback_enabled_phases = [3, 5]
//! feedback_timeout_secs = 1800
//!
//! [events]
//! channel_capacity = 256
//!
//! [server]
//! port = 8641
//! ```
//!
//! Every field except `feedback_timeout_secs` has a default.
//! `feedback_timeout_secs` must be set explicitly whenever any phase has
//! feedback enabled: leaving human-interaction deadlines to an implicit
//! default is how sessions silently stall, so the operator has to choose
//! one.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::phase::PHASE_COUNT;

/// Generation gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// URL the HTTP gateway posts generation requests to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request deadline for the gateway call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:9400/generate".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Per-session pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Minimum quality score an artifact must reach, in [0, 1].
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    /// Retries granted per phase beyond the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Phase ids (1..=7) that pause for human feedback after passing the
    /// quality gate.
    #[serde(default)]
    pub feedback_enabled_phases: Vec<u8>,
    /// Feedback window deadline. No default: required whenever
    /// `feedback_enabled_phases` is non-empty.
    #[serde(default)]
    pub feedback_timeout_secs: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            max_retries: default_max_retries(),
            feedback_enabled_phases: Vec::new(),
            feedback_timeout_secs: None,
        }
    }
}

fn default_quality_threshold() -> f64 {
    0.70
}

fn default_max_retries() -> u32 {
    3
}

/// Event broadcasting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity per session; slow subscribers that fall
    /// further behind than this see a gap marker.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    8641
}

/// Root configuration, one section per subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtelierConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AtelierConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: PathBuf::from(path),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from(path),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.session.quality_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Validation(format!(
                "session.quality_threshold must be in [0, 1], got {threshold}"
            )));
        }
        for &phase in &self.session.feedback_enabled_phases {
            if phase == 0 || phase > PHASE_COUNT {
                return Err(ConfigError::Validation(format!(
                    "session.feedback_enabled_phases contains {phase}; valid phase ids are 1..={PHASE_COUNT}"
                )));
            }
        }
        if !self.session.feedback_enabled_phases.is_empty()
            && self.session.feedback_timeout_secs.is_none()
        {
            return Err(ConfigError::Validation(
                "session.feedback_timeout_secs is required when feedback_enabled_phases is non-empty"
                    .to_string(),
            ));
        }
        if let Some(0) = self.session.feedback_timeout_secs {
            return Err(ConfigError::Validation(
                "session.feedback_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "events.channel_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn feedback_enabled(&self, phase_id: u8) -> bool {
        self.session.feedback_enabled_phases.contains(&phase_id)
    }

    /// Feedback window deadline. Only meaningful when some phase has
    /// feedback enabled; `validate` guarantees the value is present then.
    pub fn feedback_timeout(&self) -> Option<Duration> {
        self.session.feedback_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_valid() {
        let config = AtelierConfig::default();
        config.validate().unwrap();
        assert_eq!(config.session.quality_threshold, 0.70);
        assert_eq!(config.session.max_retries, 3);
        assert_eq!(config.events.channel_capacity, 256);
        assert_eq!(config.server.port, 8641);
    }

    #[test]
    fn loads_full_config() {
        let file = write_config(
            r#"
[gateway]
endpoint = "http://gen.internal/generate"
request_timeout_secs = 60

[session]
quality_threshold = 0.8
max_retries = 2
feedback_enabled_phases = [3, 5]
feedback_timeout_secs = 1800

[events]
channel_capacity = 64

[server]
port = 9000
"#,
        );
        let config = AtelierConfig::load(file.path()).unwrap();
        assert_eq!(config.gateway.endpoint, "http://gen.internal/generate");
        assert_eq!(config.session.max_retries, 2);
        assert!(config.feedback_enabled(3));
        assert!(config.feedback_enabled(5));
        assert!(!config.feedback_enabled(4));
        assert_eq!(config.feedback_timeout(), Some(Duration::from_secs(1800)));
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let file = write_config("[server]\nport = 8700\n");
        let config = AtelierConfig::load(file.path()).unwrap();
        assert_eq!(config.server.port, 8700);
        assert_eq!(config.session.quality_threshold, 0.70);
        assert!(config.session.feedback_enabled_phases.is_empty());
    }

    #[test]
    fn feedback_phases_without_timeout_is_rejected() {
        let file = write_config("[session]\nfeedback_enabled_phases = [3]\n");
        let err = AtelierConfig::load(file.path()).unwrap_err();
        assert!(
            err.to_string().contains("feedback_timeout_secs"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn out_of_range_phase_id_is_rejected() {
        let file = write_config(
            "[session]\nfeedback_enabled_phases = [8]\nfeedback_timeout_secs = 60\n",
        );
        let err = AtelierConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("1..=7"), "unexpected error: {err}");
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let file = write_config("[session]\nquality_threshold = 1.5\n");
        assert!(AtelierConfig::load(file.path()).is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AtelierConfig::load_or_default(Path::new("/nonexistent/atelier.toml")).unwrap();
        assert_eq!(config.session.max_retries, 3);
    }

    #[test]
    fn unparsable_toml_reports_path() {
        let file = write_config("not valid toml [[");
        let err = AtelierConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
