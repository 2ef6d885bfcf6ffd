//! Discovery configuration.
//!
//! Everything here is fixed for the lifetime of a process; nothing is
//! negotiated with the peripheral.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::distance::Calibration;

/// GATT service exposing the camera identity.
pub const CAMERA_SERVICE_UUID: Uuid = Uuid::from_u128(0x6e6a_a9f4_3c2e_4b8d_9a51_0c7f_2d1e_8b00);

/// Characteristic holding the camera identity as UTF-8 text.
pub const CAMERA_IDENTITY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x6e6a_a9f4_3c2e_4b8d_9a51_0c7f_2d1e_8b01);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Advertised local name a peripheral must carry.
    pub target_name: String,
    pub target_service: Uuid,
    pub target_characteristic: Uuid,
    pub calibration: Calibration,
    /// Sightings older than this are ignored by proximity queries.
    pub staleness_window_secs: u64,
    /// Bound on a whole connect, discover and read session.
    pub connection_timeout_secs: u64,
    /// Candidates further away than this are not connected to.
    pub distance_threshold_m: f64,
    /// Size of the debug list of non-matching advertisements; 0 disables it.
    pub ignored_capacity: usize,
    /// Key of the enablement flag in the settings store.
    pub settings_key: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target_name: "rpi-camera".to_string(),
            target_service: CAMERA_SERVICE_UUID,
            target_characteristic: CAMERA_IDENTITY_CHARACTERISTIC_UUID,
            calibration: Calibration::default(),
            staleness_window_secs: 10,
            connection_timeout_secs: 10,
            distance_threshold_m: 10.0,
            ignored_capacity: 20,
            settings_key: "discovery_enabled".to_string(),
        }
    }
}

impl DiscoveryConfig {
    /// Reads a TOML file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// # Errors
    ///
    /// Returns an error if `content` is not valid TOML or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_name.is_empty() {
            return Err(ConfigError::Invalid("target_name is empty".into()));
        }
        if self.calibration.path_loss_exponent <= 0.0 {
            return Err(ConfigError::Invalid(
                "calibration.path_loss_exponent must be positive".into(),
            ));
        }
        if self.staleness_window_secs == 0 {
            return Err(ConfigError::Invalid("staleness_window_secs must be positive".into()));
        }
        if self.connection_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "connection_timeout_secs must be positive".into(),
            ));
        }
        if self.distance_threshold_m <= 0.0 {
            return Err(ConfigError::Invalid("distance_threshold_m must be positive".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn staleness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.staleness_window_secs).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Known and within `distance_threshold_m`.
    #[must_use]
    pub fn is_close_enough(&self, distance: Option<f64>) -> bool {
        distance.is_some_and(|d| d <= self.distance_threshold_m)
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::{CAMERA_SERVICE_UUID, ConfigError, DiscoveryConfig};

    #[test]
    fn defaults_are_valid() {
        let config = DiscoveryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_name, "rpi-camera");
        assert_eq!(config.calibration.measured_power_at_1m, -59);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = DiscoveryConfig::from_toml(
            r#"
            target_name = "lobby-cam"
            staleness_window_secs = 30

            [calibration]
            measured_power_at_1m = -70
            path_loss_exponent = 3.0
            "#,
        )
        .unwrap();
        assert_eq!(config.target_name, "lobby-cam");
        assert_eq!(config.staleness_window(), chrono::Duration::seconds(30));
        assert_eq!(config.calibration.measured_power_at_1m, -70);
        assert_eq!(config.target_service, CAMERA_SERVICE_UUID);
        assert_eq!(config.connection_timeout_secs, 10);
    }

    #[test]
    fn rejects_bad_exponent() {
        let result = DiscoveryConfig::from_toml(
            r"
            [calibration]
            path_loss_exponent = 0.0
            ",
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_timeout() {
        let result = DiscoveryConfig::from_toml("connection_timeout_secs = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_malformed_toml() {
        let result = DiscoveryConfig::from_toml("target_name = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = DiscoveryConfig::load(Path::new("/nonexistent/proxiscan.toml")).unwrap();
        assert_eq!(config, DiscoveryConfig::default());
    }

    #[test]
    fn closeness_requires_known_distance() {
        let config = DiscoveryConfig::default();
        assert!(config.is_close_enough(Some(10.0)));
        assert!(!config.is_close_enough(Some(10.5)));
        assert!(!config.is_close_enough(None));
    }
}
