use thiserror::Error;

use proxiscan_sinks::settings::SettingsError;

use crate::RadioState;

/// Why an identity-read session, or a request to the service, failed.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("peripheral is no longer known to the radio")]
    DeviceNotFound,

    #[error("connection did not complete in time")]
    ConnectionTimeout,

    #[error("identity service not found on peripheral")]
    ServiceNotFound,

    #[error("identity characteristic not found on peripheral")]
    CharacteristicNotFound,

    #[error("reading the identity characteristic failed")]
    ReadFailed,

    #[error("identity payload is not a UUID")]
    InvalidData,

    #[error("session was cancelled")]
    Cancelled,

    #[error("another session is already in progress")]
    SessionInProgress,

    #[error("settings: {0}")]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,

    #[error("unknown peripheral")]
    UnknownPeripheral,

    #[error("Bluetooth permission denied")]
    PermissionDenied,

    #[error("radio error: {0}")]
    Backend(String),
}

impl RadioError {
    /// The lasting radio state this error stands for, if it is not a
    /// one-off failure.
    #[must_use]
    pub fn radio_state(&self) -> Option<RadioState> {
        match self {
            RadioError::PermissionDenied => Some(RadioState::Unauthorized),
            RadioError::NoAdapter => Some(RadioState::Unsupported),
            RadioError::UnknownPeripheral | RadioError::Backend(_) => None,
        }
    }
}

impl From<btleplug::Error> for RadioError {
    fn from(error: btleplug::Error) -> Self {
        match error {
            btleplug::Error::DeviceNotFound => RadioError::UnknownPeripheral,
            btleplug::Error::PermissionDenied => RadioError::PermissionDenied,
            other => RadioError::Backend(other.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::RadioState;

    use super::RadioError;

    #[test]
    fn lasting_failures_map_to_radio_state() {
        assert_eq!(RadioError::PermissionDenied.radio_state(), Some(RadioState::Unauthorized));
        assert_eq!(RadioError::NoAdapter.radio_state(), Some(RadioState::Unsupported));
        assert_eq!(RadioError::UnknownPeripheral.radio_state(), None);
        assert_eq!(RadioError::Backend("busy".into()).radio_state(), None);
    }

    #[test]
    fn btleplug_permission_error_is_kept() {
        let error = RadioError::from(btleplug::Error::PermissionDenied);
        assert!(matches!(error, RadioError::PermissionDenied));
        let error = RadioError::from(btleplug::Error::DeviceNotFound);
        assert!(matches!(error, RadioError::UnknownPeripheral));
    }
}
