use crate::path::ObjectPath;

/// Well-known bus error names used when a call is rejected.
pub mod names {
    pub const UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
    pub const UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
    pub const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
    pub const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
    pub const FAILED: &str = "org.freedesktop.DBus.Error.Failed";
}

/// Core error type for the mock broker
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    #[error("Unknown session: {0}")]
    UnknownSession(ObjectPath),

    #[error("Unknown object: {0}")]
    UnknownObject(String),

    #[error("Unknown interface: {0}")]
    UnknownInterface(String),

    #[error("Unknown method {member} on interface {interface}")]
    UnknownMethod { interface: String, member: String },

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Invalid object path: {0}")]
    InvalidObjectPath(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BrokerError {
    /// Bus error name reported to the remote caller for this error.
    pub fn bus_error_name(&self) -> &'static str {
        match self {
            BrokerError::UnknownSession(_) | BrokerError::UnknownObject(_) => {
                names::UNKNOWN_OBJECT
            }
            BrokerError::UnknownInterface(_) => names::UNKNOWN_INTERFACE,
            BrokerError::UnknownMethod { .. } => names::UNKNOWN_METHOD,
            BrokerError::InvalidArgs(_) | BrokerError::InvalidObjectPath(_) => {
                names::INVALID_ARGS
            }
            BrokerError::Configuration(_) => names::FAILED,
        }
    }
}

impl From<toml::de::Error> for BrokerError {
    fn from(err: toml::de::Error) -> Self {
        BrokerError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_session_maps_to_unknown_object() {
        let path = ObjectPath::new("/session/99").unwrap();
        let err = BrokerError::UnknownSession(path);
        assert_eq!(err.bus_error_name(), names::UNKNOWN_OBJECT);
        assert_eq!(err.to_string(), "Unknown session: /session/99");
    }

    #[test]
    fn argument_errors_map_to_invalid_args() {
        assert_eq!(
            BrokerError::InvalidArgs("x".into()).bus_error_name(),
            names::INVALID_ARGS
        );
        assert_eq!(
            BrokerError::InvalidObjectPath("x".into()).bus_error_name(),
            names::INVALID_ARGS
        );
    }

    #[test]
    fn malformed_config_maps_to_failed() {
        let err: BrokerError = toml::from_str::<toml::Value>("root_path = ")
            .unwrap_err()
            .into();
        assert!(matches!(err, BrokerError::Configuration(_)));
        assert_eq!(err.bus_error_name(), names::FAILED);
    }
}
