use std::any::TypeId;

/// Errors when trying to aquire or register a config
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigError {
    /// The required Config is not known
    #[error("The required Config type is not known: {0:?}")]
    ConfigMissing(TypeId),
    /// The Config is already registered
    #[error("The Config type is already registered: {0:?}")]
    ConfigAlreadyRegistered(TypeId),
    /// A configuration key carried a value that could not be parsed
    #[error("Invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}
