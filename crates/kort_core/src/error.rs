use thiserror::Error;

/// Errors raised at the fallible edges of the relay: configuration loading and
/// raw event decoding. The processing path itself never fails.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Unresolvable overlay key in config: {hint}")]
    InvalidOverlayKey { hint: String },

    #[error("Conflicting kort mapping for {overlay}: {first} vs {second}")]
    ConflictingKort { overlay: String, first: String, second: String },

    #[error("Unknown canonical field: {name}")]
    UnknownField { name: String },

    #[error("Malformed raw event on line {line}: {message}")]
    MalformedEvent { line: usize, message: String },
}

impl RelayError {
    /// Config problems abort startup; a bad event line only costs that line.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RelayError::MalformedEvent { .. })
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_event_errors_are_recoverable() {
        let malformed = RelayError::MalformedEvent { line: 4, message: "expected value".into() };
        assert!(malformed.is_recoverable());
        assert_eq!(malformed.to_string(), "Malformed raw event on line 4: expected value");

        let missing = RelayError::ConfigNotFound { path: "korts.yaml".into() };
        assert!(!missing.is_recoverable());
        let io = RelayError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(!io.is_recoverable());
    }
}
