//! Error types for the Enchor provider

use thiserror::Error;

/// Enchor provider errors
#[derive(Error, Debug)]
pub enum EnchorError {
    /// Failed to parse API response
    #[error("Failed to parse search response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] bridge_traits::error::BridgeError),
}

/// Result type for Enchor operations
pub type Result<T> = std::result::Result<T, EnchorError>;

impl From<EnchorError> for bridge_traits::error::BridgeError {
    fn from(error: EnchorError) -> Self {
        match error {
            EnchorError::ParseError(msg) => {
                bridge_traits::error::BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            EnchorError::BridgeError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = EnchorError::ParseError("missing field `data`".to_string());

        assert_eq!(
            error.to_string(),
            "Failed to parse search response: missing field `data`"
        );
    }

    #[test]
    fn test_error_conversion() {
        let error = EnchorError::ParseError("expected value".to_string());
        let bridge_error: bridge_traits::error::BridgeError = error.into();

        assert!(matches!(
            bridge_error,
            bridge_traits::error::BridgeError::OperationFailed(msg) if msg.contains("expected value")
        ));
    }
}
