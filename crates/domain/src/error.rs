/// Framing errors raised while decoding the binary socket protocol.
///
/// Every variant is fatal for the connection that produced it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown server operation: {0}")]
    UnknownOperation(i32),

    #[error("malformed body: {0}")]
    MalformedBody(String),
}

/// Shared error type used across all open-live crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("network: {0}")]
    Network(String),

    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    /// The control-plane rejected the session. `response` is the raw body.
    #[error("authentication failed: {message} (response: {response})")]
    Authentication {
        message: String,
        response: serde_json::Value,
    },

    #[error("encoding: {0}")]
    Encoding(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_converts_into_error() {
        let err: Error = ProtocolError::UnknownOperation(42).into();
        assert!(matches!(err, Error::Protocol(ProtocolError::UnknownOperation(42))));
        assert_eq!(err.to_string(), "protocol: unknown server operation: 42");
    }

    #[test]
    fn authentication_error_carries_raw_response() {
        let err = Error::Authentication {
            message: "non-zero code 7001".into(),
            response: serde_json::json!({"code": 7001, "message": "bad code"}),
        };
        let text = err.to_string();
        assert!(text.contains("7001"));
        assert!(text.contains("bad code"));
    }
}
