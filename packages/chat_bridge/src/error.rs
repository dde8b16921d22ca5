//! Error types for the frame protocol and server startup.

use std::net::SocketAddr;

/// Failures local to a single frame. Never fatal to the process or the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("truncated frame: needed {needed} bytes at offset {offset}, only {available} available")]
    TruncatedFrame {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("frame has {count} fields (max {max})", max = crate::frame::MAX_FIELDS)]
    FieldCountOverflow { count: usize },

    #[error("field {index} is {len} bytes (max {max})", max = crate::frame::MAX_FIELD_LEN)]
    FieldTooLarge { index: usize, len: usize },
}

impl ProtocolError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::TruncatedFrame { .. } => "truncated_frame",
            Self::FieldCountOverflow { .. } => "field_count_overflow",
            Self::FieldTooLarge { .. } => "field_too_large",
        }
    }
}

/// Startup failures. These stop the server before it accepts connections.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("a chat bridge server is already running in this process")]
    AlreadyInitialized,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        let err = ProtocolError::TruncatedFrame {
            offset: 3,
            needed: 2,
            available: 1,
        };
        assert_eq!(err.error_code(), "truncated_frame");
        assert_eq!(
            ProtocolError::FieldCountOverflow { count: 70000 }.error_code(),
            "field_count_overflow"
        );
        assert_eq!(
            ProtocolError::FieldTooLarge { index: 0, len: 65536 }.error_code(),
            "field_too_large"
        );
    }

    #[test]
    fn messages_name_the_limits() {
        let msg = ProtocolError::FieldTooLarge { index: 2, len: 70000 }.to_string();
        assert_eq!(msg, "field 2 is 70000 bytes (max 65535)");

        let msg = ProtocolError::FieldCountOverflow { count: 65536 }.to_string();
        assert_eq!(msg, "frame has 65536 fields (max 65535)");
    }

    #[test]
    fn bind_error_keeps_source() {
        use std::error::Error;

        let err = ConfigError::Bind {
            addr: ([127, 0, 0, 1], 4422).into(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:4422"));
        assert!(err.source().is_some());
    }
}
