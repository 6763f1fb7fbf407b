//! Error objects for the iec-device crate
use crate::line::{Level, Line};

use libc::{EINVAL, EOVERFLOW, ETIMEDOUT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for the iec-device crate
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The bus did not follow the protocol.  The current cycle is abandoned
    /// and the host is expected to re-initiate.
    #[error("IEC bus protocol error: {kind}")]
    Protocol { kind: ProtocolError },

    /// Invalid arguments passed to the iec-device library
    #[error("iec-device library called with invalid arguments: {message}")]
    Args { message: String },
}

/// Used to differentiate between the ways the bus protocol can be violated
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum ProtocolError {
    /// A handshake step exceeded its timeout budget
    #[error("Timed out after {waited_us}us waiting for {line} to be {target}")]
    Timeout {
        line: Line,
        target: Level,
        waited_us: u32,
    },

    /// The command string received under attention was too long
    #[error("Attention command exceeded maximum length {max}")]
    CommandOverflow { max: usize },
}

impl Error {
    pub fn to_errno(&self) -> i32 {
        match self {
            Error::Protocol { kind } => match kind {
                ProtocolError::Timeout { .. } => ETIMEDOUT,
                ProtocolError::CommandOverflow { .. } => EOVERFLOW,
            },
            Error::Args { .. } => EINVAL,
        }
    }

    /// Returns true if this error was caused by a handshake timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Protocol {
                kind: ProtocolError::Timeout { .. }
            }
        )
    }
}

// Map ProtocolError to Error
impl From<ProtocolError> for Error {
    fn from(kind: ProtocolError) -> Self {
        Self::Protocol { kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        let timeout: Error = ProtocolError::Timeout {
            line: Line::Clock,
            target: Level::Released,
            waited_us: 65_000,
        }
        .into();
        assert_eq!(timeout.to_errno(), ETIMEDOUT);
        assert!(timeout.is_timeout());

        let overflow: Error = ProtocolError::CommandOverflow { max: 40 }.into();
        assert_eq!(overflow.to_errno(), EOVERFLOW);
        assert!(!overflow.is_timeout());

        let args = Error::Args {
            message: "bad".to_string(),
        };
        assert_eq!(args.to_errno(), EINVAL);
    }

    #[test]
    fn test_timeout_display() {
        let err: Error = ProtocolError::Timeout {
            line: Line::Data,
            target: Level::Asserted,
            waited_us: 65_000,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "IEC bus protocol error: Timed out after 65000us waiting for DATA to be asserted"
        );
    }
}
