//! Error types for the DALI master driver.
//!
//! Every failure surfaces as a typed result; nothing panics and nothing
//! escalates. A persistently dead bus simply keeps yielding
//! [`DaliError::Timeout`] to the caller, which owns the retry decision.
//!
//! Note that "no reply" is deliberately *not* an error: many forward frames
//! (direct arc power, configuration commands) legitimately receive no
//! backward frame, so command exchanges return `Ok(None)` for an empty
//! reply window and reserve `Err` for conditions that prevented or
//! corrupted an exchange.

use thiserror::Error;

/// Result type for DALI bus operations.
pub type DaliResult<T> = Result<T, DaliError>;

/// Errors raised by the transceiver and command layers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum DaliError {
    /// A non-blocking send was attempted while the engine was not idle.
    #[error("bus not idle")]
    BusNotIdle,

    /// The frame exceeds 32 data bits, or the bit length exceeds the data
    /// provided.
    #[error("frame too long")]
    FrameTooLong,

    /// A deadline expired while waiting for the bus, for transmit
    /// completion, or for a reply.
    #[error("timeout on DALI bus")]
    Timeout,

    /// Another transmitter held the bus low while we drove it high, or a
    /// reply was garbled by superimposed transmissions.
    #[error("bus collision")]
    Collision,

    /// A backward frame of implausible length was received.
    #[error("invalid reply")]
    InvalidReply,

    /// The command/argument pair violates the addressing-pattern rules and
    /// was rejected before any bus activity.
    #[error("invalid command")]
    InvalidCommand,
}

/// Errors raised by the verify-then-commit parameter setters.
///
/// The bus has no delivery acknowledgment at the physical layer, so
/// parameter writes are verified at two points; each verification failure
/// gets its own code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SetValueError {
    /// The underlying bus exchange failed.
    #[error(transparent)]
    Bus(#[from] DaliError),

    /// The data transfer register did not read back the staged value.
    #[error("transfer register mismatch")]
    DtrMismatch,

    /// The parameter did not read back the target value after the set
    /// command.
    #[error("parameter readback mismatch")]
    VerifyMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_terse() {
        assert_eq!(DaliError::Collision.to_string(), "bus collision");
        assert_eq!(
            SetValueError::DtrMismatch.to_string(),
            "transfer register mismatch"
        );
    }

    #[test]
    fn bus_errors_convert() {
        let e: SetValueError = DaliError::Timeout.into();
        assert_eq!(e, SetValueError::Bus(DaliError::Timeout));
    }
}
