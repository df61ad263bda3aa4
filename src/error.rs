// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types.

use std::{io, time::Duration};

use thiserror::Error;

use crate::{ExceptionResponse, FunctionCode, Slave};

/// Integrity failures of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Less than the 4 bytes of address, function code and CRC.
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    #[error("CRC mismatch: received 0x{received:04X}, calculated 0x{calculated:04X}")]
    CrcMismatch { received: u16, calculated: u16 },

    /// The frame length does not fit its function code.
    #[error("malformed response: expected {expected} bytes, got {actual}")]
    MalformedResponse { expected: usize, actual: usize },

    #[error("unsupported function code: 0x{0:02X}")]
    UnsupportedFunction(u8),
}

/// _Modbus_ master errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A request parameter was rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request uses a function code the codec cannot encode.
    #[error("unsupported function: {0:?}")]
    UnsupportedFunction(FunctionCode),

    /// Opening, reading or writing the link failed.
    #[error(transparent)]
    Transport(#[from] io::Error),

    /// Fewer bytes than the frame length were written to the serial link.
    #[error("failed to write request: {written} of {expected} bytes written")]
    TransportWriteFailed { written: usize, expected: usize },

    /// The datagram primitive refused to send the request.
    #[error("failed to send request: {0}")]
    TransportSendFailed(#[source] io::Error),

    /// No complete response arrived before the deadline.
    #[error("no response within {0:?}")]
    ResponseTimeout(Duration),

    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A read response carries a different amount of register data than requested.
    #[error("invalid response size: expected {expected} bytes, got {actual}")]
    InvalidResponseSize { expected: usize, actual: usize },

    /// The response does not belong to the request.
    ///
    /// This happens if the slave addresses or the function codes of
    /// the request and the response do not match.
    #[error("unexpected response from {slave} for function {function}")]
    UnexpectedResponse { slave: Slave, function: FunctionCode },

    /// The slave responded with a _Modbus_ exception.
    #[error("exception: {0}")]
    Exception(#[from] ExceptionResponse),
}

/// Coarse classification of an [`Error`].
///
/// Allows callers to branch on device-reported conditions versus
/// communication failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any I/O.
    Argument,
    /// The link failed to open, send or write.
    Transport,
    /// The response deadline elapsed.
    Timing,
    /// A corrupt, truncated or mismatching response.
    Integrity,
    /// A well-formed exception response.
    Protocol,
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) | Self::UnsupportedFunction(_) => ErrorKind::Argument,
            Self::Transport(_)
            | Self::TransportWriteFailed { .. }
            | Self::TransportSendFailed(_) => ErrorKind::Transport,
            Self::ResponseTimeout(_) => ErrorKind::Timing,
            Self::Frame(_) | Self::InvalidResponseSize { .. } | Self::UnexpectedResponse { .. } => {
                ErrorKind::Integrity
            }
            Self::Exception(_) => ErrorKind::Protocol,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExceptionCode;

    #[test]
    fn classify_errors() {
        assert_eq!(
            Error::invalid_argument("quantity").kind(),
            ErrorKind::Argument
        );
        assert_eq!(
            Error::from(io::Error::from(io::ErrorKind::NotFound)).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            Error::ResponseTimeout(Duration::from_millis(10)).kind(),
            ErrorKind::Timing
        );
        assert_eq!(
            Error::from(FrameError::FrameTooShort { len: 2 }).kind(),
            ErrorKind::Integrity
        );
        let exception = ExceptionResponse {
            function: FunctionCode::ReadHoldingRegisters,
            exception: ExceptionCode::IllegalDataAddress,
        };
        assert_eq!(Error::from(exception).kind(), ErrorKind::Protocol);
    }

    #[test]
    fn display_exception() {
        let err = Error::from(ExceptionResponse {
            function: FunctionCode::WriteSingleRegister,
            exception: ExceptionCode::ServerDeviceBusy,
        });
        assert_eq!(
            err.to_string(),
            "exception: Modbus function 6: Server device busy"
        );
    }
}
