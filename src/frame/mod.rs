// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    error,
    fmt::{self, Display},
};

use crate::{bytes::Bytes, FrameError, Slave};

/// Maximum number of registers that can be read with a single request.
pub const MAX_READ_QUANTITY: Quantity = 125;

/// Maximum number of registers that can be written with a single request.
pub const MAX_WRITE_QUANTITY: Quantity = 123;

/// A Modbus function code.
///
/// Only the register functions are encoded and decoded by this crate,
/// the bit functions are listed to classify exception responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// 01 (0x01) Read Coils.
    ReadCoils,

    /// 02 (0x02) Read Discrete Inputs
    ReadDiscreteInputs,

    /// 03 (0x03) Read Holding Registers
    ReadHoldingRegisters,

    /// 04 (0x04) Read Input Registers
    ReadInputRegisters,

    /// 05 (0x05) Write Single Coil
    WriteSingleCoil,

    /// 06 (0x06) Write Single Register
    WriteSingleRegister,

    /// 15 (0x0F) Write Multiple Coils
    WriteMultipleCoils,

    /// 16 (0x10) Write Multiple Registers
    WriteMultipleRegisters,
}

impl FunctionCode {
    /// Create a new [`FunctionCode`] with `value`.
    ///
    /// Returns `None` for codes outside of the supported table,
    /// including exception codes with the high bit set.
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        let code = match value {
            0x01 => Self::ReadCoils,
            0x02 => Self::ReadDiscreteInputs,
            0x03 => Self::ReadHoldingRegisters,
            0x04 => Self::ReadInputRegisters,
            0x05 => Self::WriteSingleCoil,
            0x06 => Self::WriteSingleRegister,
            0x0F => Self::WriteMultipleCoils,
            0x10 => Self::WriteMultipleRegisters,
            _ => return None,
        };
        Some(code)
    }

    /// Gets the [`u8`] value of the current [`FunctionCode`].
    #[must_use]
    pub const fn value(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadDiscreteInputs => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::WriteSingleCoil => 0x05,
            Self::WriteSingleRegister => 0x06,
            Self::WriteMultipleCoils => 0x0F,
            Self::WriteMultipleRegisters => 0x10,
        }
    }

    /// Register reads, answered with a byte count and register data.
    #[must_use]
    pub const fn is_register_read(self) -> bool {
        matches!(self, Self::ReadHoldingRegisters | Self::ReadInputRegisters)
    }

    /// Register writes, answered with an address/value echo.
    #[must_use]
    pub const fn is_register_write(self) -> bool {
        matches!(
            self,
            Self::WriteSingleRegister | Self::WriteMultipleRegisters
        )
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(FrameError::UnsupportedFunction(value))
    }
}

impl Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

/// Set on the function code of an exception response.
pub(crate) const EXCEPTION_FLAG: u8 = 0x80;

/// A Modbus protocol address is represented by 16 bit from `0` to `65535`.
///
/// This *protocol address* uses 0-based indexing, while the *register address*
/// is often specified as a number with 1-based indexing.
pub type Address = u16;

/// Modbus uses 16 bit for its data items.
///
/// Transmitted using a big-endian representation.
pub type Word = u16;

/// Number of items to process.
pub type Quantity = u16;

/// A request from the master to a slave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub slave: Slave,
    pub function: FunctionCode,
    /// Address of the first register.
    pub address: Address,
    /// Number of registers to read or write.
    pub quantity: Quantity,
    /// Values to write, empty for reads.
    pub values: Vec<Word>,
}

impl Request {
    #[must_use]
    pub fn read_holding_registers(slave: Slave, address: Address, quantity: Quantity) -> Self {
        Self {
            slave,
            function: FunctionCode::ReadHoldingRegisters,
            address,
            quantity,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn read_input_registers(slave: Slave, address: Address, quantity: Quantity) -> Self {
        Self {
            slave,
            function: FunctionCode::ReadInputRegisters,
            address,
            quantity,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn write_single_register(slave: Slave, address: Address, word: Word) -> Self {
        Self {
            slave,
            function: FunctionCode::WriteSingleRegister,
            address,
            quantity: 1,
            values: vec![word],
        }
    }

    /// The quantity is taken from the number of `words`.
    #[must_use]
    pub fn write_multiple_registers(slave: Slave, address: Address, words: &[Word]) -> Self {
        Self {
            slave,
            function: FunctionCode::WriteMultipleRegisters,
            address,
            quantity: Quantity::try_from(words.len()).unwrap_or(Quantity::MAX),
            values: words.to_vec(),
        }
    }
}

/// A response from a slave to the master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub slave: Slave,
    /// The requested function, without the exception flag.
    pub function: FunctionCode,
    /// Register bytes (big-endian) of a read response.
    ///
    /// Empty for write acknowledgements and exceptions.
    pub data: Bytes,
    /// The exception reported by the slave, `None` on success.
    pub exception: Option<ExceptionCode>,
}

impl Response {
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        self.exception.is_some()
    }

    /// Split the response into its payload or the reported exception.
    pub fn into_result(self) -> Result<Self, ExceptionResponse> {
        match self.exception {
            Some(exception) => Err(ExceptionResponse {
                function: self.function,
                exception,
            }),
            None => Ok(self),
        }
    }
}

/// A server (slave) exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// 0x01
    IllegalFunction,
    /// 0x02
    IllegalDataAddress,
    /// 0x03
    IllegalDataValue,
    /// 0x04
    ServerDeviceFailure,
    /// 0x05
    Acknowledge,
    /// 0x06
    ServerDeviceBusy,
    /// 0x08
    MemoryParityError,
    /// 0x0A
    GatewayPathUnavailable,
    /// 0x0B
    GatewayTargetDevice,
    /// None of the above.
    Custom(u8),
}

impl From<ExceptionCode> for u8 {
    fn from(from: ExceptionCode) -> Self {
        use crate::frame::ExceptionCode::*;
        match from {
            IllegalFunction => 0x01,
            IllegalDataAddress => 0x02,
            IllegalDataValue => 0x03,
            ServerDeviceFailure => 0x04,
            Acknowledge => 0x05,
            ServerDeviceBusy => 0x06,
            MemoryParityError => 0x08,
            GatewayPathUnavailable => 0x0A,
            GatewayTargetDevice => 0x0B,
            Custom(code) => code,
        }
    }
}

impl ExceptionCode {
    /// Create a new [`ExceptionCode`] with `value`.
    #[must_use]
    pub const fn new(value: u8) -> Self {
        use crate::frame::ExceptionCode::*;

        match value {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => ServerDeviceFailure,
            0x05 => Acknowledge,
            0x06 => ServerDeviceBusy,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayTargetDevice,
            other => Custom(other),
        }
    }

    pub(crate) fn description(&self) -> &str {
        use crate::frame::ExceptionCode::*;

        match *self {
            IllegalFunction => "Illegal function",
            IllegalDataAddress => "Illegal data address",
            IllegalDataValue => "Illegal data value",
            ServerDeviceFailure => "Server device failure",
            Acknowledge => "Acknowledge",
            ServerDeviceBusy => "Server device busy",
            MemoryParityError => "Memory parity error",
            GatewayPathUnavailable => "Gateway path unavailable",
            GatewayTargetDevice => "Gateway target device failed to respond",
            Custom(_) => "Custom",
        }
    }
}

/// A server (slave) exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionResponse {
    pub function: FunctionCode,
    pub exception: ExceptionCode,
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl error::Error for ExceptionCode {}

impl fmt::Display for ExceptionResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Modbus function {}: {}", self.function, self.exception)
    }
}

impl error::Error for ExceptionResponse {}
