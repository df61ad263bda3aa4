// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU frame encoding and decoding.
//!
//! The same frame layout is used on serial lines and as the payload
//! of UDP datagrams.

pub mod crc;

use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt as _};

use crate::{
    bytes::{BufMut as _, Bytes, BytesMut},
    frame::EXCEPTION_FLAG,
    Error, ExceptionCode, FrameError, FunctionCode, Quantity, Request, Response, Result, Slave, Word,
    MAX_READ_QUANTITY, MAX_WRITE_QUANTITY,
};

use self::crc::{append_crc, crc16, received_crc, CRC_LEN};

/// Slave address and function code.
pub const HEADER_LEN: usize = 2;

/// Smallest frame that can be checked: header and CRC.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + CRC_LEN;

/// Length of an exception frame: header, exception code and CRC.
pub const EXCEPTION_FRAME_LEN: usize = HEADER_LEN + 1 + CRC_LEN;

/// Length of a write acknowledgement: header, address and value/quantity echo, CRC.
pub const WRITE_ACK_FRAME_LEN: usize = HEADER_LEN + 4 + CRC_LEN;

/// Largest RTU frame on the wire.
pub const MAX_FRAME_LEN: usize = 256;

#[allow(clippy::cast_possible_truncation)]
fn u8_len(len: usize) -> u8 {
    // This type conversion should always be safe, because either
    // the caller is responsible to pass a valid usize or the
    // possible values are limited by the protocol.
    debug_assert!(len <= u8::MAX.into());
    len as u8
}

fn first_value(request: &Request) -> Result<Word> {
    request.values.first().copied().ok_or_else(|| {
        Error::invalid_argument(format!("{:?} requires a value", request.function))
    })
}

/// Number of registers addressed by `request`.
///
/// Fails if the quantity or the values do not fit into a single frame.
pub fn register_count(request: &Request) -> Result<Quantity> {
    match request.function {
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            if !(1..=MAX_READ_QUANTITY).contains(&request.quantity) {
                return Err(Error::invalid_argument(format!(
                    "register count {} out of range 1..={MAX_READ_QUANTITY}",
                    request.quantity
                )));
            }
            Ok(request.quantity)
        }
        FunctionCode::WriteSingleRegister => {
            if request.values.len() != 1 {
                return Err(Error::invalid_argument(format!(
                    "single register write requires exactly one value, got {}",
                    request.values.len()
                )));
            }
            Ok(1)
        }
        FunctionCode::WriteMultipleRegisters => {
            let len = request.values.len();
            if !(1..=usize::from(MAX_WRITE_QUANTITY)).contains(&len) {
                return Err(Error::invalid_argument(format!(
                    "value count {len} out of range 1..={MAX_WRITE_QUANTITY}"
                )));
            }
            if usize::from(request.quantity) != len {
                return Err(Error::invalid_argument(format!(
                    "register count {} does not match {len} values",
                    request.quantity
                )));
            }
            Ok(request.quantity)
        }
        function => Err(Error::UnsupportedFunction(function)),
    }
}

/// Encode a request into a CRC-checked RTU frame.
pub fn encode_request(request: &Request) -> Result<Bytes> {
    let count = register_count(request)?;
    let mut buf = BytesMut::with_capacity(MAX_FRAME_LEN);
    buf.put_u8(request.slave.into());
    buf.put_u8(request.function.value());
    buf.put_u16(request.address);
    if request.function == FunctionCode::WriteSingleRegister {
        buf.put_u16(request.values[0]);
    } else {
        buf.put_u16(count);
    }
    if request.function == FunctionCode::WriteMultipleRegisters {
        buf.put_u8(u8_len(request.values.len() * 2));
        for word in &request.values {
            buf.put_u16(*word);
        }
    }
    append_crc(&mut buf);
    Ok(buf.freeze())
}

/// Total length of the response frame that starts with `buf`.
///
/// Returns `None` while too few header bytes have been received to tell.
pub fn expected_response_len(buf: &[u8]) -> Result<Option<usize>, FrameError> {
    let Some(&fn_code) = buf.get(1) else {
        // incomplete frame
        return Ok(None);
    };
    if fn_code & EXCEPTION_FLAG != 0 {
        return Ok(Some(EXCEPTION_FRAME_LEN));
    }
    match FunctionCode::new(fn_code) {
        Some(function) if function.is_register_read() => {
            Ok(buf.get(2).map(|byte_count| 5 + usize::from(*byte_count)))
        }
        Some(function) if function.is_register_write() => Ok(Some(WRITE_ACK_FRAME_LEN)),
        _ => Err(FrameError::UnsupportedFunction(fn_code)),
    }
}

fn check_len(frame: &[u8], expected: usize) -> Result<(), FrameError> {
    if frame.len() != expected {
        return Err(FrameError::MalformedResponse {
            expected,
            actual: frame.len(),
        });
    }
    Ok(())
}

/// Decode a complete RTU response frame.
pub fn decode_response(frame: &[u8]) -> Result<Response, FrameError> {
    if frame.len() < MIN_FRAME_LEN {
        return Err(FrameError::FrameTooShort { len: frame.len() });
    }
    let payload = &frame[..frame.len() - CRC_LEN];
    let calculated = crc16(payload);
    let received = received_crc(frame).unwrap_or_default();
    if received != calculated {
        return Err(FrameError::CrcMismatch {
            received,
            calculated,
        });
    }

    let slave = Slave(frame[0]);
    let fn_code = frame[1];
    if fn_code & EXCEPTION_FLAG != 0 {
        check_len(frame, EXCEPTION_FRAME_LEN)?;
        let function = FunctionCode::new(fn_code & !EXCEPTION_FLAG)
            .ok_or(FrameError::UnsupportedFunction(fn_code))?;
        return Ok(Response {
            slave,
            function,
            data: Bytes::new(),
            exception: Some(ExceptionCode::new(frame[2])),
        });
    }

    let function = FunctionCode::new(fn_code).ok_or(FrameError::UnsupportedFunction(fn_code))?;
    let data = if function.is_register_read() {
        let byte_count = usize::from(frame[2]);
        check_len(frame, 5 + byte_count)?;
        Bytes::copy_from_slice(&frame[3..3 + byte_count])
    } else if function.is_register_write() {
        check_len(frame, WRITE_ACK_FRAME_LEN)?;
        Bytes::new()
    } else {
        return Err(FrameError::UnsupportedFunction(fn_code));
    };
    Ok(Response {
        slave,
        function,
        data,
        exception: None,
    })
}

/// Decode big-endian register values.
///
/// A trailing odd byte is ignored.
#[must_use]
pub fn decode_registers(data: &[u8]) -> Vec<Word> {
    let rdr = &mut Cursor::new(data);
    let mut words = Vec::with_capacity(data.len() / 2);
    while let Ok(word) = read_u16_be(rdr) {
        words.push(word);
    }
    words
}

fn read_u16_be(reader: &mut impl io::Read) -> io::Result<u16> {
    reader.read_u16::<BigEndian>()
}

/// Encode the frame a slave answers `request` with.
///
/// `registers` are the values returned by reads and are ignored for writes,
/// which echo the address and the written value or quantity.
pub fn encode_response(request: &Request, registers: &[Word]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(MAX_FRAME_LEN);
    buf.put_u8(request.slave.into());
    buf.put_u8(request.function.value());
    match request.function {
        FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
            if registers.len() > usize::from(MAX_READ_QUANTITY) {
                return Err(Error::invalid_argument(format!(
                    "{} registers do not fit into a response",
                    registers.len()
                )));
            }
            buf.put_u8(u8_len(registers.len() * 2));
            for word in registers {
                buf.put_u16(*word);
            }
        }
        FunctionCode::WriteSingleRegister => {
            buf.put_u16(request.address);
            buf.put_u16(first_value(request)?);
        }
        FunctionCode::WriteMultipleRegisters => {
            buf.put_u16(request.address);
            buf.put_u16(request.quantity);
        }
        function => return Err(Error::UnsupportedFunction(function)),
    }
    append_crc(&mut buf);
    Ok(buf.freeze())
}

/// Encode an exception frame for `function`.
#[must_use]
pub fn encode_exception(slave: Slave, function: FunctionCode, exception: ExceptionCode) -> Bytes {
    let mut buf = BytesMut::with_capacity(EXCEPTION_FRAME_LEN);
    buf.put_u8(slave.into());
    buf.put_u8(function.value() | EXCEPTION_FLAG);
    buf.put_u8(exception.into());
    append_crc(&mut buf);
    buf.freeze()
}
