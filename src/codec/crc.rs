// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CRC16 checksum of Modbus RTU frames.

use crate::bytes::{BufMut as _, BytesMut};

/// Number of CRC bytes trailing every frame.
pub const CRC_LEN: usize = 2;

/// Reflected polynomial `0x8005`.
const POLYNOMIAL: u16 = 0xA001;

const CRC_TABLE: [u16; 256] = crc_table();

#[allow(clippy::cast_possible_truncation)]
const fn crc_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < table.len() {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x0001 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Calculate the CRC16 of `buf`.
#[must_use]
pub fn crc16(buf: &[u8]) -> u16 {
    buf.iter().fold(0xFFFF, |crc, byte| {
        let index = usize::from((crc ^ u16::from(*byte)) & 0x00FF);
        (crc >> 8) ^ CRC_TABLE[index]
    })
}

/// Append the CRC16 of the buffer contents, low byte first.
pub fn append_crc(buf: &mut BytesMut) {
    let crc = crc16(buf);
    buf.put_u16_le(crc);
}

/// The CRC transmitted at the end of `frame`.
pub(crate) fn received_crc(frame: &[u8]) -> Option<u16> {
    let (_, tail) = frame.split_at(frame.len().checked_sub(CRC_LEN)?);
    Some(u16::from_le_bytes([tail[0], tail[1]]))
}

/// Check the trailing CRC of a complete frame.
#[must_use]
pub fn verify_crc(frame: &[u8]) -> bool {
    match received_crc(frame) {
        Some(received) => received == crc16(&frame[..frame.len() - CRC_LEN]),
        None => false,
    }
}
