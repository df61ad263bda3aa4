// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Register access to a single slave device.

use std::time::Duration;

use crate::{client::Master, Address, Error, Quantity, Result, Slave, Word};

/// A [`Master`] bound to one slave address and response timeout.
#[derive(Debug, Clone, Copy)]
pub struct DeviceAdapter<'a> {
    master: &'a Master,
    slave: Slave,
    timeout: Duration,
}

impl<'a> DeviceAdapter<'a> {
    /// Fails if `slave` is not the address of a single device (1 to 247).
    pub fn new(master: &'a Master, slave: Slave, timeout: Duration) -> Result<Self> {
        if !slave.is_single_device() {
            return Err(Error::invalid_argument(format!(
                "slave address {slave} is not in range {}..={}",
                Slave::min_device(),
                Slave::max_device()
            )));
        }
        Ok(Self {
            master,
            slave,
            timeout,
        })
    }

    #[must_use]
    pub const fn slave(&self) -> Slave {
        self.slave
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub async fn read_holding_registers(&self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        self.master
            .read_holding_registers(self.slave, addr, cnt, self.timeout)
            .await
    }

    pub async fn read_input_registers(&self, addr: Address, cnt: Quantity) -> Result<Vec<Word>> {
        self.master
            .read_input_registers(self.slave, addr, cnt, self.timeout)
            .await
    }

    /// Read a single holding register.
    pub async fn read_register(&self, addr: Address) -> Result<Word> {
        let words = self.read_holding_registers(addr, 1).await?;
        first_words::<1>(&words).map(|[word]| word)
    }

    /// Read two consecutive holding registers as one value, high word first.
    pub async fn read_u32(&self, addr: Address) -> Result<u32> {
        let words = self.read_holding_registers(addr, 2).await?;
        let [high, low] = first_words::<2>(&words)?;
        Ok((u32::from(high) << 16) | u32::from(low))
    }

    pub async fn write_single_register(&self, addr: Address, word: Word) -> Result<()> {
        self.master
            .write_single_register(self.slave, addr, word, self.timeout)
            .await
    }

    pub async fn write_multiple_registers(&self, addr: Address, words: &[Word]) -> Result<()> {
        self.master
            .write_multiple_registers(self.slave, addr, words, self.timeout)
            .await
    }

    /// Write a value into two consecutive holding registers, high word first.
    pub async fn write_u32(&self, addr: Address, value: u32) -> Result<()> {
        let words = split_u32(value);
        self.write_multiple_registers(addr, &words).await
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn split_u32(value: u32) -> [Word; 2] {
    [(value >> 16) as Word, value as Word]
}

fn first_words<const N: usize>(words: &[Word]) -> Result<[Word; N]> {
    words
        .get(..N)
        .and_then(|words| words.try_into().ok())
        .ok_or(Error::InvalidResponseSize {
            expected: N * 2,
            actual: words.len() * 2,
        })
}
