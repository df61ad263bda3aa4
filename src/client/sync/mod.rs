// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronous Modbus master

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "udp")]
pub mod udp;

use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use super::{Master as AsyncMaster, Transport};

use crate::{Address, Quantity, Request, Response, Result, Slave, Word};

/// A blocking [`AsyncMaster`] driven by its own Tokio runtime.
#[derive(Debug)]
pub struct Master {
    runtime: Runtime,
    async_master: AsyncMaster,
}

fn new_runtime() -> Result<Runtime> {
    // The worker thread keeps receiving datagrams between calls.
    let runtime = Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    Ok(runtime)
}

impl Master {
    pub fn new(transport: impl Transport + 'static) -> Result<Self> {
        let runtime = new_runtime()?;
        Ok(Self::from_parts(runtime, transport))
    }

    fn from_parts(runtime: Runtime, transport: impl Transport + 'static) -> Self {
        Self {
            runtime,
            async_master: AsyncMaster::new(transport),
        }
    }

    /// Create the transport within the context of the runtime.
    #[cfg(feature = "rtu")]
    pub(crate) fn with_transport<T, F>(create: F) -> Result<Self>
    where
        T: Transport + 'static,
        F: FnOnce() -> Result<T>,
    {
        let runtime = new_runtime()?;
        let transport = {
            let _guard = runtime.enter();
            create()?
        };
        Ok(Self::from_parts(runtime, transport))
    }

    #[must_use]
    pub fn async_master(&self) -> &AsyncMaster {
        &self.async_master
    }

    pub fn send_request(&self, request: &Request, timeout: Duration) -> Result<Response> {
        self.runtime
            .block_on(self.async_master.send_request(request, timeout))
    }

    pub fn read_holding_registers(
        &self,
        slave: Slave,
        addr: Address,
        cnt: Quantity,
        timeout: Duration,
    ) -> Result<Vec<Word>> {
        self.runtime.block_on(
            self.async_master
                .read_holding_registers(slave, addr, cnt, timeout),
        )
    }

    pub fn read_input_registers(
        &self,
        slave: Slave,
        addr: Address,
        cnt: Quantity,
        timeout: Duration,
    ) -> Result<Vec<Word>> {
        self.runtime.block_on(
            self.async_master
                .read_input_registers(slave, addr, cnt, timeout),
        )
    }

    pub fn write_single_register(
        &self,
        slave: Slave,
        addr: Address,
        word: Word,
        timeout: Duration,
    ) -> Result<()> {
        self.runtime.block_on(
            self.async_master
                .write_single_register(slave, addr, word, timeout),
        )
    }

    pub fn write_multiple_registers(
        &self,
        slave: Slave,
        addr: Address,
        words: &[Word],
        timeout: Duration,
    ) -> Result<()> {
        self.runtime.block_on(
            self.async_master
                .write_multiple_registers(slave, addr, words, timeout),
        )
    }
}
