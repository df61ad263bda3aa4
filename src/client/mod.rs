// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus master facade

use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{
    codec::{decode_registers, register_count},
    frame::*,
    Error, Result, Slave,
};

#[cfg(feature = "sync")]
pub mod sync;

/// Transport independent request/response exchange.
///
/// Implemented by the RTU and the UDP engine. Implementations serialize
/// concurrent callers, so at most one request is in flight per instance.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send `request` and wait up to `timeout` for the matching response.
    ///
    /// Exception responses are returned as a [`Response`] with the
    /// exception set, not as an error.
    async fn send_request(&self, request: &Request, timeout: Duration) -> Result<Response>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send_request(&self, request: &Request, timeout: Duration) -> Result<Response> {
        (**self).send_request(request, timeout).await
    }
}

/// Asynchronous Modbus master
#[derive(Debug)]
pub struct Master {
    transport: Box<dyn Transport>,
}

impl From<Box<dyn Transport>> for Master {
    fn from(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl From<Master> for Box<dyn Transport> {
    fn from(val: Master) -> Self {
        val.transport
    }
}

impl Master {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }

    #[must_use]
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// Validate and send a request.
    ///
    /// Fails with [`Error::Exception`] if the slave answers with an
    /// exception response.
    pub async fn send_request(&self, request: &Request, timeout: Duration) -> Result<Response> {
        log::debug!("Call {:?}", request);
        validate_request(request)?;
        let response = self.transport.send_request(request, timeout).await?;
        verify_response(request, response)
    }

    /// Read multiple holding registers (0x03)
    pub async fn read_holding_registers(
        &self,
        slave: Slave,
        addr: Address,
        cnt: Quantity,
        timeout: Duration,
    ) -> Result<Vec<Word>> {
        let request = Request::read_holding_registers(slave, addr, cnt);
        self.read_registers(&request, timeout).await
    }

    /// Read multiple input registers (0x04)
    pub async fn read_input_registers(
        &self,
        slave: Slave,
        addr: Address,
        cnt: Quantity,
        timeout: Duration,
    ) -> Result<Vec<Word>> {
        let request = Request::read_input_registers(slave, addr, cnt);
        self.read_registers(&request, timeout).await
    }

    /// Write a single holding register (0x06)
    pub async fn write_single_register(
        &self,
        slave: Slave,
        addr: Address,
        word: Word,
        timeout: Duration,
    ) -> Result<()> {
        let request = Request::write_single_register(slave, addr, word);
        self.send_request(&request, timeout).await.map(drop)
    }

    /// Write multiple holding registers (0x10)
    pub async fn write_multiple_registers(
        &self,
        slave: Slave,
        addr: Address,
        words: &[Word],
        timeout: Duration,
    ) -> Result<()> {
        let request = Request::write_multiple_registers(slave, addr, words);
        self.send_request(&request, timeout).await.map(drop)
    }

    async fn read_registers(&self, request: &Request, timeout: Duration) -> Result<Vec<Word>> {
        let response = self.send_request(request, timeout).await?;
        let expected = usize::from(request.quantity) * 2;
        if response.data.len() != expected {
            return Err(Error::InvalidResponseSize {
                expected,
                actual: response.data.len(),
            });
        }
        Ok(decode_registers(&response.data))
    }
}

/// Deadlines beyond this horizon are treated as never expiring.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// The instant `timeout` after `start`, saturated for huge timeouts.
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout.min(FAR_FUTURE))
        .unwrap_or(start)
}

/// Check the request parameters before any I/O.
pub fn validate_request(request: &Request) -> Result<()> {
    if !request.slave.is_single_device() {
        return Err(Error::invalid_argument(format!(
            "slave address {} out of range {}..={}",
            request.slave.0,
            Slave::min_device().0,
            Slave::max_device().0
        )));
    }
    let count = register_count(request)?;
    if u32::from(request.address) + u32::from(count) > 0x1_0000 {
        return Err(Error::invalid_argument(format!(
            "registers {}..+{count} exceed the address space",
            request.address
        )));
    }
    Ok(())
}

/// Match a response against its request and surface exceptions.
fn verify_response(request: &Request, response: Response) -> Result<Response> {
    if response.slave != request.slave || response.function != request.function {
        return Err(Error::UnexpectedResponse {
            slave: response.slave,
            function: response.function,
        });
    }
    response.into_result().map_err(|err| {
        log::debug!("Slave {} reported {}", request.slave, err.exception);
        err.into()
    })
}
