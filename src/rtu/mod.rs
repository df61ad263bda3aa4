// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU master on a half-duplex serial line.
//!
//! The serial line is accessed through the [`SerialLink`] trait with
//! non-blocking reads. A response is assembled by polling the link
//! until the frame is complete or the deadline has passed.

#[cfg(feature = "serial")]
mod serial;
#[cfg(feature = "serial")]
pub use self::serial::SystemSerialPort;

use std::{fmt, io, time::Duration};

use tokio::{
    sync::Mutex,
    time::{sleep, Instant},
};

use crate::{
    bytes::BytesMut,
    client::{deadline_after, Transport},
    codec::{self, EXCEPTION_FRAME_LEN, HEADER_LEN, MAX_FRAME_LEN},
    frame::EXCEPTION_FLAG,
    Error, ExceptionCode, FrameError, FunctionCode, Request, Response, Result, Slave,
};

/// Pause between two empty read attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const DEFAULT_BAUD_RATE: u32 = 9600;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Byte-oriented access to a serial port.
pub trait SerialLink: fmt::Debug + Send {
    fn open(&mut self, port_name: &str, baud_rate: u32) -> io::Result<()>;

    fn close(&mut self);

    /// Write `buf` and return the number of bytes actually written.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Read the bytes that are currently available without blocking.
    ///
    /// Returns 0 if nothing has been received.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn is_open(&self) -> bool;
}

/// Parity bit of each character on the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtuConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub parity: Parity,
    /// Default response timeout of requests sent through a [`crate::device::DeviceAdapter`].
    pub timeout: Duration,
}

impl RtuConfig {
    #[must_use]
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            parity: Parity::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    #[must_use]
    pub const fn parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Exchanges RTU frames with slaves on a serial line.
///
/// Only one request is on the line at a time. Concurrent callers
/// wait until the preceding request has completed or timed out.
#[derive(Debug)]
pub struct RtuEngine<L: SerialLink> {
    port_name: String,
    link: Mutex<L>,
}

impl<L: SerialLink> RtuEngine<L> {
    /// Open the serial port described by `config`.
    pub fn open(mut link: L, config: &RtuConfig) -> Result<Self> {
        link.open(&config.port_name, config.baud_rate)?;
        log::debug!(
            "Opened serial port {} with {} baud",
            config.port_name,
            config.baud_rate
        );
        Ok(Self {
            port_name: config.port_name.clone(),
            link: Mutex::new(link),
        })
    }

    #[must_use]
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub async fn is_open(&self) -> bool {
        self.link.lock().await.is_open()
    }

    /// Close the serial port.
    ///
    /// Subsequent requests fail with a transport error.
    pub async fn close(&self) {
        let mut link = self.link.lock().await;
        if link.is_open() {
            link.close();
            log::debug!("Closed serial port {}", self.port_name);
        }
    }

    /// Send a request and wait for the response.
    ///
    /// The `timeout` bounds the time from writing the request until
    /// the last byte of the response has been received.
    pub async fn send_request(&self, request: &Request, timeout: Duration) -> Result<Response> {
        let mut link = self.link.lock().await;
        if !link.is_open() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("serial port {} is closed", self.port_name),
            )
            .into());
        }
        let frame = codec::encode_request(request)?;

        discard_stale_bytes(&mut *link)?;

        log::debug!("Sending frame {:02X?}", &frame[..]);
        let written = link.write(&frame)?;
        if written != frame.len() {
            return Err(Error::TransportWriteFailed {
                written,
                expected: frame.len(),
            });
        }

        let deadline = deadline_after(Instant::now(), timeout);
        let response = receive_response(&mut *link, timeout, deadline).await?;
        log::debug!(
            "Received response from {} for {}",
            response.slave,
            response.function
        );
        Ok(response)
    }
}

impl<L: SerialLink> Drop for RtuEngine<L> {
    fn drop(&mut self) {
        let link = self.link.get_mut();
        if link.is_open() {
            link.close();
        }
    }
}

#[async_trait::async_trait]
impl<L: SerialLink> Transport for RtuEngine<L> {
    async fn send_request(&self, request: &Request, timeout: Duration) -> Result<Response> {
        RtuEngine::send_request(self, request, timeout).await
    }
}

/// Open the serial port of the operating system described by `config`.
#[cfg(feature = "serial")]
pub fn connect(config: &RtuConfig) -> Result<RtuEngine<SystemSerialPort>> {
    RtuEngine::open(SystemSerialPort::new(config.parity), config)
}

/// Remove bytes that arrived after a previous request has timed out.
fn discard_stale_bytes(link: &mut impl SerialLink) -> io::Result<()> {
    let mut chunk = [0; MAX_FRAME_LEN];
    loop {
        let count = link.read(&mut chunk)?;
        if count == 0 {
            return Ok(());
        }
        log::trace!("Discarded {count} stale byte(s)");
    }
}

async fn receive_response(
    link: &mut impl SerialLink,
    timeout: Duration,
    deadline: Instant,
) -> Result<Response> {
    let mut buf = BytesMut::with_capacity(MAX_FRAME_LEN);
    read_with_timeout(link, &mut buf, HEADER_LEN, timeout, deadline).await?;

    let fn_code = buf[1];
    if fn_code & EXCEPTION_FLAG != 0 {
        read_with_timeout(link, &mut buf, HEADER_LEN + 1, timeout, deadline).await?;
        // Verify the CRC if it has already been received.
        read_available(link, &mut buf, EXCEPTION_FRAME_LEN)?;
        if buf.len() == EXCEPTION_FRAME_LEN {
            return Ok(codec::decode_response(&buf)?);
        }
        let function = FunctionCode::new(fn_code & !EXCEPTION_FLAG)
            .ok_or(FrameError::UnsupportedFunction(fn_code))?;
        return Ok(Response {
            slave: Slave(buf[0]),
            function,
            data: Default::default(),
            exception: Some(ExceptionCode::new(buf[2])),
        });
    }

    loop {
        match codec::expected_response_len(&buf)? {
            Some(len) => {
                read_with_timeout(link, &mut buf, len, timeout, deadline).await?;
                break;
            }
            None => {
                let len = buf.len() + 1;
                read_with_timeout(link, &mut buf, len, timeout, deadline).await?;
            }
        }
    }
    log::debug!("Received frame {:02X?}", &buf[..]);
    Ok(codec::decode_response(&buf)?)
}

/// Single non-blocking read of up to `len - buf.len()` bytes.
fn read_available(link: &mut impl SerialLink, buf: &mut BytesMut, len: usize) -> io::Result<usize> {
    let mut chunk = [0; MAX_FRAME_LEN];
    let wanted = len.saturating_sub(buf.len()).min(chunk.len());
    if wanted == 0 {
        return Ok(0);
    }
    let count = link.read(&mut chunk[..wanted])?;
    buf.extend_from_slice(&chunk[..count]);
    Ok(count)
}

/// Fill `buf` up to `len` bytes, polling until `deadline`.
async fn read_with_timeout(
    link: &mut impl SerialLink,
    buf: &mut BytesMut,
    len: usize,
    timeout: Duration,
    deadline: Instant,
) -> Result<()> {
    while buf.len() < len {
        if read_available(link, buf, len)? > 0 {
            continue;
        }
        if Instant::now() > deadline {
            log::warn!(
                "Response timed out after {timeout:?} with {} of {len} byte(s)",
                buf.len()
            );
            return Err(Error::ResponseTimeout(timeout));
        }
        sleep(POLL_INTERVAL).await;
    }
    Ok(())
}
