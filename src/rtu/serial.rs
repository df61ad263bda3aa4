// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{
    fmt,
    io::{self, Read as _, Write as _},
    time::Duration,
};

use tokio_serial::{DataBits, FlowControl, SerialPort, StopBits};

use super::{Parity, SerialLink};

impl From<Parity> for tokio_serial::Parity {
    fn from(from: Parity) -> Self {
        match from {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

/// [`SerialLink`] backed by a serial port of the operating system.
///
/// The port is configured with 8 data bits, 1 stop bit and no flow control.
#[derive(Default)]
pub struct SystemSerialPort {
    parity: Parity,
    port: Option<Box<dyn SerialPort>>,
}

impl SystemSerialPort {
    #[must_use]
    pub fn new(parity: Parity) -> Self {
        Self { parity, port: None }
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

impl fmt::Debug for SystemSerialPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemSerialPort")
            .field("parity", &self.parity)
            .field("port", &self.port.as_ref().and_then(|port| port.name()))
            .finish()
    }
}

impl SerialLink for SystemSerialPort {
    fn open(&mut self, port_name: &str, baud_rate: u32) -> io::Result<()> {
        self.close();
        let port = tokio_serial::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(self.parity.into())
            .flow_control(FlowControl::None)
            // Reads return immediately with whatever has been received.
            .timeout(Duration::ZERO)
            .open()?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let port = self.port_mut()?;
        let written = port.write(buf)?;
        port.flush()?;
        Ok(written)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port_mut()?.read(buf) {
            Ok(count) => Ok(count),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                ) =>
            {
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}
