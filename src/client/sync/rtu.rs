// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Master;

use crate::{
    rtu::{RtuConfig, RtuEngine, SerialLink},
    Result,
};

/// Open the serial port described by `config`.
#[cfg(feature = "serial")]
pub fn connect(config: &RtuConfig) -> Result<Master> {
    connect_link(crate::rtu::SystemSerialPort::new(config.parity), config)
}

/// Open the serial port described by `config` through `link`.
pub fn connect_link<L>(link: L, config: &RtuConfig) -> Result<Master>
where
    L: SerialLink + 'static,
{
    Master::with_transport(|| RtuEngine::open(link, config))
}
