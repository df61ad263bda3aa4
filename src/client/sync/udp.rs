// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{ops::Deref, sync::Arc, time::Duration};

use super::Master;

use crate::{
    udp::{CommunicationStatus, DatagramLink, Transaction, UdpConfig, UdpEngine, UdpLink},
    Request, Result,
};

/// A blocking [`Master`] that also exposes the controls and the
/// statistics of its [`UdpEngine`].
#[derive(Debug)]
pub struct UdpMaster<L: DatagramLink = UdpLink> {
    master: Master,
    engine: Arc<UdpEngine<L>>,
}

impl<L: DatagramLink + 'static> UdpMaster<L> {
    fn new(master: Master, engine: Arc<UdpEngine<L>>) -> Self {
        Self { master, engine }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<UdpEngine<L>> {
        &self.engine
    }

    #[must_use]
    pub fn status(&self) -> CommunicationStatus {
        self.engine.status()
    }

    #[must_use]
    pub fn last_transaction(&self) -> Option<Transaction> {
        self.engine.last_transaction()
    }

    /// Send a request without waiting for a response.
    pub fn control_async(&self, request: &Request) -> Result<()> {
        self.master
            .runtime
            .block_on(self.engine.control_async(request))
    }

    pub fn control_batch(&self, requests: &[Request]) -> Result<()> {
        self.master
            .runtime
            .block_on(self.engine.control_batch(requests))
    }

    pub fn set_polling_interval(&self, interval: Duration) {
        self.master
            .runtime
            .block_on(self.engine.set_polling_interval(interval));
    }
}

impl<L: DatagramLink> Deref for UdpMaster<L> {
    type Target = Master;

    fn deref(&self) -> &Master {
        &self.master
    }
}

/// Bind a UDP socket to `config.local` and exchange datagrams with `config.target`.
pub fn connect(config: &UdpConfig) -> Result<UdpMaster> {
    let runtime = super::new_runtime()?;
    let engine = Arc::new(runtime.block_on(crate::udp::connect(config))?);
    let master = Master::from_parts(runtime, Arc::clone(&engine));
    Ok(UdpMaster::new(master, engine))
}

/// Exchange datagrams with `config.target` through `link`.
pub fn connect_link<L>(link: L, config: &UdpConfig) -> Result<UdpMaster<L>>
where
    L: DatagramLink + 'static,
{
    let runtime = super::new_runtime()?;
    let engine = {
        let _guard = runtime.enter();
        Arc::new(UdpEngine::new(link, config)?)
    };
    let master = Master::from_parts(runtime, Arc::clone(&engine));
    Ok(UdpMaster::new(master, engine))
}
