// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use tokio::{net::UdpSocket, runtime::Handle};

use super::{DatagramHandler, DatagramLink, Subscription};

/// Receive buffer size, larger than any RTU frame.
const MAX_DATAGRAM_LEN: usize = 512;

/// [`DatagramLink`] over a UDP socket of the operating system.
#[derive(Debug, Clone)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
}

impl UdpLink {
    /// Bind the socket that sends requests.
    pub async fn bind(local: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl DatagramLink for UdpLink {
    async fn send(&self, dest: SocketAddr, payload: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(payload, dest).await?;
        if sent != payload.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {sent} of {} bytes", payload.len()),
            ));
        }
        Ok(())
    }

    /// Spawns a receive task on the current Tokio runtime.
    ///
    /// Responses are received on the socket of this link if it is bound
    /// to `local`, otherwise on a new socket.
    fn subscribe(&self, local: SocketAddr, handler: DatagramHandler) -> io::Result<Subscription> {
        let runtime = Handle::try_current().map_err(io::Error::other)?;
        let socket = if self.socket.local_addr()? == local {
            Arc::clone(&self.socket)
        } else {
            let socket = std::net::UdpSocket::bind(local)?;
            socket.set_nonblocking(true)?;
            Arc::new(UdpSocket::from_std(socket)?)
        };
        let task = runtime.spawn(receive_datagrams(socket, handler));
        Ok(Subscription::new(move || task.abort()))
    }
}

async fn receive_datagrams(socket: Arc<UdpSocket>, handler: DatagramHandler) {
    let mut buf = [0; MAX_DATAGRAM_LEN];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, peer)) => {
                log::trace!("Received {len} byte(s) from {peer}");
                handler(&buf[..len]);
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::ConnectionReset
                        | io::ErrorKind::ConnectionRefused
                        | io::ErrorKind::Interrupted
                ) =>
            {
                log::debug!("Ignoring receive error: {err}");
            }
            Err(err) => {
                log::warn!("Stopped receiving datagrams: {err}");
                return;
            }
        }
    }
}
