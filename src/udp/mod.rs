// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus RTU frames carried as UDP datagram payload.
//!
//! Responses are delivered asynchronously by the [`DatagramLink`] to a
//! handler that decodes them into a bounded inbox. A query clears the
//! inbox, sends the request and waits for the next response.
//!
//! RTU frames carry no transaction identifier. Only one query of an
//! engine is in flight at a time and the first valid response received
//! afterwards is taken as its answer.

mod inbox;
mod socket;
mod stats;

pub use self::{socket::UdpLink, stats::CommunicationStatus};

use std::{
    fmt, io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex as StdMutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::Mutex,
    time::{sleep_until, Instant},
};

use crate::{
    client::{deadline_after, Transport},
    codec, Error, Request, Response, Result,
};

use self::{inbox::Inbox, stats::Counters};

const DEFAULT_MIN_POLLING_INTERVAL: Duration = Duration::from_millis(100);

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Callback invoked by a [`DatagramLink`] once per received datagram.
pub type DatagramHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Message-oriented network access.
#[async_trait]
pub trait DatagramLink: fmt::Debug + Send + Sync {
    /// Send `payload` as a single datagram.
    async fn send(&self, dest: SocketAddr, payload: &[u8]) -> io::Result<()>;

    /// Deliver all datagrams received on `local` to `handler`.
    ///
    /// Delivery stops when the returned [`Subscription`] is dropped.
    fn subscribe(&self, local: SocketAddr, handler: DatagramHandler) -> io::Result<Subscription>;
}

/// Registration of a [`DatagramHandler`].
///
/// Dropping it unregisters the handler.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Create a subscription that calls `cancel` when dropped.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Datagram endpoint settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpConfig {
    /// Address of the slave gateway.
    pub target: SocketAddr,
    /// Address on which responses are received.
    pub local: SocketAddr,
    /// Minimum time between the start of two queries.
    pub min_polling_interval: Duration,
    /// Default response timeout of requests sent through a [`crate::device::DeviceAdapter`].
    pub timeout: Duration,
}

impl UdpConfig {
    /// Receive responses on all interfaces with the port of `target`.
    #[must_use]
    pub fn new(target: SocketAddr) -> Self {
        let unspecified = match target.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        Self {
            target,
            local: SocketAddr::new(unspecified, target.port()),
            min_polling_interval: DEFAULT_MIN_POLLING_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn local(mut self, local: SocketAddr) -> Self {
        self.local = local;
        self
    }

    #[must_use]
    pub const fn min_polling_interval(mut self, interval: Duration) -> Self {
        self.min_polling_interval = interval;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Completed(Response),
    TimedOut,
}

/// Record of a sent query.
///
/// The id only numbers the queries of an engine, it is not transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub id: u64,
    pub send_time: Instant,
    pub timeout: Duration,
    pub state: TransactionState,
}

#[derive(Debug)]
struct QueryGate {
    min_polling_interval: Duration,
    last_poll: Option<Instant>,
}

impl QueryGate {
    /// Delay the next query until the polling interval has elapsed.
    ///
    /// The caller records `last_poll` when it sends.
    async fn wait_for_turn(&self) {
        if let Some(last_poll) = self.last_poll {
            let next_poll = deadline_after(last_poll, self.min_polling_interval);
            if next_poll > Instant::now() {
                log::trace!("Delaying query by {:?}", next_poll - Instant::now());
                sleep_until(next_poll).await;
            }
        }
    }
}

/// Exchanges RTU frames with a slave gateway over datagrams.
#[derive(Debug)]
pub struct UdpEngine<L: DatagramLink> {
    link: L,
    target: SocketAddr,
    inbox: Arc<Inbox>,
    gate: Mutex<QueryGate>,
    counters: Counters,
    next_transaction_id: AtomicU64,
    last_transaction: StdMutex<Option<Transaction>>,
    _subscription: Subscription,
}

impl<L: DatagramLink> UdpEngine<L> {
    /// Subscribe to the responses on `config.local`.
    pub fn new(link: L, config: &UdpConfig) -> Result<Self> {
        let inbox = Arc::new(Inbox::default());
        let handler: DatagramHandler = {
            let inbox = Arc::clone(&inbox);
            Arc::new(move |datagram: &[u8]| receive_datagram(&inbox, datagram))
        };
        let subscription = link.subscribe(config.local, handler)?;
        log::debug!(
            "Receiving responses from {} on {}",
            config.target,
            config.local
        );
        Ok(Self {
            link,
            target: config.target,
            inbox,
            gate: Mutex::new(QueryGate {
                min_polling_interval: config.min_polling_interval,
                last_poll: None,
            }),
            counters: Counters::default(),
            next_transaction_id: AtomicU64::new(1),
            last_transaction: StdMutex::new(None),
            _subscription: subscription,
        })
    }

    #[must_use]
    pub const fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send a request and wait for the response.
    ///
    /// Waits before sending if the previous query started less than the
    /// minimum polling interval ago.
    pub async fn query(&self, request: &Request, timeout: Duration) -> Result<Response> {
        let frame = codec::encode_request(request)?;

        let mut gate = self.gate.lock().await;
        gate.wait_for_turn().await;

        self.inbox.clear();
        self.counters.query_started();
        log::debug!("Sending frame {:02X?} to {}", &frame[..], self.target);
        let started = Instant::now();
        gate.last_poll = Some(started);
        if let Err(err) = self.link.send(self.target, &frame).await {
            log::warn!("Failed to send request to {}: {err}", self.target);
            self.counters.query_failed();
            return Err(Error::TransportSendFailed(err));
        }
        let id = self.begin_transaction(started, timeout);

        let deadline = deadline_after(started, timeout);
        let Some(response) = self.inbox.pop_until(deadline).await else {
            log::warn!("No response from {} within {timeout:?}", self.target);
            self.counters.query_failed();
            self.finish_transaction(id, TransactionState::TimedOut);
            return Err(Error::ResponseTimeout(timeout));
        };
        self.counters.query_answered(started.elapsed());
        self.finish_transaction(id, TransactionState::Completed(response.clone()));
        drop(gate);
        log::debug!(
            "Received response from {} for {}",
            response.slave,
            response.function
        );
        Ok(response)
    }

    /// Send a request without waiting for a response.
    pub async fn control_async(&self, request: &Request) -> Result<()> {
        let frame = codec::encode_request(request)?;
        self.counters.control_sent();
        log::debug!("Sending frame {:02X?} to {}", &frame[..], self.target);
        self.link.send(self.target, &frame).await.map_err(|err| {
            log::warn!("Failed to send control to {}: {err}", self.target);
            self.counters.control_failed();
            Error::TransportSendFailed(err)
        })
    }

    /// Send all requests without waiting for responses.
    ///
    /// Every request is attempted. Requests sent before a failure are
    /// not rolled back and the first error is returned.
    pub async fn control_batch(&self, requests: &[Request]) -> Result<()> {
        let mut first_err = None;
        for request in requests {
            if let Err(err) = self.control_async(request).await {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Change the minimum time between the start of two queries.
    pub async fn set_polling_interval(&self, interval: Duration) {
        self.gate.lock().await.min_polling_interval = interval;
    }

    #[must_use]
    pub fn status(&self) -> CommunicationStatus {
        self.counters.snapshot()
    }

    /// The most recent query that has been sent.
    #[must_use]
    pub fn last_transaction(&self) -> Option<Transaction> {
        self.transaction_slot().clone()
    }

    fn transaction_slot(&self) -> std::sync::MutexGuard<'_, Option<Transaction>> {
        self.last_transaction
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_transaction(&self, send_time: Instant, timeout: Duration) -> u64 {
        let id = self.next_transaction_id.fetch_add(1, Ordering::Relaxed);
        *self.transaction_slot() = Some(Transaction {
            id,
            send_time,
            timeout,
            state: TransactionState::Pending,
        });
        id
    }

    fn finish_transaction(&self, id: u64, state: TransactionState) {
        if let Some(transaction) = self.transaction_slot().as_mut() {
            if transaction.id == id {
                transaction.state = state;
            }
        }
    }
}

#[async_trait]
impl<L: DatagramLink> Transport for UdpEngine<L> {
    async fn send_request(&self, request: &Request, timeout: Duration) -> Result<Response> {
        self.query(request, timeout).await
    }
}

/// Bind a [`UdpLink`] to `config.local` and receive the responses on it.
pub async fn connect(config: &UdpConfig) -> Result<UdpEngine<UdpLink>> {
    let link = UdpLink::bind(config.local).await?;
    let config = config.local(link.local_addr()?);
    UdpEngine::new(link, &config)
}

fn receive_datagram(inbox: &Inbox, datagram: &[u8]) {
    match codec::decode_response(datagram) {
        Ok(response) => inbox.push(response),
        Err(err) => log::warn!("Dropped datagram {datagram:02X?}: {err}"),
    }
}
