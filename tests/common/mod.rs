// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory slave and links shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use rtu_master::{
    codec::{self, crc::verify_crc},
    ExceptionCode, FunctionCode, Request, Slave, Word,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Decode a request frame as sent by the master.
pub fn parse_request(frame: &[u8]) -> Option<Request> {
    if frame.len() < 8 || !verify_crc(frame) {
        return None;
    }
    let slave = Slave(frame[0]);
    let address = u16::from_be_bytes([frame[2], frame[3]]);
    let word = u16::from_be_bytes([frame[4], frame[5]]);
    let request = match FunctionCode::new(frame[1])? {
        FunctionCode::ReadHoldingRegisters => Request::read_holding_registers(slave, address, word),
        FunctionCode::ReadInputRegisters => Request::read_input_registers(slave, address, word),
        FunctionCode::WriteSingleRegister => Request::write_single_register(slave, address, word),
        FunctionCode::WriteMultipleRegisters => {
            let values: Vec<Word> = frame
                .get(7..frame.len() - 2)?
                .chunks_exact(2)
                .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                .collect();
            Request::write_multiple_registers(slave, address, &values)
        }
        _ => return None,
    };
    Some(request)
}

/// A slave device with 100 registers, initially holding their own address.
#[derive(Debug)]
pub struct TestSlave {
    pub address: Slave,
    registers: Mutex<Vec<Word>>,
    /// Answer with an exception instead of executing the request.
    pub exception: Option<fn(FunctionCode) -> Option<ExceptionCode>>,
    /// Answer with a different slave address.
    pub respond_as: Option<Slave>,
    /// Number of registers missing in read responses.
    pub missing_registers: usize,
}

impl TestSlave {
    pub fn new(address: Slave) -> Self {
        Self {
            address,
            registers: Mutex::new((0..100).collect()),
            exception: None,
            respond_as: None,
            missing_registers: 0,
        }
    }

    pub fn registers(&self) -> Vec<Word> {
        self.registers.lock().unwrap().clone()
    }

    /// The response frame for a request frame addressed to this slave.
    pub fn answer(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let request = parse_request(frame)?;
        if request.slave != self.address {
            return None;
        }
        let slave = self.respond_as.unwrap_or(request.slave);
        let function = request.function;
        if let Some(exception) = self.exception.and_then(|exception| exception(function)) {
            return Some(codec::encode_exception(slave, function, exception).to_vec());
        }

        let mut registers = self.registers.lock().unwrap();
        let start = usize::from(request.address);
        let end = start + usize::from(request.quantity);
        if end > registers.len() {
            let frame =
                codec::encode_exception(slave, function, ExceptionCode::IllegalDataAddress);
            return Some(frame.to_vec());
        }
        let response = Request {
            slave,
            ..request.clone()
        };
        let frame = if function.is_register_read() {
            let count = (end - start).saturating_sub(self.missing_registers);
            codec::encode_response(&response, &registers[start..start + count])
        } else {
            registers[start..end].copy_from_slice(&request.values);
            codec::encode_response(&response, &[])
        };
        frame.ok().map(|frame| frame.to_vec())
    }
}

#[cfg(feature = "rtu")]
pub use self::serial::MockSerialLine;

#[cfg(feature = "rtu")]
mod serial {
    use std::{
        collections::VecDeque,
        io,
        sync::{Arc, Mutex, MutexGuard},
        time::Duration,
    };

    use rtu_master::rtu::SerialLink;
    use tokio::time::Instant;

    use super::TestSlave;

    #[derive(Debug)]
    struct LineState {
        slave: Arc<TestSlave>,
        open: bool,
        /// Time between the end of a request and the arrival of its response.
        delay: Duration,
        /// Only the first bytes of each response arrive.
        truncate_to: Option<usize>,
        pending: VecDeque<(Instant, Vec<u8>)>,
        rx: VecDeque<u8>,
        written: Vec<Vec<u8>>,
    }

    /// A serial line with a [`TestSlave`] on the other end.
    #[derive(Debug, Clone)]
    pub struct MockSerialLine(Arc<Mutex<LineState>>);

    impl MockSerialLine {
        pub fn new(slave: Arc<TestSlave>) -> Self {
            Self(Arc::new(Mutex::new(LineState {
                slave,
                open: false,
                delay: Duration::ZERO,
                truncate_to: None,
                pending: VecDeque::new(),
                rx: VecDeque::new(),
                written: Vec::new(),
            })))
        }

        fn state(&self) -> MutexGuard<'_, LineState> {
            self.0.lock().unwrap()
        }

        pub fn set_delay(&self, delay: Duration) {
            self.state().delay = delay;
        }

        pub fn set_truncate_to(&self, len: Option<usize>) {
            self.state().truncate_to = len;
        }

        /// Noise received from the line.
        pub fn receive(&self, bytes: &[u8]) {
            self.state().rx.extend(bytes);
        }

        pub fn written(&self) -> Vec<Vec<u8>> {
            self.state().written.clone()
        }

        pub fn is_open(&self) -> bool {
            self.state().open
        }
    }

    impl SerialLink for MockSerialLine {
        fn open(&mut self, _port_name: &str, _baud_rate: u32) -> io::Result<()> {
            self.state().open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.state().open = false;
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut state = self.state();
            state.written.push(buf.to_vec());
            if let Some(mut reply) = state.slave.answer(buf) {
                if let Some(len) = state.truncate_to {
                    reply.truncate(len);
                }
                let arrival = Instant::now() + state.delay;
                state.pending.push_back((arrival, reply));
            }
            Ok(buf.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut state = self.state();
            let now = Instant::now();
            while state
                .pending
                .front()
                .is_some_and(|(arrival, _)| *arrival <= now)
            {
                if let Some((_, reply)) = state.pending.pop_front() {
                    state.rx.extend(reply);
                }
            }
            let count = buf.len().min(state.rx.len());
            for (dst, src) in buf.iter_mut().zip(state.rx.drain(..count)) {
                *dst = src;
            }
            Ok(count)
        }

        fn is_open(&self) -> bool {
            self.state().open
        }
    }
}

#[cfg(feature = "udp")]
pub use self::datagram::MockDatagramLink;

#[cfg(feature = "udp")]
mod datagram {
    use std::{
        fmt, io,
        net::SocketAddr,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use rtu_master::udp::{DatagramHandler, DatagramLink, Subscription};
    use tokio::time::Instant;

    use super::TestSlave;

    struct Inner {
        slave: Arc<TestSlave>,
        delay: Mutex<Duration>,
        fail_sends: AtomicBool,
        handler: Mutex<Option<DatagramHandler>>,
        local: Mutex<Option<SocketAddr>>,
        sent: Mutex<Vec<(Instant, SocketAddr, Vec<u8>)>>,
    }

    impl Inner {
        fn deliver(&self, datagram: &[u8]) {
            let handler = self.handler.lock().unwrap().clone();
            if let Some(handler) = handler {
                handler(datagram);
            }
        }
    }

    /// A datagram network with a [`TestSlave`] behind the target address.
    ///
    /// Responses without delay are delivered before `send` returns.
    #[derive(Clone)]
    pub struct MockDatagramLink(Arc<Inner>);

    impl fmt::Debug for MockDatagramLink {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("MockDatagramLink")
                .field("slave", &self.0.slave)
                .field("local", &self.0.local.lock().unwrap())
                .finish()
        }
    }

    impl MockDatagramLink {
        pub fn new(slave: Arc<TestSlave>) -> Self {
            Self(Arc::new(Inner {
                slave,
                delay: Mutex::new(Duration::ZERO),
                fail_sends: AtomicBool::new(false),
                handler: Mutex::new(None),
                local: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
            }))
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.0.delay.lock().unwrap() = delay;
        }

        pub fn set_fail_sends(&self, fail: bool) {
            self.0.fail_sends.store(fail, Ordering::SeqCst);
        }

        /// Deliver an unsolicited datagram.
        pub fn inject(&self, datagram: &[u8]) {
            self.0.deliver(datagram);
        }

        pub fn is_subscribed(&self) -> bool {
            self.0.handler.lock().unwrap().is_some()
        }

        pub fn local(&self) -> Option<SocketAddr> {
            *self.0.local.lock().unwrap()
        }

        pub fn sent(&self) -> Vec<(Instant, SocketAddr, Vec<u8>)> {
            self.0.sent.lock().unwrap().clone()
        }

        pub fn send_times(&self) -> Vec<Instant> {
            self.sent().into_iter().map(|(time, _, _)| time).collect()
        }
    }

    #[async_trait]
    impl DatagramLink for MockDatagramLink {
        async fn send(&self, dest: SocketAddr, payload: &[u8]) -> io::Result<()> {
            if self.0.fail_sends.load(Ordering::SeqCst) {
                return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
            }
            self.0
                .sent
                .lock()
                .unwrap()
                .push((Instant::now(), dest, payload.to_vec()));
            let Some(reply) = self.0.slave.answer(payload) else {
                return Ok(());
            };
            let delay = *self.0.delay.lock().unwrap();
            if delay.is_zero() {
                self.0.deliver(&reply);
            } else {
                let inner = Arc::clone(&self.0);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.deliver(&reply);
                });
            }
            Ok(())
        }

        fn subscribe(
            &self,
            local: SocketAddr,
            handler: DatagramHandler,
        ) -> io::Result<Subscription> {
            *self.0.handler.lock().unwrap() = Some(handler);
            *self.0.local.lock().unwrap() = Some(local);
            let inner = Arc::clone(&self.0);
            Ok(Subscription::new(move || {
                *inner.handler.lock().unwrap() = None;
            }))
        }
    }
}

/// Exceptions reported for every supported function.
pub fn exception_per_function(function: FunctionCode) -> Option<ExceptionCode> {
    let exception = match function {
        FunctionCode::ReadHoldingRegisters => ExceptionCode::IllegalFunction,
        FunctionCode::ReadInputRegisters => ExceptionCode::IllegalDataValue,
        FunctionCode::WriteSingleRegister => ExceptionCode::MemoryParityError,
        FunctionCode::WriteMultipleRegisters => ExceptionCode::ServerDeviceBusy,
        _ => ExceptionCode::GatewayTargetDevice,
    };
    Some(exception)
}
