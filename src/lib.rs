// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A [Modbus](https://en.wikipedia.org/wiki/Modbus) master
//! based on [tokio](https://tokio.rs).
//!
//! Register requests are encoded as Modbus RTU frames and sent either over
//! a half-duplex serial line ([`rtu::RtuEngine`]) or as the payload of UDP
//! datagrams ([`udp::UdpEngine`]). The [`client::Master`] facade validates
//! requests, dispatches them to one of these transports and turns
//! exception responses into errors.
//!
//! ## Installation
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! rtu-master = "*"
//! ```
//!
//! ## Correlation
//!
//! RTU frames carry no transaction identifier. A transport instance handles
//! one outstanding request at a time; concurrent callers are serialized.

#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]

pub mod bytes {
    //! Re-exported types from the [bytes](https://docs.rs/bytes) crate.
    pub use bytes::{Buf, BufMut, Bytes, BytesMut};
}

pub mod client;
pub mod codec;
pub mod device;
pub mod prelude;

#[cfg(feature = "rtu")]
pub mod rtu;

#[cfg(feature = "udp")]
pub mod udp;

mod error;
pub use self::error::{Error, ErrorKind, FrameError};

mod frame;
pub use self::frame::{
    Address, ExceptionCode, ExceptionResponse, FunctionCode, Quantity, Request, Response, Word,
    MAX_READ_QUANTITY, MAX_WRITE_QUANTITY,
};

mod slave;
pub use self::slave::{Slave, SlaveId};

/// Specialized [`std::result::Result`] type for master operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
