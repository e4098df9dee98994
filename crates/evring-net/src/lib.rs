//! evring-net - Sockets, Buffered Framing, and the Event-Loop Binding
//!
//! The I/O layer under evring's asynchronous protocol handlers:
//!
//! - [`SocketDevice`] — non-blocking capable BSD-socket facade with a
//!   structured error taxonomy ([`NetError`]), readiness waits, and
//!   sticky per-device error state
//! - [`Address`] — IPv4 / IPv6 / unix-domain addresses with textual
//!   parsing and formatting
//! - [`ReadBuffer`] / [`WriteBuffer`] / [`StreamBuffers`] — zero-copy
//!   line and fixed-size framing on read, bulk reservation on write
//! - [`EventLoop`] / [`LoopBinding`] — run-one-iteration loop core with
//!   one-shot timers, parent/child binding chain, and event posting
//!
//! # Example
//!
//! ```no_run
//! use evring_net::{Address, SocketDevice};
//!
//! let addr = Address::parse("127.0.0.1:7000").unwrap();
//! let mut listener = SocketDevice::new();
//! listener.listen(&addr, 128).unwrap();
//!
//! let (mut conn, peer) = listener.accept().unwrap();
//! println!("connection from {:?}", peer);
//! let mut buf = [0u8; 1024];
//! let n = conn.read(&mut buf).unwrap();
//! conn.write(&buf[..n]).unwrap();
//! ```

mod addr;
mod buffer;
mod device;
mod error;
mod eventloop;

pub use addr::Address;
pub use buffer::{BulkWrite, ByteDevice, FrameHandler, ReadBuffer, StreamBuffers, WriteBuffer};
pub use device::SocketDevice;
pub use error::{NetError, NetResult};
pub use eventloop::{EventLoop, LoopBinding, LoopTask, OnTimer, TimerHandle};
