//! Groovy I/O and Platform Abstraction
//!
//! Network I/O and timing for the streaming engine: non-blocking UDP
//! sockets, the [`Transport`] capability with its socket-backed and
//! in-memory implementations, and injectable clocks.

pub mod mock;
pub mod socket;
pub mod time;
pub mod transport;

pub use mock::{MockTransport, SentDatagram, StreamRecord};
pub use socket::{DeviceSocket, SocketError, SEND_BUFFER_SIZE};
pub use time::{duration_ns, Clock, ManualClock, MonotonicClock};
pub use transport::{BatchedTransport, SocketTransport, Transport, UdpTransport};
