//! Harp Protocol Driver
//!
//! Harp is a binary request/reply protocol used by the treadmill sensor/brake board.
//! Each register on the device has a fixed address and element type; the host reads
//! or writes whole registers, and the device answers each request with a timestamped
//! reply carrying the register's current contents.
//!
//! # Modules
//!
//! - [`message`] - frame layout, payload types and [`RegisterValue`] codecs
//! - `device` - [`HarpDevice`], blocking transactions over a serial port
//! - `checksum` - 8-bit additive checksum

mod checksum;
mod device;
mod errors;
pub mod message;

pub use checksum::{compute_checksum, verify_checksum};
pub use device::{HarpDevice, HarpTransport, DEFAULT_TIMEOUT, HARP_BAUD_RATE, WHO_AM_I_REGISTER};
pub use errors::{HarpError, HarpResult};
pub use message::{HarpMessage, HarpTime, MessageType, ParseError, PayloadType, RegisterValue};

#[cfg(test)]
pub(crate) use device::testing;
