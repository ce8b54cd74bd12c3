//! Serial transport for Harp devices

use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, trace};

use super::errors::{HarpError, HarpResult};
use super::message::{HarpMessage, MessageType, RegisterValue};

/// Harp devices run their serial link at 1 Mbaud.
pub const HARP_BAUD_RATE: u32 = 1_000_000;

/// Default time to wait for a reply before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Common register holding the device identifier.
pub const WHO_AM_I_REGISTER: u8 = 0;

/// Byte stream a [`HarpDevice`] talks over.
pub trait HarpTransport: Read + Write {
    /// Drop any bytes received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

impl HarpTransport for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// A Harp device reachable over a byte transport (normally a serial port).
///
/// Transactions are strictly request/reply: each request blocks until the matching
/// reply arrives or the transaction timeout expires. Event frames the device emits
/// in between are discarded.
pub struct HarpDevice<T = Box<dyn SerialPort>> {
    transport: T,
    name: String,
    timeout: Duration,
}

impl HarpDevice {
    /// Open a Harp device on the given serial port.
    pub fn connect(port: &str) -> HarpResult<Self> {
        Self::connect_with_timeout(port, DEFAULT_TIMEOUT)
    }

    /// Open a Harp device with a custom transaction timeout.
    pub fn connect_with_timeout(port: &str, timeout: Duration) -> HarpResult<Self> {
        let transport = serialport::new(port, HARP_BAUD_RATE)
            .timeout(timeout)
            .open()
            .map_err(|source| HarpError::Open {
                port: port.to_string(),
                source,
            })?;

        Ok(Self::from_transport(transport, port).with_timeout(timeout))
    }
}

impl<T: HarpTransport> HarpDevice<T> {
    /// Wrap an already-open transport.
    pub fn from_transport(transport: T, name: &str) -> Self {
        Self {
            transport,
            name: name.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound each transaction, request to matching reply, by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read a register and decode every element of its payload.
    pub fn read<V: RegisterValue>(&mut self, address: u8) -> HarpResult<Vec<V>> {
        let request = HarpMessage::read_request(address, V::PAYLOAD_TYPE);
        let reply = self.transact(&request)?;
        Ok(reply.values::<V>()?)
    }

    /// Read a register holding exactly `N` elements.
    pub fn read_array<V: RegisterValue, const N: usize>(
        &mut self,
        address: u8,
    ) -> HarpResult<[V; N]> {
        let values = self.read::<V>(address)?;
        let got = values.len();
        values
            .try_into()
            .map_err(|_| HarpError::WrongValueCount {
                address,
                expected: N,
                got,
            })
    }

    /// Read a single-element register.
    pub fn read_single<V: RegisterValue>(&mut self, address: u8) -> HarpResult<V> {
        let [value] = self.read_array::<V, 1>(address)?;
        Ok(value)
    }

    /// Write `values` to a register and wait for the acknowledgement.
    pub fn write<V: RegisterValue>(&mut self, address: u8, values: &[V]) -> HarpResult<()> {
        let request = HarpMessage::write_request(address, values);
        self.transact(&request)?;
        Ok(())
    }

    /// Write a single-element register.
    pub fn write_single<V: RegisterValue>(&mut self, address: u8, value: V) -> HarpResult<()> {
        self.write(address, &[value])
    }

    /// Read the device identifier from the common WhoAmI register.
    pub fn who_am_i(&mut self) -> HarpResult<u16> {
        self.read_single::<u16>(WHO_AM_I_REGISTER)
    }

    /// Send a request and return the reply addressed to the same register.
    ///
    /// Unread input is discarded first, so the tail of a frame that arrived after
    /// an earlier timeout cannot be mistaken for the start of this reply.
    pub fn transact(&mut self, request: &HarpMessage) -> HarpResult<HarpMessage> {
        let deadline = Instant::now() + self.timeout;

        self.transport.discard_input()?;
        let frame = request.encode();
        trace!("{} -> {:02X?}", self.name, frame);
        self.transport.write_all(&frame)?;
        self.transport.flush()?;

        loop {
            let reply = self.read_frame(request.address)?;

            if reply.message_type == MessageType::Event {
                trace!("{}: skipping event from register {}", self.name, reply.address);
            } else if reply.address != request.address
                || reply.message_type != request.message_type
            {
                debug!(
                    "{}: discarding unexpected {:?} reply for register {}",
                    self.name, reply.message_type, reply.address
                );
            } else if reply.is_error {
                return Err(HarpError::ErrorReply {
                    kind: request.message_type,
                    address: request.address,
                });
            } else {
                if let Some(ts) = reply.timestamp {
                    trace!("{}: reply at {:.6} s", self.name, ts.as_secs_f64());
                }
                return Ok(reply);
            }

            if Instant::now() >= deadline {
                return Err(HarpError::Timeout {
                    address: request.address,
                });
            }
        }
    }

    /// Read one complete frame from the transport.
    fn read_frame(&mut self, address: u8) -> HarpResult<HarpMessage> {
        let mut header = [0u8; 2];
        self.read_exact(&mut header, address)?;

        let mut frame = Vec::with_capacity(header[1] as usize + 2);
        frame.extend_from_slice(&header);
        frame.resize(header[1] as usize + 2, 0);
        self.read_exact(&mut frame[2..], address)?;

        trace!("{} <- {:02X?}", self.name, frame);
        Ok(HarpMessage::parse(&frame)?)
    }

    fn read_exact(&mut self, buffer: &mut [u8], address: u8) -> HarpResult<()> {
        self.transport.read_exact(buffer).map_err(|e| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::UnexpectedEof => HarpError::Timeout { address },
            _ => HarpError::Io(e),
        })
    }

}

impl<T> HarpDevice<T> {
    /// Name of the port this device was opened on.
    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
