//! Harp message framing
//!
//! Every Harp frame has the layout:
//!
//! ```text
//! [message_type, length, address, port, payload_type, (timestamp), payload..., checksum]
//! ```
//!
//! `length` counts every byte after the length field itself. When the payload type
//! carries [`TIMESTAMP_FLAG`], a 6-byte timestamp (u32 seconds, u16 ticks of 32 µs)
//! precedes the payload. All multi-byte values are little-endian.

use thiserror::Error;

use super::checksum::{compute_checksum, verify_checksum};

/// Port value addressing the device itself rather than a hub port.
pub const DEVICE_PORT: u8 = 255;

/// Bit set on the message type byte of an error reply.
pub const ERROR_FLAG: u8 = 0x08;

/// Bit set on the payload type byte when a timestamp precedes the payload.
pub const TIMESTAMP_FLAG: u8 = 0x10;

/// Smallest possible frame: header, address, port, payload type and checksum.
pub const MIN_FRAME_LEN: usize = 6;

const TIMESTAMP_LEN: usize = 6;

/// Duration of one timestamp tick in seconds.
const TIMESTAMP_TICK_SECS: f64 = 32e-6;

/// Harp message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Read = 1,
    Write = 2,
    Event = 3,
}

impl MessageType {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Read),
            2 => Some(Self::Write),
            3 => Some(Self::Event),
            _ => None,
        }
    }
}

/// Element type of a register payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    U8 = 0x01,
    S8 = 0x81,
    U16 = 0x02,
    S16 = 0x82,
    U32 = 0x04,
    S32 = 0x84,
    U64 = 0x08,
    S64 = 0x88,
    Float = 0x44,
}

impl PayloadType {
    /// Size in bytes of one payload element.
    pub fn element_size(self) -> usize {
        (self as u8 & 0x0F) as usize
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::U8),
            0x81 => Some(Self::S8),
            0x02 => Some(Self::U16),
            0x82 => Some(Self::S16),
            0x04 => Some(Self::U32),
            0x84 => Some(Self::S32),
            0x08 => Some(Self::U64),
            0x88 => Some(Self::S64),
            0x44 => Some(Self::Float),
            _ => None,
        }
    }
}

/// Device timestamp attached to replies and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarpTime {
    pub seconds: u32,
    /// Sub-second part in ticks of 32 µs.
    pub ticks: u16,
}

impl HarpTime {
    pub fn as_secs_f64(&self) -> f64 {
        self.seconds as f64 + self.ticks as f64 * TIMESTAMP_TICK_SECS
    }
}

/// Frame parse error
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame too short ({0} bytes)")]
    TooShort(usize),

    #[error("length field says {expected} bytes follow, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("checksum mismatch")]
    BadChecksum,

    #[error("unknown message type 0x{0:02X}")]
    UnknownMessageType(u8),

    #[error("unknown payload type 0x{0:02X}")]
    UnknownPayloadType(u8),

    #[error("payload of {len} bytes is not a whole number of {element_size}-byte elements")]
    MisalignedPayload { len: usize, element_size: usize },

    #[error("payload type mismatch: expected {expected:?}, got {got:?}")]
    PayloadTypeMismatch {
        expected: PayloadType,
        got: PayloadType,
    },
}

/// A value type that can be stored in a Harp register.
pub trait RegisterValue: Sized + Copy {
    const PAYLOAD_TYPE: PayloadType;

    /// Append the little-endian encoding of `self` to `out`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decode one element. `bytes` is exactly one element long.
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_register_value {
    ($($ty:ty => $payload:ident),* $(,)?) => {
        $(
            impl RegisterValue for $ty {
                const PAYLOAD_TYPE: PayloadType = PayloadType::$payload;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_register_value! {
    u8 => U8,
    i8 => S8,
    u16 => U16,
    i16 => S16,
    u32 => U32,
    i32 => S32,
    u64 => U64,
    i64 => S64,
    f32 => Float,
}

/// A decoded Harp message.
#[derive(Debug, Clone, PartialEq)]
pub struct HarpMessage {
    pub message_type: MessageType,
    /// Set on replies the device flagged as errors.
    pub is_error: bool,
    pub address: u8,
    pub port: u8,
    pub payload_type: PayloadType,
    pub timestamp: Option<HarpTime>,
    pub payload: Vec<u8>,
}

impl HarpMessage {
    /// Build a read request for a register of the given type.
    pub fn read_request(address: u8, payload_type: PayloadType) -> Self {
        Self {
            message_type: MessageType::Read,
            is_error: false,
            address,
            port: DEVICE_PORT,
            payload_type,
            timestamp: None,
            payload: Vec::new(),
        }
    }

    /// Build a write request carrying `values`.
    pub fn write_request<T: RegisterValue>(address: u8, values: &[T]) -> Self {
        let mut payload = Vec::with_capacity(values.len() * T::PAYLOAD_TYPE.element_size());
        for value in values {
            value.write_le(&mut payload);
        }

        Self {
            message_type: MessageType::Write,
            is_error: false,
            address,
            port: DEVICE_PORT,
            payload_type: T::PAYLOAD_TYPE,
            timestamp: None,
            payload,
        }
    }

    /// Serialise to wire bytes, including length and checksum.
    pub fn encode(&self) -> Vec<u8> {
        let timestamp_len = if self.timestamp.is_some() {
            TIMESTAMP_LEN
        } else {
            0
        };
        let length = 4 + timestamp_len + self.payload.len();
        debug_assert!(length < 255, "extended length frames are not supported");

        let mut type_byte = self.message_type as u8;
        if self.is_error {
            type_byte |= ERROR_FLAG;
        }
        let mut payload_type_byte = self.payload_type as u8;
        if self.timestamp.is_some() {
            payload_type_byte |= TIMESTAMP_FLAG;
        }

        let mut frame = Vec::with_capacity(length + 2);
        frame.push(type_byte);
        frame.push(length as u8);
        frame.push(self.address);
        frame.push(self.port);
        frame.push(payload_type_byte);
        if let Some(ts) = self.timestamp {
            frame.extend_from_slice(&ts.seconds.to_le_bytes());
            frame.extend_from_slice(&ts.ticks.to_le_bytes());
        }
        frame.extend_from_slice(&self.payload);
        frame.push(compute_checksum(&frame));
        frame
    }

    /// Parse one complete frame.
    pub fn parse(frame: &[u8]) -> Result<Self, ParseError> {
        if frame.len() < MIN_FRAME_LEN {
            return Err(ParseError::TooShort(frame.len()));
        }

        let expected = frame[1] as usize;
        if expected != frame.len() - 2 {
            return Err(ParseError::WrongLength {
                expected,
                got: frame.len() - 2,
            });
        }

        if !verify_checksum(frame) {
            return Err(ParseError::BadChecksum);
        }

        let type_byte = frame[0];
        let message_type = MessageType::from_byte(type_byte & !ERROR_FLAG)
            .ok_or(ParseError::UnknownMessageType(type_byte))?;

        let payload_type_byte = frame[4];
        let payload_type = PayloadType::from_byte(payload_type_byte & !TIMESTAMP_FLAG)
            .ok_or(ParseError::UnknownPayloadType(payload_type_byte))?;

        let mut body = &frame[5..frame.len() - 1];
        let timestamp = if payload_type_byte & TIMESTAMP_FLAG != 0 {
            if body.len() < TIMESTAMP_LEN {
                return Err(ParseError::TooShort(frame.len()));
            }
            let ts = HarpTime {
                seconds: u32::from_le_bytes([body[0], body[1], body[2], body[3]]),
                ticks: u16::from_le_bytes([body[4], body[5]]),
            };
            body = &body[TIMESTAMP_LEN..];
            Some(ts)
        } else {
            None
        };

        let element_size = payload_type.element_size();
        if body.len() % element_size != 0 {
            return Err(ParseError::MisalignedPayload {
                len: body.len(),
                element_size,
            });
        }

        Ok(Self {
            message_type,
            is_error: type_byte & ERROR_FLAG != 0,
            address: frame[2],
            port: frame[3],
            payload_type,
            timestamp,
            payload: body.to_vec(),
        })
    }

    /// Decode the payload as a sequence of `T`.
    pub fn values<T: RegisterValue>(&self) -> Result<Vec<T>, ParseError> {
        if self.payload_type != T::PAYLOAD_TYPE {
            return Err(ParseError::PayloadTypeMismatch {
                expected: T::PAYLOAD_TYPE,
                got: self.payload_type,
            });
        }

        Ok(self
            .payload
            .chunks_exact(T::PAYLOAD_TYPE.element_size())
            .map(T::read_le)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Sensor reply as sent by the board: Read, register 35, timestamped S32x3.
    fn sensor_reply(values: [i32; 3]) -> Vec<u8> {
        HarpMessage {
            message_type: MessageType::Read,
            is_error: false,
            address: 35,
            port: DEVICE_PORT,
            payload_type: PayloadType::S32,
            timestamp: Some(HarpTime {
                seconds: 12,
                ticks: 15625,
            }),
            payload: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        }
        .encode()
    }

    #[test]
    fn test_read_request_bytes() {
        let frame = HarpMessage::read_request(35, PayloadType::S32).encode();
        assert_eq!(frame, vec![0x01, 0x04, 0x23, 0xFF, 0x84, 0xAB]);
    }

    #[test]
    fn test_write_u16_request_bytes() {
        let frame = HarpMessage::write_request(37, &[0x1234u16]).encode();
        assert_eq!(frame[..7], [0x02, 0x06, 0x25, 0xFF, 0x02, 0x34, 0x12]);
        assert!(verify_checksum(&frame));
    }

    #[test]
    fn test_parse_timestamped_sensor_reply() {
        let frame = sensor_reply([-5, 1200, 77]);
        assert_eq!(frame[1] as usize, frame.len() - 2);

        let msg = HarpMessage::parse(&frame).unwrap();
        assert_eq!(msg.message_type, MessageType::Read);
        assert!(!msg.is_error);
        assert_eq!(msg.address, 35);
        assert_eq!(msg.payload_type, PayloadType::S32);
        assert_eq!(msg.values::<i32>().unwrap(), vec![-5, 1200, 77]);

        let ts = msg.timestamp.unwrap();
        assert_eq!(ts.seconds, 12);
        assert_abs_diff_eq!(ts.as_secs_f64(), 12.5, epsilon = 1e-9);
    }

    #[test]
    fn test_parse_error_reply() {
        let mut reply = HarpMessage::write_request(37, &[0u16]);
        reply.is_error = true;
        let msg = HarpMessage::parse(&reply.encode()).unwrap();
        assert!(msg.is_error);
        assert_eq!(msg.message_type, MessageType::Write);
    }

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let mut frame = sensor_reply([1, 2, 3]);
        let last = frame.len() - 1;
        frame[last] = frame[last].wrapping_add(1);
        assert_eq!(HarpMessage::parse(&frame), Err(ParseError::BadChecksum));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let mut frame = sensor_reply([1, 2, 3]);
        frame.pop();
        assert!(matches!(
            HarpMessage::parse(&frame),
            Err(ParseError::WrongLength { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_short_frame() {
        assert_eq!(
            HarpMessage::parse(&[0x01, 0x03, 0x00]),
            Err(ParseError::TooShort(3))
        );
    }

    #[test]
    fn test_values_type_mismatch() {
        let msg = HarpMessage::write_request(41, &[0u8]);
        assert!(matches!(
            msg.values::<u16>(),
            Err(ParseError::PayloadTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(PayloadType::U8.element_size(), 1);
        assert_eq!(PayloadType::S16.element_size(), 2);
        assert_eq!(PayloadType::S32.element_size(), 4);
        assert_eq!(PayloadType::Float.element_size(), 4);
        assert_eq!(PayloadType::S64.element_size(), 8);
    }
}
