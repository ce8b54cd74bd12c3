//! Checksum computation for Harp frames
//!
//! The checksum is the sum of every byte in the frame before it,
//! truncated to 8 bits.

/// Compute the checksum over the bytes that precede the checksum field.
pub fn compute_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, byte| acc.wrapping_add(*byte))
}

/// Verify that a complete frame's trailing checksum byte is valid.
///
/// The frame must include every byte up to and including the checksum.
pub fn verify_checksum(frame: &[u8]) -> bool {
    let Some((&stored, data)) = frame.split_last() else {
        return false;
    };
    if data.is_empty() {
        return false;
    }

    compute_checksum(data) == stored
}
