//! Fixed-width primitive encoding for persisted bookkeeping values.
//!
//! Version stamps are `u32` and sequence counters are `u64`. Both are stored
//! big-endian and decoding checks the exact width, so a value written with
//! one width can never be read back with the other.

use crate::error::StorageError;

/// Fixed-width byte encoding for unsigned scalars.
pub trait PrimitiveCodec: Sized + Copy {
    /// Encoded width in bytes.
    const WIDTH: usize;

    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Result<Self, StorageError>;
}

impl PrimitiveCodec for u32 {
    const WIDTH: usize = 4;

    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        let raw: [u8; 4] = bytes.try_into().map_err(|_| StorageError::Codec {
            expected: Self::WIDTH,
            actual: bytes.len(),
        })?;
        Ok(u32::from_be_bytes(raw))
    }
}

impl PrimitiveCodec for u64 {
    const WIDTH: usize = 8;

    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
        let raw: [u8; 8] = bytes.try_into().map_err(|_| StorageError::Codec {
            expected: Self::WIDTH,
            actual: bytes.len(),
        })?;
        Ok(u64::from_be_bytes(raw))
    }
}
