//! Deterministic, fixed-width binary encoding for on-disk headers.
//!
//! The storage layer writes a small amount of structured metadata (heap
//! file headers) next to raw record bytes. This module provides the
//! [`Encode`] and [`Decode`] traits used for that metadata so that the
//! on-disk representation is owned by this crate and never shifts with a
//! dependency upgrade.
//!
//! # Wire format
//!
//! | Rust type | Encoding                                     |
//! |-----------|----------------------------------------------|
//! | `u8`      | 1 byte                                       |
//! | `u16`     | 2 bytes, little-endian                       |
//! | `u32`     | 4 bytes, little-endian                       |
//! | `u64`     | 8 bytes, little-endian                       |
//! | `[u8; N]` | `N` raw bytes (fixed-size, no length prefix) |
//!
//! Every encoded value has a fixed width, so a header always occupies the
//! same number of bytes regardless of its contents.
//!
//! # Zero-panic guarantee
//!
//! Decoders check the remaining buffer length before touching it and
//! report [`EncodingError::UnexpectedEof`] instead of panicking.


use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced during encoding or decoding.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Core traits
// ------------------------------------------------------------------------------------------------

/// Serialize `self` into a byte buffer.
///
/// Implementations must be deterministic: the same value always yields
/// the same bytes.
pub trait Encode {
    /// Append the encoded representation of `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;
}

/// Deserialize a value from a byte slice.
///
/// Returns `(value, bytes_consumed)` so callers can walk a buffer holding
/// several encoded fields.
pub trait Decode: Sized {
    /// Decode one value starting at `buf[0]`.
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError>;
}

// ------------------------------------------------------------------------------------------------
// Convenience functions
// ------------------------------------------------------------------------------------------------

/// Encode a value into a freshly-allocated `Vec<u8>`.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decode a value from the beginning of `buf`.
pub fn decode_from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), EncodingError> {
    T::decode_from(buf)
}

/// Verify that `buf` holds at least `needed` bytes.
#[inline]
fn require(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        Err(EncodingError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Unsigned integers
// ------------------------------------------------------------------------------------------------

macro_rules! impl_le_int {
    ($($ty:ty),*) => {
        $(
            impl Encode for $ty {
                #[inline]
                fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
                    buf.extend_from_slice(&self.to_le_bytes());
                    Ok(())
                }
            }

            impl Decode for $ty {
                #[inline]
                fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
                    const WIDTH: usize = std::mem::size_of::<$ty>();
                    require(buf, WIDTH)?;
                    let mut bytes = [0u8; WIDTH];
                    bytes.copy_from_slice(&buf[..WIDTH]);
                    Ok((<$ty>::from_le_bytes(bytes), WIDTH))
                }
            }
        )*
    };
}

impl_le_int!(u8, u16, u32, u64);

// ------------------------------------------------------------------------------------------------
// Fixed-size byte arrays
// ------------------------------------------------------------------------------------------------

impl<const N: usize> Encode for [u8; N] {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(self);
        Ok(())
    }
}

impl<const N: usize> Decode for [u8; N] {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, N)?;
        let mut arr = [0u8; N];
        arr.copy_from_slice(&buf[..N]);
        Ok((arr, N))
    }
}
