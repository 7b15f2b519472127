// src/utils.rs
// Byte and arithmetic helpers shared by the encoder and the dispatcher

use ethers::types::{Address, U256, U512};

use crate::errors::EncodingError;

/// Denominator of every 3-byte fraction in a program (splits and leg shares).
pub const U24_MAX: u32 = 0x00FF_FFFF;

/// `a * b / denominator` without intermediate overflow, rounding down.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return U256::zero();
    }
    let product: U512 = a.full_mul(b);
    let quotient = product / U512::from(denominator);
    quotient.try_into().unwrap_or(U256::max_value())
}

/// Converts a fraction in `[0, 1]` into a u24 numerator over [`U24_MAX`].
///
/// Never returns 0 for a positive fraction; 0 is reserved for "all remaining".
pub fn fraction_to_u24(fraction: f64) -> u32 {
    if fraction <= 0.0 {
        return 0;
    }
    let scaled = (fraction * U24_MAX as f64).round();
    scaled.clamp(1.0, U24_MAX as f64) as u32
}

/// Applies a u24 fraction to `amount`; 0 takes the whole amount.
pub fn apply_u24(amount: U256, fraction: u32) -> U256 {
    if fraction == 0 {
        amount
    } else {
        mul_div(amount, U256::from(fraction), U256::from(U24_MAX))
    }
}

pub fn write_u24(out: &mut Vec<u8>, value: u32) -> Result<(), EncodingError> {
    if value > U24_MAX {
        return Err(EncodingError::invalid(
            "u24",
            format!("{} does not fit in 3 bytes", value),
        ));
    }
    out.extend_from_slice(&value.to_be_bytes()[1..]);
    Ok(())
}

pub fn read_u24(bytes: &[u8]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

pub fn write_u256(out: &mut Vec<u8>, value: U256) {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    out.extend_from_slice(&word);
}

/// Forward-only reader over a byte slice. Every read checks the remaining
/// length and reports the field it was reading on failure.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
    context: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8], context: &'static str) -> Self {
        Self {
            bytes,
            offset: 0,
            context,
        }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], EncodingError> {
        if self.remaining() < len {
            return Err(EncodingError::LengthMismatch {
                context: self.context,
                declared: self.offset + len,
                actual: self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, EncodingError> {
        Ok(self.take(1)?[0])
    }

    pub fn u24(&mut self) -> Result<u32, EncodingError> {
        self.take(3).map(read_u24)
    }

    pub fn address(&mut self) -> Result<Address, EncodingError> {
        self.take(20).map(Address::from_slice)
    }

    pub fn u256(&mut self) -> Result<U256, EncodingError> {
        self.take(32).map(U256::from_big_endian)
    }

    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.bytes[self.offset..];
        self.offset = self.bytes.len();
        slice
    }

    /// Fails when unread bytes remain.
    pub fn finish(&self) -> Result<(), EncodingError> {
        if self.remaining() != 0 {
            return Err(EncodingError::LengthMismatch {
                context: self.context,
                declared: self.offset,
                actual: self.bytes.len(),
            });
        }
        Ok(())
    }
}
