//! # Prefix-Length-Encoded arrays
//!
//! A PLE array is a flat byte string `[len_1][bytes_1][len_2][bytes_2]...` where every
//! length is a 2-byte big-endian prefix. It lets a decoder walk heterogeneous-length
//! elements without a separate index.
//!
//! Zero-length elements are valid. Upstream tooling inserts them as alignment padding,
//! so the decoder returns them as empty slices and callers treat them as no-ops.

use crate::errors::EncodingError;

/// Largest element a 2-byte prefix can describe.
pub const MAX_ELEMENT_LEN: usize = u16::MAX as usize;

/// Size of each length prefix in bytes.
pub const PREFIX_LEN: usize = 2;

/// Encodes `elements` into a single PLE byte string.
pub fn encode<I, T>(elements: I) -> Result<Vec<u8>, EncodingError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut out = Vec::new();
    for element in elements {
        push(&mut out, element.as_ref())?;
    }
    Ok(out)
}

/// Appends one prefixed element to `out`.
pub fn push(out: &mut Vec<u8>, element: &[u8]) -> Result<(), EncodingError> {
    if element.len() > MAX_ELEMENT_LEN {
        return Err(EncodingError::ElementTooLarge {
            len: element.len(),
            max: MAX_ELEMENT_LEN,
        });
    }
    out.extend_from_slice(&(element.len() as u16).to_be_bytes());
    out.extend_from_slice(element);
    Ok(())
}

/// Splits a PLE byte string into its elements, padding included.
///
/// Fails when a prefix is cut short or declares more bytes than remain; trailing
/// bytes are never silently ignored.
pub fn decode(bytes: &[u8]) -> Result<Vec<&[u8]>, EncodingError> {
    let mut elements = Vec::new();
    let mut offset = 0usize;
    while offset < bytes.len() {
        if bytes.len() - offset < PREFIX_LEN {
            return Err(EncodingError::LengthMismatch {
                context: "ple prefix",
                declared: offset + PREFIX_LEN,
                actual: bytes.len(),
            });
        }
        let len = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]) as usize;
        offset += PREFIX_LEN;
        if bytes.len() - offset < len {
            return Err(EncodingError::LengthMismatch {
                context: "ple element",
                declared: offset + len,
                actual: bytes.len(),
            });
        }
        elements.push(&bytes[offset..offset + len]);
        offset += len;
    }
    Ok(elements)
}
