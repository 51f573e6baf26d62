//! EBML element encoder.

use super::{MAX_KNOWN_SIZE, UNKNOWN_SIZE};

/// Errors raised while re-encoding container metadata.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// ID whose byte length does not match its VINT marker
    #[error("Invalid element ID 0x{id:X}")]
    InvalidElementId {
        /// Offending ID
        id: u32,
    },

    /// Payload too large for an 8-byte size field
    #[error("Element 0x{id:X} too large: {size} bytes")]
    ElementTooLarge {
        /// Element ID
        id: u32,
        /// Payload size that did not fit
        size: u64,
    },

    /// NaN or infinite float value
    #[error("Element 0x{id:X} has non-finite value {value}")]
    NonFiniteFloat {
        /// Element ID
        id: u32,
        /// Rejected value
        value: f64,
    },
}

/// Builds EBML bytes in memory.
///
/// Masters are encoded by rendering their children into a nested writer
/// first, so every size field is minimal and exact.
#[derive(Debug, Default)]
pub struct ElementWriter {
    buf: Vec<u8>,
}

impl ElementWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes an unsigned integer element with a minimal payload.
    ///
    /// # Errors
    ///
    /// - `SerializationError::InvalidElementId` - Malformed ID
    pub fn write_uint(&mut self, id: u32, value: u64) -> Result<(), SerializationError> {
        let bytes = value.to_be_bytes();
        let len = (8 - (value.leading_zeros() / 8) as usize).max(1);
        self.write_binary(id, &bytes[8 - len..])
    }

    /// Writes a signed integer element with a minimal two's complement payload.
    ///
    /// # Errors
    ///
    /// - `SerializationError::InvalidElementId` - Malformed ID
    pub fn write_int(&mut self, id: u32, value: i64) -> Result<(), SerializationError> {
        let len = (1..=8usize)
            .find(|len| {
                let bits = 8 * *len as u32 - 1;
                *len == 8 || (value >= -(1i64 << bits) && value < (1i64 << bits))
            })
            .unwrap_or(8);
        let bytes = value.to_be_bytes();
        self.write_binary(id, &bytes[8 - len..])
    }

    /// Writes an 8-byte float element.
    ///
    /// # Errors
    ///
    /// - `SerializationError::NonFiniteFloat` - NaN or infinity
    /// - `SerializationError::InvalidElementId` - Malformed ID
    pub fn write_float(&mut self, id: u32, value: f64) -> Result<(), SerializationError> {
        if !value.is_finite() {
            return Err(SerializationError::NonFiniteFloat { id, value });
        }
        self.write_binary(id, &value.to_be_bytes())
    }

    /// Writes a UTF-8 string element.
    ///
    /// # Errors
    ///
    /// - `SerializationError::InvalidElementId` - Malformed ID
    pub fn write_string(&mut self, id: u32, value: &str) -> Result<(), SerializationError> {
        self.write_binary(id, value.as_bytes())
    }

    /// Writes an element with an opaque payload.
    ///
    /// # Errors
    ///
    /// - `SerializationError::InvalidElementId` - Malformed ID
    /// - `SerializationError::ElementTooLarge` - Payload exceeds size field
    pub fn write_binary(&mut self, id: u32, payload: &[u8]) -> Result<(), SerializationError> {
        self.write_header(id, Some(payload.len() as u64))?;
        self.buf.extend_from_slice(payload);
        Ok(())
    }

    /// Writes a master element whose children are produced by `build`.
    ///
    /// # Errors
    ///
    /// Propagates any error from `build` or from encoding the header.
    pub fn write_master<F>(&mut self, id: u32, build: F) -> Result<(), SerializationError>
    where
        F: FnOnce(&mut ElementWriter) -> Result<(), SerializationError>,
    {
        let mut children = ElementWriter::new();
        build(&mut children)?;
        self.write_binary(id, &children.buf)
    }

    /// Writes an element header carrying the unknown-size marker.
    ///
    /// Children follow as regular writes; nothing closes the element.
    ///
    /// # Errors
    ///
    /// - `SerializationError::InvalidElementId` - Malformed ID
    pub fn write_unknown_size_header(&mut self, id: u32) -> Result<(), SerializationError> {
        self.write_header(id, None)
    }

    /// Appends pre-encoded element bytes verbatim.
    pub fn write_raw(&mut self, encoded: &[u8]) {
        self.buf.extend_from_slice(encoded);
    }

    fn write_header(&mut self, id: u32, size: Option<u64>) -> Result<(), SerializationError> {
        let id_len = id_length(id).ok_or(SerializationError::InvalidElementId { id })?;
        self.buf.extend_from_slice(&id.to_be_bytes()[4 - id_len..]);

        match size {
            None => self.buf.extend_from_slice(&(UNKNOWN_SIZE | 1 << 56).to_be_bytes()),
            Some(size) if size > MAX_KNOWN_SIZE => {
                return Err(SerializationError::ElementTooLarge { id, size });
            }
            Some(size) => {
                let len = size_length(size);
                let marked = size | 1 << (7 * len);
                self.buf.extend_from_slice(&marked.to_be_bytes()[8 - len as usize..]);
            }
        }
        Ok(())
    }
}

/// Byte length of an ID if its lead byte marker matches that length.
fn id_length(id: u32) -> Option<usize> {
    let len = match id {
        0x80..=0xFE => 1,
        0x4000..=0x7FFF => 2,
        0x20_0000..=0x3F_FFFF => 3,
        0x1000_0000..=0x1FFF_FFFF => 4,
        _ => return None,
    };
    Some(len)
}

/// Smallest VINT length able to hold `size` without hitting the all-ones marker.
fn size_length(size: u64) -> u32 {
    (1..8u32)
        .find(|len| size < (1u64 << (7 * len)) - 1)
        .unwrap_or(8)
}
