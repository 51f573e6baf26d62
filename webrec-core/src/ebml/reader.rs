//! Streaming EBML reader over any `Read` source.

use std::io::{self, ErrorKind, Read};

use bytes::Bytes;

use super::EbmlError;

/// Upper bound for binary payloads read into memory (CodecPrivate and
/// friends). Block payloads are skipped, never read.
const MAX_BINARY_SIZE: u64 = 16 * 1024 * 1024;

/// Decoded element ID and size, positioned in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    /// Element ID with its VINT marker retained
    pub id: u32,
    /// Payload size, `None` for the unknown-size marker
    pub size: Option<u64>,
    /// Stream offset of the first ID byte
    pub offset: u64,
    /// Combined length of the ID and size fields
    pub header_len: u8,
}

impl ElementHeader {
    /// Stream offset where the payload starts.
    pub fn data_offset(&self) -> u64 {
        self.offset + u64::from(self.header_len)
    }

    /// Stream offset one past the payload, if the size is known.
    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.data_offset() + size)
    }

    /// Returns the payload size or rejects an unknown-size element.
    ///
    /// # Errors
    ///
    /// - `EbmlError::Invalid` - Element carries the unknown-size marker
    pub fn known_size(&self) -> Result<u64, EbmlError> {
        self.size.ok_or_else(|| {
            EbmlError::invalid(
                self.offset,
                format!("element 0x{:X} has unknown size", self.id),
            )
        })
    }
}

/// Sequential EBML reader that tracks its absolute stream position.
pub struct EbmlReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> EbmlReader<R> {
    /// Wraps a reader positioned at stream offset 0.
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Current absolute stream offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reads the next element header.
    ///
    /// Returns `Ok(None)` on a clean end of input, i.e. when no byte of a new
    /// element is available.
    ///
    /// # Errors
    ///
    /// - `EbmlError::Truncated` - Input ended inside the ID or size field
    /// - `EbmlError::Invalid` - ID or size lead byte is not a valid VINT
    /// - `EbmlError::Io` - Underlying reader failed
    pub fn read_element_header(&mut self) -> Result<Option<ElementHeader>, EbmlError> {
        let offset = self.position;
        let Some(first) = self.read_byte_or_eof()? else {
            return Ok(None);
        };

        let id_len = vint_length(first)
            .filter(|len| *len <= 4)
            .ok_or_else(|| {
                EbmlError::invalid(offset, format!("invalid element ID lead byte 0x{first:02X}"))
            })?;
        let mut id = u32::from(first);
        for _ in 1..id_len {
            id = (id << 8) | u32::from(self.read_u8()?);
        }

        let (size, size_len) = self.read_size()?;
        Ok(Some(ElementHeader {
            id,
            size,
            offset,
            header_len: (id_len + size_len) as u8,
        }))
    }

    /// Reads a size-style VINT (marker stripped). Used for block track numbers.
    ///
    /// # Errors
    ///
    /// - `EbmlError::Truncated` - Input ended inside the VINT
    /// - `EbmlError::Invalid` - Lead byte is zero
    pub fn read_vint(&mut self) -> Result<u64, EbmlError> {
        let (value, _) = self.read_size()?;
        value.ok_or_else(|| EbmlError::invalid(self.position, "reserved all-ones VINT"))
    }

    /// Reads a big-endian unsigned integer payload.
    ///
    /// # Errors
    ///
    /// - `EbmlError::Invalid` - Payload longer than 8 bytes
    /// - `EbmlError::Truncated` - Input ended inside the payload
    pub fn read_uint(&mut self, size: u64) -> Result<u64, EbmlError> {
        if size > 8 {
            return Err(EbmlError::invalid(
                self.position,
                format!("unsigned integer of {size} bytes"),
            ));
        }
        let mut buf = [0u8; 8];
        let start = 8 - size as usize;
        self.fill(&mut buf[start..])?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Reads a big-endian two's complement integer payload.
    ///
    /// # Errors
    ///
    /// - `EbmlError::Invalid` - Payload longer than 8 bytes
    /// - `EbmlError::Truncated` - Input ended inside the payload
    pub fn read_int(&mut self, size: u64) -> Result<i64, EbmlError> {
        if size == 0 {
            return Ok(0);
        }
        let raw = self.read_uint(size)?;
        let shift = 64 - 8 * size as u32;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Reads a 0, 4 or 8 byte IEEE float payload.
    ///
    /// # Errors
    ///
    /// - `EbmlError::Invalid` - Any other payload length
    /// - `EbmlError::Truncated` - Input ended inside the payload
    pub fn read_float(&mut self, size: u64) -> Result<f64, EbmlError> {
        match size {
            0 => Ok(0.0),
            4 => {
                let mut buf = [0u8; 4];
                self.fill(&mut buf)?;
                Ok(f64::from(f32::from_be_bytes(buf)))
            }
            8 => {
                let mut buf = [0u8; 8];
                self.fill(&mut buf)?;
                Ok(f64::from_be_bytes(buf))
            }
            other => Err(EbmlError::invalid(
                self.position,
                format!("float of {other} bytes"),
            )),
        }
    }

    /// Reads a string payload, dropping trailing NUL padding.
    ///
    /// # Errors
    ///
    /// Same as [`EbmlReader::read_binary`].
    pub fn read_string(&mut self, size: u64) -> Result<String, EbmlError> {
        let raw = self.read_binary(size)?;
        let trimmed = match raw.iter().rposition(|byte| *byte != 0) {
            Some(last) => &raw[..=last],
            None => &[][..],
        };
        Ok(String::from_utf8_lossy(trimmed).into_owned())
    }

    /// Reads a binary payload into memory.
    ///
    /// # Errors
    ///
    /// - `EbmlError::Invalid` - Payload exceeds the in-memory limit
    /// - `EbmlError::Truncated` - Input ended inside the payload
    pub fn read_binary(&mut self, size: u64) -> Result<Bytes, EbmlError> {
        if size > MAX_BINARY_SIZE {
            return Err(EbmlError::invalid(
                self.position,
                format!("binary payload of {size} bytes exceeds limit"),
            ));
        }
        let offset = self.position;
        let mut data = Vec::with_capacity(size.min(64 * 1024) as usize);
        let read = (&mut self.inner).take(size).read_to_end(&mut data)?;
        self.position += read as u64;
        if (read as u64) < size {
            return Err(EbmlError::Truncated {
                offset: offset + read as u64,
            });
        }
        Ok(Bytes::from(data))
    }

    /// Discards `size` payload bytes.
    ///
    /// # Errors
    ///
    /// - `EbmlError::Truncated` - Input ended before `size` bytes were skipped
    pub fn skip(&mut self, size: u64) -> Result<(), EbmlError> {
        let skipped = io::copy(&mut (&mut self.inner).take(size), &mut io::sink())?;
        self.position += skipped;
        if skipped < size {
            return Err(EbmlError::Truncated {
                offset: self.position,
            });
        }
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes.
    ///
    /// # Errors
    ///
    /// - `EbmlError::Truncated` - Input ended first
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<(), EbmlError> {
        let offset = self.position;
        match self.inner.read_exact(buf) {
            Ok(()) => {
                self.position += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(EbmlError::Truncated { offset }),
            Err(e) => Err(e.into()),
        }
    }

    fn read_size(&mut self) -> Result<(Option<u64>, usize), EbmlError> {
        let offset = self.position;
        let first = self.read_u8()?;
        let len = vint_length(first)
            .ok_or_else(|| EbmlError::invalid(offset, "invalid VINT lead byte 0x00"))?;

        let mask = (0xFFu16 >> len) as u8;
        let mut value = u64::from(first & mask);
        let mut all_ones = first & mask == mask;
        for _ in 1..len {
            let byte = self.read_u8()?;
            value = (value << 8) | u64::from(byte);
            all_ones &= byte == 0xFF;
        }

        Ok((if all_ones { None } else { Some(value) }, len))
    }

    fn read_u8(&mut self) -> Result<u8, EbmlError> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    fn read_byte_or_eof(&mut self) -> Result<Option<u8>, EbmlError> {
        let mut buf = [0u8; 1];
        loop {
            match self.inner.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(buf[0]));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Length in bytes of a VINT given its first byte, `None` for `0x00`.
fn vint_length(first: u8) -> Option<usize> {
    (first != 0).then(|| first.leading_zeros() as usize + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_one_byte_id_and_size() {
        let mut reader = EbmlReader::new(&[0xE7, 0x81, 0x05][..]);

        let header = reader.read_element_header().unwrap().unwrap();
        assert_eq!(header.id, 0xE7);
        assert_eq!(header.size, Some(1));
        assert_eq!(header.header_len, 2);
        assert_eq!(reader.read_uint(1).unwrap(), 5);
        assert!(reader.read_element_header().unwrap().is_none());
    }

    #[test]
    fn test_reads_four_byte_id_with_unknown_size() {
        let data = [0x18, 0x53, 0x80, 0x67, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = EbmlReader::new(&data[..]);

        let header = reader.read_element_header().unwrap().unwrap();
        assert_eq!(header.id, 0x1853_8067);
        assert_eq!(header.size, None);
        assert_eq!(header.data_offset(), 12);
        assert!(header.known_size().is_err());
    }

    #[test]
    fn test_one_byte_all_ones_size_is_unknown() {
        let mut reader = EbmlReader::new(&[0xA3, 0xFF][..]);
        let header = reader.read_element_header().unwrap().unwrap();
        assert_eq!(header.size, None);
    }

    #[test]
    fn test_truncated_header_is_distinguished_from_eof() {
        let mut reader = EbmlReader::new(&[0x1A, 0x45][..]);
        let err = reader.read_element_header().unwrap_err();
        assert!(err.is_truncated());
    }

    #[test]
    fn test_zero_lead_byte_is_invalid() {
        let mut reader = EbmlReader::new(&[0x00, 0x81][..]);
        let err = reader.read_element_header().unwrap_err();
        assert!(matches!(err, EbmlError::Invalid { offset: 0, .. }));
    }

    #[test]
    fn test_signed_integer_sign_extension() {
        let mut reader = EbmlReader::new(&[0xFF, 0x38][..]);
        assert_eq!(reader.read_int(2).unwrap(), -200);
    }

    #[test]
    fn test_float_sizes() {
        let mut data = Vec::new();
        data.extend_from_slice(&1.5f32.to_be_bytes());
        data.extend_from_slice(&5200.0f64.to_be_bytes());
        let mut reader = EbmlReader::new(&data[..]);

        assert_eq!(reader.read_float(4).unwrap(), 1.5);
        assert_eq!(reader.read_float(8).unwrap(), 5200.0);
        assert!(reader.read_float(3).is_err());
    }

    #[test]
    fn test_string_trailing_nul_trimmed() {
        let mut reader = EbmlReader::new(&b"webm\0\0"[..]);
        assert_eq!(reader.read_string(6).unwrap(), "webm");
    }

    #[test]
    fn test_skip_past_end_is_truncated() {
        let mut reader = EbmlReader::new(&[1, 2, 3][..]);
        let err = reader.skip(10).unwrap_err();
        assert!(err.is_truncated());
        assert_eq!(reader.position(), 3);
    }
}
