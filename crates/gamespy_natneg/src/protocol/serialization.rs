//! # Packet Serialization
//!
//! Byte-level readers and writers for NATNEG packets.
//!
//! ## Design
//!
//! - All multi-byte integers are big-endian (network order)
//! - Fixed-layout prefixes go through `bytemuck` Pod structs
//! - Reads report how many bytes were missing, never panic

use bytemuck::{bytes_of, Pod};
use gamespy_common::read_cstring;

use crate::error::{NatNegError, NatNegResult};

/// Largest datagram the server ever writes.
pub const MAX_OUTGOING_SIZE: usize = 32;

/// Packet writer - appends fields to an owned buffer.
///
/// Outgoing packets are at most a few dozen bytes and are handed to the
/// socket by value, so the writer owns a small `Vec`.
#[derive(Debug)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_OUTGOING_SIZE),
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    /// Writes a u16 in big-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(bytes);
        self
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> &mut Self {
        self.buffer.extend_from_slice(bytes_of(value));
        self
    }

    /// Consumes the writer and returns the packet bytes.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for PacketWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Packet reader - walks a received payload.
pub struct PacketReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    /// Creates a new reader over a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns the unread tail without consuming it.
    #[inline]
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.buffer[self.position.min(self.buffer.len())..]
    }

    fn take(&mut self, len: usize) -> NatNegResult<&'a [u8]> {
        let end = self.position + len;
        if end > self.buffer.len() {
            return Err(NatNegError::PacketTooShort {
                needed: end,
                actual: self.buffer.len(),
            });
        }
        let slice = &self.buffer[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Skips `len` bytes.
    #[inline]
    pub fn skip(&mut self, len: usize) -> NatNegResult<()> {
        self.take(len).map(|_| ())
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> NatNegResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a u16 in big-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> NatNegResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a fixed-size byte array.
    #[inline]
    pub fn read_array<const N: usize>(&mut self) -> NatNegResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> NatNegResult<T> {
        let slice = self.take(std::mem::size_of::<T>())?;
        // Unaligned read: datagram buffers carry no alignment guarantee
        Ok(bytemuck::pod_read_unaligned(slice))
    }

    /// Reads a null-terminated string, consuming the terminator.
    pub fn read_cstring(&mut self) -> NatNegResult<String> {
        let (value, consumed) = read_cstring(self.rest())?;
        self.position += consumed;
        Ok(value.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_big_endian() {
        let mut writer = PacketWriter::new();
        writer.write_u8(0x01).write_u16(0xABCD).write_bytes(&[9, 8]);
        assert_eq!(writer.len(), 5);
        assert_eq!(writer.finish(), vec![0x01, 0xAB, 0xCD, 9, 8]);
    }

    #[test]
    fn test_reader_fields() {
        let data = [0x07, 0x6D, 0x1D, b'm', b'k', b'w', 0, 0xEE];
        let mut reader = PacketReader::new(&data);

        assert_eq!(reader.read_u8().unwrap(), 0x07);
        assert_eq!(reader.read_u16().unwrap(), 27933);
        assert_eq!(reader.read_cstring().unwrap(), "mkw");
        assert_eq!(reader.remaining(), 1);
        assert_eq!(reader.rest(), &[0xEE]);
    }

    #[test]
    fn test_reader_reports_shortfall() {
        let mut reader = PacketReader::new(&[1, 2, 3]);
        reader.skip(2).unwrap();

        match reader.read_u16() {
            Err(NatNegError::PacketTooShort { needed, actual }) => {
                assert_eq!(needed, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("expected PacketTooShort, got {other:?}"),
        }
    }

    #[test]
    fn test_reader_unterminated_string() {
        let mut reader = PacketReader::new(b"abc");
        assert!(matches!(reader.read_cstring(), Err(NatNegError::BadString(_))));
    }

    #[test]
    fn test_read_array() {
        let mut reader = PacketReader::new(&[10, 0, 0, 1, 5]);
        assert_eq!(reader.read_array::<4>().unwrap(), [10, 0, 0, 1]);
        assert_eq!(reader.remaining(), 1);
    }
}
