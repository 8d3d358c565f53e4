//! Big-endian cursor over class-file bytes.

use crate::error::ClassFileError;

/// A bounds-checked big-endian reader.
///
/// Every read either returns the decoded value or a
/// [`ClassFileError::Truncated`] describing where the input ran out.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the input.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consumes `len` bytes and returns them as a slice.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        if self.remaining() < len {
            return Err(ClassFileError::Truncated {
                offset: self.pos,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Skips `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), ClassFileError> {
        self.bytes(len).map(|_| ())
    }

    /// Reads an unsigned byte.
    pub fn u1(&mut self) -> Result<u8, ClassFileError> {
        Ok(self.bytes(1)?[0])
    }

    /// Reads a big-endian `u16`.
    pub fn u2(&mut self) -> Result<u16, ClassFileError> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Reads a big-endian `u32`.
    pub fn u4(&mut self) -> Result<u32, ClassFileError> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a big-endian `u64`.
    pub fn u8(&mut self) -> Result<u64, ClassFileError> {
        let hi = self.u4()? as u64;
        let lo = self.u4()? as u64;
        Ok((hi << 32) | lo)
    }

    /// Reads a signed byte.
    pub fn i1(&mut self) -> Result<i8, ClassFileError> {
        Ok(self.u1()? as i8)
    }

    /// Reads a big-endian `i16`.
    pub fn i2(&mut self) -> Result<i16, ClassFileError> {
        Ok(self.u2()? as i16)
    }

    /// Reads a big-endian `i32`.
    pub fn i4(&mut self) -> Result<i32, ClassFileError> {
        Ok(self.u4()? as i32)
    }

    /// Returns a sub-reader over the next `len` bytes and advances past them.
    pub fn sub_reader(&mut self, len: usize) -> Result<ByteReader<'a>, ClassFileError> {
        Ok(ByteReader::new(self.bytes(len)?))
    }
}
