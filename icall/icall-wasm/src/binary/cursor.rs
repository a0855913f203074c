//! Byte cursor with offset tracking, little-endian primitives and LEB128.

use super::{BinaryReadError, Result};

#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn malformed(&self, msg: &'static str) -> BinaryReadError {
        BinaryReadError::Malformed { offset: self.pos, msg }
    }

    pub fn peek_u8(&self) -> Result<u8> {
        self.data.get(self.pos).copied().ok_or(BinaryReadError::UnexpectedEof { offset: self.pos })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let b = self.peek_u8()?;
        self.pos += 1;
        Ok(b)
    }

    /// Read exactly `n` bytes as a view into the underlying slice.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(self.malformed("position overflow"))?;
        let slice = self.data.get(self.pos..end).ok_or(BinaryReadError::UnexpectedEof { offset: self.pos })?;
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    pub fn read_var_u32(&mut self) -> Result<u32> {
        self.read_unsigned(32).map(|v| v as u32)
    }

    pub fn read_var_u64(&mut self) -> Result<u64> {
        self.read_unsigned(64)
    }

    pub fn read_var_i32(&mut self) -> Result<i32> {
        self.read_signed(32).map(|v| v as i32)
    }

    pub fn read_var_i64(&mut self) -> Result<i64> {
        self.read_signed(64)
    }

    /// Signed 33-bit immediate used by block types.
    pub fn read_var_s33(&mut self) -> Result<i64> {
        self.read_signed(33)
    }

    /// Length-prefixed UTF-8 name.
    pub fn read_name(&mut self) -> Result<String> {
        let start = self.pos;
        let bytes = self.read_len_prefixed()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| BinaryReadError::InvalidUtf8 { offset: start })
    }

    pub fn read_len_prefixed(&mut self) -> Result<&'a [u8]> {
        let len = self.read_var_u32()? as usize;
        self.read_bytes(len)
    }

    /// `vec(T)`: a u32 count followed by that many items.
    pub fn read_vec<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let count = self.read_var_u32()? as usize;
        // Each item takes at least one byte; cap the reservation accordingly.
        let mut out = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            out.push(item(self)?);
        }
        Ok(out)
    }

    fn read_unsigned(&mut self, bits: u32) -> Result<u64> {
        let start = self.pos;
        let max_bytes = (bits + 6) / 7;
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..max_bytes {
            let byte = self.read_u8()?;
            let payload = u64::from(byte & 0x7f);
            if i == max_bytes - 1 {
                let room = bits - shift;
                if room < 7 && payload >> room != 0 {
                    return Err(BinaryReadError::Leb128Overflow { target_bits: bits as u8, offset: start });
                }
            }
            result |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(BinaryReadError::Leb128TooManyBytes { limit: max_bytes as u8, offset: start })
    }

    fn read_signed(&mut self, bits: u32) -> Result<i64> {
        let start = self.pos;
        let max_bytes = (bits + 6) / 7;
        let mut result = 0i64;
        let mut shift = 0u32;
        for i in 0..max_bytes {
            let byte = self.read_u8()?;
            let payload = i64::from(byte & 0x7f);
            if i == max_bytes - 1 {
                let room = bits - shift;
                if room < 7 {
                    // Unused high bits must replicate the sign bit.
                    let sign = (payload >> (room - 1)) & 1;
                    let expected = if sign == 1 { (1i64 << (7 - room)) - 1 } else { 0 };
                    if payload >> room != expected || byte & 0x80 != 0 {
                        return Err(BinaryReadError::Leb128Overflow { target_bits: bits as u8, offset: start });
                    }
                }
            }
            result |= payload << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && payload & 0x40 != 0 {
                    result |= -1i64 << shift;
                }
                return Ok(result);
            }
        }
        Err(BinaryReadError::Leb128TooManyBytes { limit: max_bytes as u8, offset: start })
    }
}
