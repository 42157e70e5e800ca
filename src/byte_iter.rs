use crate::error::*;
use crate::leb128;

#[derive(Clone, Copy)]
pub struct ByteIter<'a> {
    pub bytes: &'a [u8],
    pub idx: usize,
}

impl<'a> ByteIter<'a> {
    #[inline]
    pub fn new(bytes: &'a [u8], idx: usize) -> Self { Self { bytes, idx } }
    #[inline]
    pub fn empty(&self) -> bool { self.idx >= self.bytes.len() }
    #[inline]
    pub fn has_n_left(&self, n: usize) -> bool { self.idx.saturating_add(n) <= self.bytes.len() }
    #[inline]
    pub fn cur(&self) -> usize { self.idx }
    #[inline]
    pub fn advance(&mut self, n: usize) { self.idx += n; }

    /// Restricts the iterator to the first `end` bytes of its input.
    #[inline]
    pub fn limit(&self, end: usize) -> ByteIter<'a> {
        ByteIter { bytes: &self.bytes[..end.min(self.bytes.len())], idx: self.idx }
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let Some(&b) = self.bytes.get(self.idx) else { return malformed(self.idx, UNEXPECTED_END) };
        self.idx += 1;
        Ok(b)
    }
    #[inline]
    pub fn peek_u8(&self) -> Result<u8, DecodeError> {
        self.bytes.get(self.idx).copied().ok_or(DecodeError::new(self.idx, UNEXPECTED_END))
    }
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> { leb128::read_u32(self.bytes, &mut self.idx) }
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> { leb128::read_i32(self.bytes, &mut self.idx) }
    #[inline]
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> { leb128::read_i64(self.bytes, &mut self.idx) }
    #[inline]
    pub fn read_s33(&mut self) -> Result<i64, DecodeError> { leb128::read_signed(self.bytes, &mut self.idx, 33) }

    #[inline]
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if !self.has_n_left(n) { return malformed(self.idx, UNEXPECTED_END_SHORT); }
        let out = &self.bytes[self.idx..self.idx + n];
        self.idx += n;
        Ok(out)
    }
    #[inline]
    pub fn read_f32_bits(&mut self) -> Result<u32, DecodeError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
    #[inline]
    pub fn read_f64_bits(&mut self) -> Result<u64, DecodeError> {
        let b = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    /// Length-prefixed UTF-8 name.
    pub fn read_name(&mut self) -> Result<String, DecodeError> {
        let len = self.read_u32()? as usize;
        let start = self.idx;
        if !self.has_n_left(len) { return malformed(start, LENGTH_OUT_OF_BOUNDS); }
        let raw = self.read_bytes(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::new(start, INVALID_UTF8))
    }

    /// Vector length prefix. Every vector element occupies at least one byte, so a
    /// count larger than the remaining input is rejected before anything is reserved.
    #[inline]
    pub fn read_len(&mut self) -> Result<u32, DecodeError> {
        let n = self.read_u32()?;
        if !self.has_n_left(n as usize) {
            return malformed(self.idx, UNEXPECTED_END);
        }
        Ok(n)
    }
}
