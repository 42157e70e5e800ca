use crate::error::*;

/// Reads an unsigned LEB128 value of at most `bits` significant bits.
#[inline]
pub fn read_unsigned(bytes: &[u8], pc: &mut usize, bits: u32) -> Result<u64, DecodeError> {
    let max_bytes = bits.div_ceil(7) as usize;
    let mut result: u64 = 0;
    let mut end = *pc;
    for i in 0..max_bytes {
        let Some(&byte) = bytes.get(end) else { return malformed(end, UNEXPECTED_END) };
        end += 1;
        let payload = (byte & 0x7f) as u64;
        if i == max_bytes - 1 {
            if byte & 0x80 != 0 { return malformed(end - 1, INT_TOO_LONG); }
            let remaining = bits - 7 * i as u32;
            if remaining < 7 && payload >> remaining != 0 { return malformed(end - 1, INT_TOO_LARGE); }
        }
        result |= payload << (7 * i);
        if byte & 0x80 == 0 { break; }
    }
    *pc = end;
    Ok(result)
}

/// Reads a signed LEB128 value of at most `bits` significant bits (33 for block types).
#[inline]
pub fn read_signed(bytes: &[u8], pc: &mut usize, bits: u32) -> Result<i64, DecodeError> {
    let max_bytes = bits.div_ceil(7) as usize;
    let mut result: i64 = 0;
    let mut shift: u32 = 0;
    let mut end = *pc;
    let mut byte: u8 = 0;
    for i in 0..max_bytes {
        let Some(&b) = bytes.get(end) else { return malformed(end, UNEXPECTED_END) };
        byte = b;
        end += 1;
        let payload = byte & 0x7f;
        if i == max_bytes - 1 {
            if byte & 0x80 != 0 { return malformed(end - 1, INT_TOO_LONG); }
            // Bits beyond the target width must replicate the sign bit.
            let remaining = bits - 7 * i as u32;
            let unused = payload >> (remaining - 1);
            if unused != 0 && unused != (0x7f >> (remaining - 1)) {
                return malformed(end - 1, INT_TOO_LARGE);
            }
        }
        result |= (payload as i64) << shift;
        shift += 7;
        if byte & 0x80 == 0 { break; }
    }
    if shift < 64 && byte & 0x40 != 0 {
        result |= !0i64 << shift;
    }
    *pc = end;
    Ok(result)
}

#[inline]
pub fn read_u32(bytes: &[u8], pc: &mut usize) -> Result<u32, DecodeError> {
    Ok(read_unsigned(bytes, pc, 32)? as u32)
}

#[inline]
pub fn read_i32(bytes: &[u8], pc: &mut usize) -> Result<i32, DecodeError> {
    Ok(read_signed(bytes, pc, 32)? as i32)
}

#[inline]
pub fn read_i64(bytes: &[u8], pc: &mut usize) -> Result<i64, DecodeError> {
    read_signed(bytes, pc, 64)
}
