use crate::error::{LinkError, TrapKind};
use crate::types::{ExternKind, Limits, MemoryType};

macro_rules! impl_load_store {
    ($type:ty, $size:literal, $load_name:ident, $store_name:ident) => {
        #[inline(always)]
        pub fn $load_name(&self, ptr: u32, offset: u32) -> Result<$type, TrapKind> {
            let start = self.effective(ptr, offset, $size)?;
            let mut buf = [0u8; $size];
            buf.copy_from_slice(&self.data[start..start + $size]);
            Ok(<$type>::from_le_bytes(buf))
        }
        #[inline(always)]
        pub fn $store_name(&mut self, ptr: u32, offset: u32, v: $type) -> Result<(), TrapKind> {
            let start = self.effective(ptr, offset, $size)?;
            self.data[start..start + $size].copy_from_slice(&v.to_le_bytes());
            Ok(())
        }
    };
}

macro_rules! impl_signed_load {
    ($name:ident, $target:ty, $source:ident) => {
        #[inline(always)]
        pub fn $name(&self, ptr: u32, offset: u32) -> Result<$target, TrapKind> {
            Ok(self.$source(ptr, offset)? as $target)
        }
    };
}

/// Linear memory: a little-endian byte array sized in 64KiB pages.
#[derive(Debug, Clone)]
pub struct MemoryInst {
    data: Vec<u8>,
    current: u32,
    /// Declared maximum, reported to importers.
    declared_max: Option<u32>,
    /// Effective growth ceiling: declared maximum, architectural limit and
    /// configured limit combined.
    ceiling: u32,
}

impl MemoryInst {
    pub const MAX_PAGES: u32 = 65536;
    pub const PAGE_SIZE: u32 = 65536;

    /// Allocates the declared minimum, which must fit under `page_limit`;
    /// `page_limit` also caps growth.
    pub fn new(ty: MemoryType, page_limit: u32) -> Result<Self, LinkError> {
        let initial = ty.limits.min;
        if initial > page_limit {
            return Err(LinkError::LimitExceeded { kind: ExternKind::Memory, min: initial, limit: page_limit });
        }
        let ceiling = ty.limits.max.unwrap_or(Self::MAX_PAGES).min(Self::MAX_PAGES).min(page_limit).max(initial);
        let oom = LinkError::OutOfMemory { kind: ExternKind::Memory, min: initial };
        let len = Self::byte_len(initial).ok_or_else(|| oom.clone())?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| oom)?;
        data.resize(len, 0);
        Ok(Self { data, current: initial, declared_max: ty.limits.max, ceiling })
    }

    fn byte_len(pages: u32) -> Option<usize> {
        (pages as usize).checked_mul(Self::PAGE_SIZE as usize)
    }

    pub fn size(&self) -> u32 { self.current }
    pub fn len(&self) -> usize { self.data.len() }
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// Current type, as seen by an importing module.
    pub fn ty(&self) -> MemoryType {
        MemoryType { limits: Limits { min: self.current, max: self.declared_max } }
    }

    /// Returns the previous size in pages, or `u32::MAX` when the request
    /// exceeds the ceiling or the host cannot allocate it. A zero delta
    /// succeeds without reallocating.
    pub fn grow(&mut self, delta: u32) -> u32 {
        if delta == 0 { return self.current; }
        if delta > self.ceiling.saturating_sub(self.current) { return u32::MAX; }
        let Some(len) = Self::byte_len(self.current + delta) else { return u32::MAX };
        if self.data.try_reserve_exact(len - self.data.len()).is_err() {
            return u32::MAX;
        }
        self.data.resize(len, 0);
        let old = self.current;
        self.current += delta;
        old
    }

    /// Start of a `len`-byte access at `ptr + offset`, computed without wrapping.
    #[inline(always)]
    fn effective(&self, ptr: u32, offset: u32, len: usize) -> Result<usize, TrapKind> {
        let addr = ptr as u64 + offset as u64;
        if addr + len as u64 > self.data.len() as u64 {
            return Err(TrapKind::MemoryOutOfBounds);
        }
        Ok(addr as usize)
    }

    #[inline]
    fn range(&self, start: u32, len: u32) -> Result<std::ops::Range<usize>, TrapKind> {
        let start = self.effective(start, 0, len as usize)?;
        Ok(start..start + len as usize)
    }

    impl_load_store!(u8,  1, load_u8,  store_u8);   impl_load_store!(u16, 2, load_u16, store_u16);
    impl_load_store!(u32, 4, load_u32, store_u32);  impl_load_store!(u64, 8, load_u64, store_u64);
    impl_signed_load!(load_i8,  i8,  load_u8);      impl_signed_load!(load_i16, i16, load_u16);
    impl_signed_load!(load_i32, i32, load_u32);     impl_signed_load!(load_i64, i64, load_u64);

    pub fn read(&self, offset: u32, len: u32) -> Result<&[u8], TrapKind> {
        let range = self.range(offset, len)?;
        Ok(&self.data[range])
    }

    pub fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), TrapKind> {
        let len = u32::try_from(bytes.len()).map_err(|_| TrapKind::MemoryOutOfBounds)?;
        let range = self.range(offset, len)?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn fill(&mut self, offset: u32, value: u8, len: u32) -> Result<(), TrapKind> {
        let range = self.range(offset, len)?;
        self.data[range].fill(value);
        Ok(())
    }

    /// Overlapping ranges copy as if through a temporary buffer.
    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), TrapKind> {
        let src = self.range(src, len)?;
        let dst = self.range(dst, len)?;
        self.data.copy_within(src, dst.start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(min: u32, max: Option<u32>) -> MemoryInst {
        MemoryInst::new(MemoryType { limits: Limits { min, max } }, MemoryInst::MAX_PAGES).unwrap()
    }

    #[test]
    fn last_byte_is_addressable() {
        let mut mem = memory(1, None);
        let last = MemoryInst::PAGE_SIZE - 1;
        mem.store_u8(last, 0, 0xab).unwrap();
        assert_eq!(mem.load_u8(last, 0).unwrap(), 0xab);
        assert_eq!(mem.load_u8(last + 1, 0), Err(TrapKind::MemoryOutOfBounds));
        assert_eq!(mem.load_u32(last - 2, 0), Err(TrapKind::MemoryOutOfBounds));
    }

    #[test]
    fn offset_does_not_wrap() {
        let mem = memory(1, None);
        assert_eq!(mem.load_u8(u32::MAX, 1), Err(TrapKind::MemoryOutOfBounds));
        assert_eq!(mem.load_u8(1, u32::MAX), Err(TrapKind::MemoryOutOfBounds));
    }

    #[test]
    fn little_endian_layout() {
        let mut mem = memory(1, None);
        mem.store_u32(0, 4, 0x0403_0201).unwrap();
        assert_eq!(mem.read(4, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(mem.load_i16(6, 0).unwrap(), 0x0403);
        mem.store_u8(8, 0, 0xff).unwrap();
        assert_eq!(mem.load_i8(8, 0).unwrap(), -1);
    }

    #[test]
    fn grow_respects_maximum() {
        let mut mem = memory(1, Some(2));
        assert_eq!(mem.grow(0), 1);
        assert_eq!(mem.grow(1), 1);
        assert_eq!(mem.size(), 2);
        assert_eq!(mem.grow(1), u32::MAX);
        assert_eq!(mem.size(), 2);
        assert_eq!(mem.len(), 2 * MemoryInst::PAGE_SIZE as usize);
    }

    #[test]
    fn grow_respects_configured_limit() {
        let mut mem = MemoryInst::new(MemoryType { limits: Limits { min: 1, max: None } }, 3).unwrap();
        assert_eq!(mem.grow(3), u32::MAX);
        assert_eq!(mem.grow(2), 1);
        assert_eq!(mem.ty().limits, Limits { min: 3, max: None });
    }

    #[test]
    fn bulk_operations() {
        let mut mem = memory(1, None);
        mem.write(0, &[1, 2, 3, 4, 5]).unwrap();
        mem.copy_within(2, 0, 3).unwrap();
        assert_eq!(mem.read(0, 5).unwrap(), &[1, 2, 1, 2, 3]);
        mem.fill(1, 9, 2).unwrap();
        assert_eq!(mem.read(0, 5).unwrap(), &[1, 9, 9, 2, 3]);
        assert_eq!(mem.fill(MemoryInst::PAGE_SIZE, 0, 1), Err(TrapKind::MemoryOutOfBounds));
        // Zero-length accesses at the end are in bounds.
        assert!(mem.fill(MemoryInst::PAGE_SIZE, 0, 0).is_ok());
        assert_eq!(mem.copy_within(0, MemoryInst::PAGE_SIZE - 1, 2), Err(TrapKind::MemoryOutOfBounds));
    }

    #[test]
    fn minimum_above_configured_limit_is_rejected() {
        let err = MemoryInst::new(MemoryType { limits: Limits { min: 65536, max: None } }, 16).unwrap_err();
        assert_eq!(err, LinkError::LimitExceeded { kind: ExternKind::Memory, min: 65536, limit: 16 });
        assert!(MemoryInst::new(MemoryType { limits: Limits { min: 16, max: None } }, 16).is_ok());
    }
}
