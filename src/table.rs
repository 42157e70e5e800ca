use crate::error::{LinkError, TrapKind};
use crate::types::{ExternKind, Limits, RefType, TableType};
use crate::value::WasmValue;

/// Table of references, stored in the operand-stack encoding (0 is null).
#[derive(Debug, Clone)]
pub struct TableInst {
    elements: Vec<WasmValue>,
    elem_ty: RefType,
    declared_max: Option<u32>,
    ceiling: u32,
}

impl TableInst {
    /// Allocates the declared minimum, which must fit under `element_limit`;
    /// `element_limit` also caps growth.
    pub fn new(ty: TableType, init: WasmValue, element_limit: u32) -> Result<Self, LinkError> {
        let initial = ty.limits.min;
        if initial > element_limit {
            return Err(LinkError::LimitExceeded { kind: ExternKind::Table, min: initial, limit: element_limit });
        }
        let ceiling = ty.limits.max.unwrap_or(u32::MAX).min(element_limit).max(initial);
        let mut elements = Vec::new();
        elements
            .try_reserve_exact(initial as usize)
            .map_err(|_| LinkError::OutOfMemory { kind: ExternKind::Table, min: initial })?;
        elements.resize(initial as usize, init);
        Ok(Self { elements, elem_ty: ty.elem, declared_max: ty.limits.max, ceiling })
    }

    pub fn size(&self) -> u32 { self.elements.len() as u32 }

    pub fn ty(&self) -> TableType {
        TableType { elem: self.elem_ty, limits: Limits { min: self.size(), max: self.declared_max } }
    }

    /// Returns the previous size, or `u32::MAX` when the request exceeds the
    /// ceiling or the host cannot allocate it.
    pub fn grow(&mut self, delta: u32, init: WasmValue) -> u32 {
        let old = self.size();
        if delta == 0 { return old; }
        if delta > self.ceiling.saturating_sub(old) { return u32::MAX; }
        if self.elements.try_reserve_exact(delta as usize).is_err() {
            return u32::MAX;
        }
        self.elements.resize((old + delta) as usize, init);
        old
    }

    #[inline]
    fn range(&self, start: u32, len: u32) -> Result<std::ops::Range<usize>, TrapKind> {
        let end = start as u64 + len as u64;
        if end > self.elements.len() as u64 {
            return Err(TrapKind::TableOutOfBounds);
        }
        Ok(start as usize..end as usize)
    }

    pub fn get(&self, idx: u32) -> Result<WasmValue, TrapKind> {
        self.elements.get(idx as usize).copied().ok_or(TrapKind::TableOutOfBounds)
    }

    pub fn set(&mut self, idx: u32, value: WasmValue) -> Result<(), TrapKind> {
        let slot = self.elements.get_mut(idx as usize).ok_or(TrapKind::TableOutOfBounds)?;
        *slot = value;
        Ok(())
    }

    pub fn read(&self, start: u32, len: u32) -> Result<&[WasmValue], TrapKind> {
        let range = self.range(start, len)?;
        Ok(&self.elements[range])
    }

    pub fn write(&mut self, start: u32, values: &[WasmValue]) -> Result<(), TrapKind> {
        let len = u32::try_from(values.len()).map_err(|_| TrapKind::TableOutOfBounds)?;
        let range = self.range(start, len)?;
        self.elements[range].copy_from_slice(values);
        Ok(())
    }

    pub fn fill(&mut self, start: u32, value: WasmValue, len: u32) -> Result<(), TrapKind> {
        let range = self.range(start, len)?;
        self.elements[range].fill(value);
        Ok(())
    }

    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> Result<(), TrapKind> {
        let src = self.range(src, len)?;
        let dst = self.range(dst, len)?;
        self.elements.copy_within(src, dst.start);
        Ok(())
    }
}
