use tracing::debug;

use crate::byte_iter::ByteIter;
use crate::error::*;
use crate::instruction::{Instruction, MemArg};
use crate::module::*;
use crate::types::*;

pub const MAGIC_HEADER: &[u8; 4] = b"\0asm";
pub const VERSION: u32 = 1;

/// Canonical position of each known section id; custom sections (0) may appear anywhere.
fn section_rank(id: u8) -> Option<u8> {
    match id {
        1..=9 => Some(id),
        12 => Some(10),
        10 => Some(11),
        11 => Some(12),
        _ => None,
    }
}

/// Decodes a binary module. Only the binary grammar is checked here; index
/// bounds and typing are left to the validator.
pub fn decode(bytes: &[u8]) -> Result<Module, DecodeError> {
    let mut decoder = Decoder { module: Module::default(), uses_data_index: false };
    decoder.initialize(bytes)?;
    Ok(decoder.module)
}

struct Decoder {
    module: Module,
    uses_data_index: bool,
}

impl Decoder {
    fn initialize(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        // Check magic number and version
        if bytes.len() < 4 || &bytes[0..4] != MAGIC_HEADER {
            return malformed(0, NO_MAGIC_HEADER);
        }
        if bytes.len() < 8 { return malformed(bytes.len(), UNEXPECTED_END); }
        if u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) != VERSION {
            return malformed(4, UNKNOWN_BINARY_VERSION);
        }

        let mut it = ByteIter::new(bytes, 8);
        let mut last_rank = 0u8;
        while !it.empty() {
            let id_at = it.cur();
            let id = it.read_u8()?;
            let section_length = it.read_u32()? as usize;
            let section_start = it.cur();
            if !it.has_n_left(section_length) {
                return malformed(section_start, LENGTH_OUT_OF_BOUNDS);
            }
            let section_end = section_start + section_length;
            let mut sub = it.limit(section_end);

            if id == 0 {
                self.parse_custom_section(&mut sub, section_end)?;
            } else {
                let rank = section_rank(id).ok_or(DecodeError::new(id_at, INVALID_SECTION_ID))?;
                if rank == last_rank { return malformed(id_at, DUPLICATE_SECTION); }
                if rank < last_rank { return malformed(id_at, SECTION_OUT_OF_ORDER); }
                last_rank = rank;
                debug!(id, size = section_length, offset = section_start, "decoding section");
                match id {
                    1 => self.parse_type_section(&mut sub)?,
                    2 => self.parse_import_section(&mut sub)?,
                    3 => self.parse_function_section(&mut sub)?,
                    4 => self.parse_table_section(&mut sub)?,
                    5 => self.parse_memory_section(&mut sub)?,
                    6 => self.parse_global_section(&mut sub)?,
                    7 => self.parse_export_section(&mut sub)?,
                    8 => self.module.start = Some(sub.read_u32()?),
                    9 => self.parse_element_section(&mut sub)?,
                    12 => self.module.data_count = Some(sub.read_u32()?),
                    10 => self.parse_code_section(&mut sub)?,
                    11 => self.parse_data_section(&mut sub)?,
                    _ => return malformed(id_at, INVALID_SECTION_ID),
                }
            }
            if sub.cur() != section_end {
                return malformed(sub.cur(), SECTION_SIZE_MISMATCH);
            }
            it.idx = section_end;
        }

        if self.module.funcs.len() != self.module.code.len() {
            return malformed(bytes.len(), FUNC_CODE_INCONSISTENT);
        }
        match self.module.data_count {
            Some(n) if n as usize != self.module.data.len() => {
                return malformed(bytes.len(), DATA_COUNT_MISMATCH);
            }
            None if self.uses_data_index => return malformed(bytes.len(), DATA_COUNT_REQUIRED),
            _ => {}
        }
        debug!(
            types = self.module.types.len(),
            imports = self.module.imports.len(),
            functions = self.module.funcs.len(),
            exports = self.module.exports.len(),
            "module decoded"
        );
        Ok(())
    }

    fn parse_custom_section(&mut self, it: &mut ByteIter, end: usize) -> Result<(), DecodeError> {
        let name = it.read_name()?;
        let data = it.read_bytes(end - it.cur())?.to_vec();
        debug!(%name, size = data.len(), "custom section");
        self.module.customs.push(CustomSection { name, data });
        Ok(())
    }

    fn parse_type_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let n_types = it.read_len()?;
        self.module.types.reserve_exact(n_types as usize);
        for _ in 0..n_types {
            let at = it.cur();
            if it.read_u8()? != 0x60 {
                return malformed(at, MALFORMED_FUNC_TYPE);
            }
            let params = read_val_types(it)?;
            let results = read_val_types(it)?;
            self.module.types.push(FuncType { params, results });
        }
        Ok(())
    }

    fn parse_import_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let n_imports = it.read_len()?;
        for _ in 0..n_imports {
            let module = it.read_name()?;
            let field = it.read_name()?;
            let at = it.cur();
            let kind = ExternKind::from_byte(it.read_u8()?).ok_or(DecodeError::new(at, MALFORMED_IMPORT_KIND))?;
            let desc = match kind {
                ExternKind::Func => ImportDesc::Func(it.read_u32()?),
                ExternKind::Table => ImportDesc::Table(read_table_type(it)?),
                ExternKind::Memory => ImportDesc::Memory(MemoryType { limits: read_limits(it)? }),
                ExternKind::Global => ImportDesc::Global(read_global_type(it)?),
            };
            self.module.imports.push(Import { module, field, desc });
        }
        Ok(())
    }

    fn parse_function_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let n_functions = it.read_len()?;
        self.module.funcs.reserve(n_functions as usize);
        for _ in 0..n_functions {
            self.module.funcs.push(it.read_u32()?);
        }
        Ok(())
    }

    fn parse_table_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let n_tables = it.read_len()?;
        for _ in 0..n_tables {
            self.module.tables.push(read_table_type(it)?);
        }
        Ok(())
    }

    fn parse_memory_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let n_memories = it.read_len()?;
        for _ in 0..n_memories {
            self.module.memories.push(MemoryType { limits: read_limits(it)? });
        }
        Ok(())
    }

    fn parse_global_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let n_globals = it.read_len()?;
        for _ in 0..n_globals {
            let ty = read_global_type(it)?;
            let init = self.read_const_expr(it)?;
            self.module.globals.push(Global { ty, init });
        }
        Ok(())
    }

    fn parse_export_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let n_exports = it.read_len()?;
        for _ in 0..n_exports {
            let name = it.read_name()?;
            let at = it.cur();
            let kind = ExternKind::from_byte(it.read_u8()?).ok_or(DecodeError::new(at, MALFORMED_EXPORT_KIND))?;
            let index = it.read_u32()?;
            self.module.exports.push(Export { name, kind, index });
        }
        Ok(())
    }

    fn parse_element_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let n_segments = it.read_len()?;
        for _ in 0..n_segments {
            let at = it.cur();
            let flags = it.read_u32()?;
            if flags > 7 {
                return malformed(at, MALFORMED_SEGMENT_FLAGS);
            }
            let passive_or_declarative = flags & 0b001 != 0;
            let explicit_table = flags & 0b010 != 0;
            let uses_exprs = flags & 0b100 != 0;

            let mode = if passive_or_declarative {
                if explicit_table { ElementMode::Declarative } else { ElementMode::Passive }
            } else {
                let table = if explicit_table { it.read_u32()? } else { 0 };
                let offset = self.read_const_expr(it)?;
                ElementMode::Active { table, offset }
            };
            // Flags 0 and 4 leave the element kind implicit.
            let has_kind = passive_or_declarative || explicit_table;

            let (ty, items) = if uses_exprs {
                let ty = if has_kind { read_ref_type(it)? } else { RefType::FuncRef };
                let n = it.read_len()?;
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    items.push(self.read_const_expr(it)?);
                }
                (ty, items)
            } else {
                if has_kind {
                    let at = it.cur();
                    if it.read_u8()? != 0x00 {
                        return malformed(at, MALFORMED_ELEM_KIND);
                    }
                }
                let n = it.read_len()?;
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    let func = it.read_u32()?;
                    items.push(ConstExpr(vec![Instruction::RefFunc(func), Instruction::End]));
                }
                (RefType::FuncRef, items)
            };
            self.module.elements.push(ElementSegment { ty, items, mode });
        }
        Ok(())
    }

    fn parse_code_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let at = it.cur();
        let n_functions = it.read_len()?;
        if n_functions as usize != self.module.funcs.len() {
            return malformed(at, FUNC_CODE_INCONSISTENT);
        }
        self.module.code.reserve_exact(n_functions as usize);
        for _ in 0..n_functions {
            let function_length = it.read_u32()? as usize;
            let func_start = it.cur();
            if !it.has_n_left(function_length) {
                return malformed(func_start, UNEXPECTED_END);
            }
            let func_end = func_start + function_length;
            let mut body = it.limit(func_end);

            // Parse local declarations
            let n_local_decls = body.read_len()?;
            let mut total: u64 = 0;
            let mut decls = Vec::with_capacity(n_local_decls as usize);
            for _ in 0..n_local_decls {
                let n_locals = body.read_u32()?;
                let ty = read_val_type(&mut body)?;
                total += n_locals as u64;
                if total > Module::MAX_LOCALS {
                    return malformed(body.cur(), TOO_MANY_LOCALS);
                }
                decls.push((n_locals, ty));
            }
            let mut locals = Vec::with_capacity(total as usize);
            for (n, ty) in decls {
                locals.extend(std::iter::repeat(ty).take(n as usize));
            }

            let instructions = self.read_expr(&mut body)?;
            if body.cur() != func_end {
                return malformed(body.cur(), SECTION_SIZE_MISMATCH);
            }
            self.module.code.push(FunctionBody { locals, body: instructions });
            it.idx = func_end;
        }
        Ok(())
    }

    fn parse_data_section(&mut self, it: &mut ByteIter) -> Result<(), DecodeError> {
        let n_data_segments = it.read_len()?;
        for _ in 0..n_data_segments {
            let at = it.cur();
            let mode = match it.read_u32()? {
                0 => DataMode::Active { memory: 0, offset: self.read_const_expr(it)? },
                1 => DataMode::Passive,
                2 => {
                    let memory = it.read_u32()?;
                    DataMode::Active { memory, offset: self.read_const_expr(it)? }
                }
                _ => return malformed(at, MALFORMED_SEGMENT_FLAGS),
            };
            let data_length = it.read_u32()? as usize;
            if !it.has_n_left(data_length) {
                return malformed(it.cur(), UNEXPECTED_END);
            }
            let init = it.read_bytes(data_length)?.to_vec();
            self.module.data.push(DataSegment { init, mode });
        }
        Ok(())
    }

    fn read_const_expr(&mut self, it: &mut ByteIter) -> Result<ConstExpr, DecodeError> {
        Ok(ConstExpr(self.read_expr(it)?))
    }

    /// Reads instructions up to and including the `end` that closes the
    /// expression, resolving each structured instruction's `else`/`end` position.
    fn read_expr(&mut self, it: &mut ByteIter) -> Result<Vec<Instruction>, DecodeError> {
        let mut out: Vec<Instruction> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        loop {
            if it.empty() {
                return malformed(it.cur(), END_EXPECTED);
            }
            let at = it.cur();
            let ins = read_instruction(it)?;
            let pos = out.len();
            match ins {
                Instruction::Block { .. } | Instruction::Loop { .. } | Instruction::If { .. } => {
                    open.push(pos);
                    out.push(ins);
                }
                Instruction::Else { .. } => {
                    let Some(&opener) = open.last() else { return malformed(at, UNEXPECTED_ELSE) };
                    match &mut out[opener] {
                        Instruction::If { else_pos: else_pos @ None, .. } => *else_pos = Some(pos as u32),
                        _ => return malformed(at, UNEXPECTED_ELSE),
                    }
                    out.push(ins);
                }
                Instruction::End => {
                    out.push(Instruction::End);
                    let Some(opener) = open.pop() else { return Ok(out) };
                    let mut else_to_patch = None;
                    match &mut out[opener] {
                        Instruction::Block { end, .. } => *end = pos as u32,
                        Instruction::If { end, else_pos, .. } => {
                            *end = pos as u32;
                            else_to_patch = *else_pos;
                        }
                        _ => {}
                    }
                    if let Some(e) = else_to_patch {
                        if let Instruction::Else { end } = &mut out[e as usize] {
                            *end = pos as u32;
                        }
                    }
                }
                Instruction::MemoryInit(_) | Instruction::DataDrop(_) => {
                    self.uses_data_index = true;
                    out.push(ins);
                }
                _ => out.push(ins),
            }
        }
    }
}

// ---------------- Helper Functions ----------------
fn read_val_type(it: &mut ByteIter) -> Result<ValType, DecodeError> {
    let at = it.cur();
    ValType::from_byte(it.read_u8()?).ok_or(DecodeError::new(at, INVALID_VALUE_TYPE))
}

fn read_val_types(it: &mut ByteIter) -> Result<Vec<ValType>, DecodeError> {
    let n = it.read_len()?;
    (0..n).map(|_| read_val_type(it)).collect()
}

fn read_ref_type(it: &mut ByteIter) -> Result<RefType, DecodeError> {
    let at = it.cur();
    RefType::from_byte(it.read_u8()?).ok_or(DecodeError::new(at, MALFORMED_REF_TYPE))
}

fn read_limits(it: &mut ByteIter) -> Result<Limits, DecodeError> {
    let at = it.cur();
    let flags = it.read_u8()?;
    let min = it.read_u32()?;
    let max = match flags {
        0 => None,
        1 => Some(it.read_u32()?),
        _ => return malformed(at, MALFORMED_LIMITS_FLAGS),
    };
    Ok(Limits { min, max })
}

fn read_table_type(it: &mut ByteIter) -> Result<TableType, DecodeError> {
    let elem = read_ref_type(it)?;
    Ok(TableType { elem, limits: read_limits(it)? })
}

fn read_global_type(it: &mut ByteIter) -> Result<GlobalType, DecodeError> {
    let ty = read_val_type(it)?;
    let at = it.cur();
    let mutable = match it.read_u8()? {
        0 => false,
        1 => true,
        _ => return malformed(at, INVALID_MUTABILITY),
    };
    Ok(GlobalType { ty, mutable })
}

fn read_block_type(it: &mut ByteIter) -> Result<BlockType, DecodeError> {
    const EMPTY_TYPE: u8 = 0x40;
    let byte = it.peek_u8()?;
    if byte == EMPTY_TYPE {
        it.advance(1);
        return Ok(BlockType::Empty);
    }
    if let Some(vt) = ValType::from_byte(byte) {
        it.advance(1);
        return Ok(BlockType::Value(vt));
    }
    let at = it.cur();
    let n = it.read_s33()?;
    if n < 0 {
        return malformed(at, INVALID_VALUE_TYPE);
    }
    Ok(BlockType::Func(n as u32))
}

fn read_memarg(it: &mut ByteIter) -> Result<MemArg, DecodeError> {
    let align = it.read_u32()?;
    let offset = it.read_u32()?;
    Ok(MemArg { align, offset })
}

fn read_zero(it: &mut ByteIter) -> Result<(), DecodeError> {
    let at = it.cur();
    if it.read_u8()? != 0 {
        return malformed(at, ZERO_FLAG_EXPECTED);
    }
    Ok(())
}

fn read_instruction(it: &mut ByteIter) -> Result<Instruction, DecodeError> {
    use Instruction::*;
    let at = it.cur();
    let op = it.read_u8()?;
    let ins = match op {
        0x00 => Unreachable,
        0x01 => Nop,
        0x02 => Block { ty: read_block_type(it)?, end: 0 },
        0x03 => Loop { ty: read_block_type(it)? },
        0x04 => If { ty: read_block_type(it)?, else_pos: None, end: 0 },
        0x05 => Else { end: 0 },
        0x0b => End,
        0x0c => Br(it.read_u32()?),
        0x0d => BrIf(it.read_u32()?),
        0x0e => {
            let n_targets = it.read_len()?;
            let targets = (0..n_targets).map(|_| it.read_u32()).collect::<Result<Vec<_>, _>>()?;
            BrTable { targets: targets.into_boxed_slice(), default: it.read_u32()? }
        }
        0x0f => Return,
        0x10 => Call(it.read_u32()?),
        0x11 => {
            let type_idx = it.read_u32()?;
            CallIndirect { type_idx, table: it.read_u32()? }
        }
        0x1a => Drop,
        0x1b => Select(None),
        0x1c => {
            let tys = read_val_types(it)?;
            if tys.len() != 1 {
                return malformed(at, INVALID_RESULT_ARITY);
            }
            Select(Some(tys[0]))
        }
        0x20 => LocalGet(it.read_u32()?),
        0x21 => LocalSet(it.read_u32()?),
        0x22 => LocalTee(it.read_u32()?),
        0x23 => GlobalGet(it.read_u32()?),
        0x24 => GlobalSet(it.read_u32()?),
        0x25 => TableGet(it.read_u32()?),
        0x26 => TableSet(it.read_u32()?),
        0x28 => I32Load(read_memarg(it)?),
        0x29 => I64Load(read_memarg(it)?),
        0x2a => F32Load(read_memarg(it)?),
        0x2b => F64Load(read_memarg(it)?),
        0x2c => I32Load8S(read_memarg(it)?),
        0x2d => I32Load8U(read_memarg(it)?),
        0x2e => I32Load16S(read_memarg(it)?),
        0x2f => I32Load16U(read_memarg(it)?),
        0x30 => I64Load8S(read_memarg(it)?),
        0x31 => I64Load8U(read_memarg(it)?),
        0x32 => I64Load16S(read_memarg(it)?),
        0x33 => I64Load16U(read_memarg(it)?),
        0x34 => I64Load32S(read_memarg(it)?),
        0x35 => I64Load32U(read_memarg(it)?),
        0x36 => I32Store(read_memarg(it)?),
        0x37 => I64Store(read_memarg(it)?),
        0x38 => F32Store(read_memarg(it)?),
        0x39 => F64Store(read_memarg(it)?),
        0x3a => I32Store8(read_memarg(it)?),
        0x3b => I32Store16(read_memarg(it)?),
        0x3c => I64Store8(read_memarg(it)?),
        0x3d => I64Store16(read_memarg(it)?),
        0x3e => I64Store32(read_memarg(it)?),
        0x3f => { read_zero(it)?; MemorySize }
        0x40 => { read_zero(it)?; MemoryGrow }
        0x41 => I32Const(it.read_i32()?),
        0x42 => I64Const(it.read_i64()?),
        0x43 => F32Const(it.read_f32_bits()?),
        0x44 => F64Const(it.read_f64_bits()?),
        0x45 => I32Eqz,
        0x46 => I32Eq,
        0x47 => I32Ne,
        0x48 => I32LtS,
        0x49 => I32LtU,
        0x4a => I32GtS,
        0x4b => I32GtU,
        0x4c => I32LeS,
        0x4d => I32LeU,
        0x4e => I32GeS,
        0x4f => I32GeU,
        0x50 => I64Eqz,
        0x51 => I64Eq,
        0x52 => I64Ne,
        0x53 => I64LtS,
        0x54 => I64LtU,
        0x55 => I64GtS,
        0x56 => I64GtU,
        0x57 => I64LeS,
        0x58 => I64LeU,
        0x59 => I64GeS,
        0x5a => I64GeU,
        0x5b => F32Eq,
        0x5c => F32Ne,
        0x5d => F32Lt,
        0x5e => F32Gt,
        0x5f => F32Le,
        0x60 => F32Ge,
        0x61 => F64Eq,
        0x62 => F64Ne,
        0x63 => F64Lt,
        0x64 => F64Gt,
        0x65 => F64Le,
        0x66 => F64Ge,
        0x67 => I32Clz,
        0x68 => I32Ctz,
        0x69 => I32Popcnt,
        0x6a => I32Add,
        0x6b => I32Sub,
        0x6c => I32Mul,
        0x6d => I32DivS,
        0x6e => I32DivU,
        0x6f => I32RemS,
        0x70 => I32RemU,
        0x71 => I32And,
        0x72 => I32Or,
        0x73 => I32Xor,
        0x74 => I32Shl,
        0x75 => I32ShrS,
        0x76 => I32ShrU,
        0x77 => I32Rotl,
        0x78 => I32Rotr,
        0x79 => I64Clz,
        0x7a => I64Ctz,
        0x7b => I64Popcnt,
        0x7c => I64Add,
        0x7d => I64Sub,
        0x7e => I64Mul,
        0x7f => I64DivS,
        0x80 => I64DivU,
        0x81 => I64RemS,
        0x82 => I64RemU,
        0x83 => I64And,
        0x84 => I64Or,
        0x85 => I64Xor,
        0x86 => I64Shl,
        0x87 => I64ShrS,
        0x88 => I64ShrU,
        0x89 => I64Rotl,
        0x8a => I64Rotr,
        0x8b => F32Abs,
        0x8c => F32Neg,
        0x8d => F32Ceil,
        0x8e => F32Floor,
        0x8f => F32Trunc,
        0x90 => F32Nearest,
        0x91 => F32Sqrt,
        0x92 => F32Add,
        0x93 => F32Sub,
        0x94 => F32Mul,
        0x95 => F32Div,
        0x96 => F32Min,
        0x97 => F32Max,
        0x98 => F32Copysign,
        0x99 => F64Abs,
        0x9a => F64Neg,
        0x9b => F64Ceil,
        0x9c => F64Floor,
        0x9d => F64Trunc,
        0x9e => F64Nearest,
        0x9f => F64Sqrt,
        0xa0 => F64Add,
        0xa1 => F64Sub,
        0xa2 => F64Mul,
        0xa3 => F64Div,
        0xa4 => F64Min,
        0xa5 => F64Max,
        0xa6 => F64Copysign,
        0xa7 => I32WrapI64,
        0xa8 => I32TruncF32S,
        0xa9 => I32TruncF32U,
        0xaa => I32TruncF64S,
        0xab => I32TruncF64U,
        0xac => I64ExtendI32S,
        0xad => I64ExtendI32U,
        0xae => I64TruncF32S,
        0xaf => I64TruncF32U,
        0xb0 => I64TruncF64S,
        0xb1 => I64TruncF64U,
        0xb2 => F32ConvertI32S,
        0xb3 => F32ConvertI32U,
        0xb4 => F32ConvertI64S,
        0xb5 => F32ConvertI64U,
        0xb6 => F32DemoteF64,
        0xb7 => F64ConvertI32S,
        0xb8 => F64ConvertI32U,
        0xb9 => F64ConvertI64S,
        0xba => F64ConvertI64U,
        0xbb => F64PromoteF32,
        0xbc => I32ReinterpretF32,
        0xbd => I64ReinterpretF64,
        0xbe => F32ReinterpretI32,
        0xbf => F64ReinterpretI64,
        0xc0 => I32Extend8S,
        0xc1 => I32Extend16S,
        0xc2 => I64Extend8S,
        0xc3 => I64Extend16S,
        0xc4 => I64Extend32S,
        0xd0 => RefNull(read_ref_type(it)?),
        0xd1 => RefIsNull,
        0xd2 => RefFunc(it.read_u32()?),
        0xfc => match it.read_u32()? {
            0 => I32TruncSatF32S,
            1 => I32TruncSatF32U,
            2 => I32TruncSatF64S,
            3 => I32TruncSatF64U,
            4 => I64TruncSatF32S,
            5 => I64TruncSatF32U,
            6 => I64TruncSatF64S,
            7 => I64TruncSatF64U,
            8 => {
                let data = it.read_u32()?;
                read_zero(it)?;
                MemoryInit(data)
            }
            9 => DataDrop(it.read_u32()?),
            10 => {
                read_zero(it)?;
                read_zero(it)?;
                MemoryCopy
            }
            11 => { read_zero(it)?; MemoryFill }
            12 => {
                let elem = it.read_u32()?;
                TableInit { elem, table: it.read_u32()? }
            }
            13 => ElemDrop(it.read_u32()?),
            14 => {
                let dst = it.read_u32()?;
                TableCopy { dst, src: it.read_u32()? }
            }
            15 => TableGrow(it.read_u32()?),
            16 => TableSize(it.read_u32()?),
            17 => TableFill(it.read_u32()?),
            _ => return malformed(at, ILLEGAL_OP),
        },
        _ => return malformed(at, ILLEGAL_OP),
    };
    Ok(ins)
}
