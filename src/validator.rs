use std::ops::Deref;
use std::sync::Arc;

use nohash_hasher::IntSet;
use tracing::{debug, trace};

use crate::config::Features;
use crate::error::*;
use crate::instruction::{Instruction, MemArg};
use crate::module::*;
use crate::types::*;

use ValType::{FuncRef, F32, F64, I32, I64};

/// A module that passed validation. Only this type can be instantiated.
#[derive(Debug, Clone)]
pub struct ValidModule {
    module: Arc<Module>,
}

impl ValidModule {
    pub fn module(&self) -> &Module { &self.module }
    pub(crate) fn shared(&self) -> Arc<Module> { self.module.clone() }
}

impl Deref for ValidModule {
    type Target = Module;
    fn deref(&self) -> &Module { &self.module }
}

pub fn validate(module: Module, features: &Features) -> Result<ValidModule, ValidationError> {
    Validator::new(features).validate(module)
}

// ---------------- Control Flow Structures ----------------
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlType {
    Function,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Clone, Debug)]
pub struct ControlFrame {
    pub control_type: ControlType,
    pub start_types: Vec<ValType>,
    pub end_types: Vec<ValType>,
    /// Operand stack height when the frame was entered.
    pub height: usize,
    pub unreachable: bool,
}

impl ControlFrame {
    /// Types a branch to this frame must supply.
    fn label_types(&self) -> &[ValType] {
        if self.control_type == ControlType::Loop { &self.start_types } else { &self.end_types }
    }
}

// ---------------- ValidatorStack for Type Checking ----------------
/// Operand types plus the control stack. `None` is an operand of unknown type,
/// produced by popping past the base of an unreachable frame.
#[derive(Default)]
pub struct ValidatorStack {
    vals: Vec<Option<ValType>>,
    ctrls: Vec<ControlFrame>,
}

impl ValidatorStack {
    fn push(&mut self, ty: ValType) { self.vals.push(Some(ty)); }
    fn push_slice(&mut self, tys: &[ValType]) { self.vals.extend(tys.iter().copied().map(Some)); }

    fn pop(&mut self) -> Result<Option<ValType>, ValidationError> {
        let frame = self.ctrls.last().ok_or(ValidationError::mismatch(None, None))?;
        if self.vals.len() == frame.height {
            if frame.unreachable { return Ok(None); }
            return Err(ValidationError::mismatch(None, None));
        }
        Ok(self.vals.pop().flatten())
    }

    fn pop_expect(&mut self, expected: ValType) -> Result<Option<ValType>, ValidationError> {
        let frame = self.ctrls.last().ok_or(ValidationError::mismatch(Some(expected), None))?;
        if self.vals.len() == frame.height && !frame.unreachable {
            return Err(ValidationError::mismatch(Some(expected), None));
        }
        match self.pop()? {
            Some(actual) if actual != expected => Err(ValidationError::mismatch(Some(expected), Some(actual))),
            actual => Ok(actual),
        }
    }

    fn pop_slice(&mut self, expected: &[ValType]) -> Result<Vec<Option<ValType>>, ValidationError> {
        let mut popped = vec![None; expected.len()];
        for (slot, ty) in popped.iter_mut().zip(expected).rev() {
            *slot = self.pop_expect(*ty)?;
        }
        Ok(popped)
    }

    fn apply_sig(&mut self, params: &[ValType], results: &[ValType]) -> Result<(), ValidationError> {
        self.pop_slice(params)?;
        self.push_slice(results);
        Ok(())
    }

    fn enter_flow(&mut self, control_type: ControlType, sig: FuncType) -> Result<(), ValidationError> {
        self.pop_slice(&sig.params)?;
        let height = self.vals.len();
        self.push_slice(&sig.params);
        self.ctrls.push(ControlFrame {
            control_type,
            start_types: sig.params,
            end_types: sig.results,
            height,
            unreachable: false,
        });
        Ok(())
    }

    fn exit_flow(&mut self) -> Result<ControlFrame, ValidationError> {
        let Some(frame) = self.ctrls.last() else { return invalid(UNEXPECTED_END) };
        let end_types = frame.end_types.clone();
        self.pop_slice(&end_types)?;
        let frame = self.ctrls.pop().ok_or(ValidationError::new(UNEXPECTED_END))?;
        if self.vals.len() != frame.height {
            return Err(ValidationError::mismatch(None, self.vals.last().copied().flatten()));
        }
        Ok(frame)
    }

    fn polymorphize(&mut self) {
        if let Some(frame) = self.ctrls.last_mut() {
            self.vals.truncate(frame.height);
            frame.unreachable = true;
        }
    }

    fn label(&self, depth: u32) -> Result<&ControlFrame, ValidationError> {
        let len = self.ctrls.len();
        if depth as usize >= len {
            return invalid(UNKNOWN_LABEL);
        }
        Ok(&self.ctrls[len - 1 - depth as usize])
    }

    fn label_types(&self, depth: u32) -> Result<Vec<ValType>, ValidationError> {
        Ok(self.label(depth)?.label_types().to_vec())
    }
}

// ---------------- Module Validation ----------------
pub struct Validator {
    features: Features,
}

/// Index spaces of the module under validation, imports first.
struct Context<'m> {
    module: &'m Module,
    features: Features,
    funcs: Vec<u32>,
    tables: Vec<TableType>,
    mems: Vec<MemoryType>,
    globals: Vec<GlobalType>,
    n_data: u32,
    /// Functions that may appear in `ref.func` inside function bodies.
    refs: IntSet<u32>,
}

impl Validator {
    pub fn new(features: &Features) -> Self {
        Self { features: *features }
    }

    pub fn validate(&self, module: Module) -> Result<ValidModule, ValidationError> {
        {
            let mut cx = Context {
                module: &module,
                features: self.features,
                funcs: module.func_type_indices(),
                tables: module.table_types(),
                mems: module.memory_types(),
                globals: module.global_types(),
                n_data: module.data_count.unwrap_or(module.data.len() as u32),
                refs: IntSet::default(),
            };
            cx.validate_module()?;
        }
        debug!(
            functions = module.code.len(),
            imports = module.imports.len(),
            exports = module.exports.len(),
            "module validated"
        );
        Ok(ValidModule { module: Arc::new(module) })
    }
}

impl Context<'_> {
    fn validate_module(&mut self) -> Result<(), ValidationError> {
        let m = self.module;
        for ty in &m.types {
            self.check_func_type(ty)?;
        }
        for import in &m.imports {
            match &import.desc {
                ImportDesc::Func(type_idx) => { self.type_at(*type_idx)?; }
                ImportDesc::Table(t) => self.check_table_type(t)?,
                ImportDesc::Memory(mem) => self.check_memory_type(mem)?,
                ImportDesc::Global(g) => {
                    self.check_val_type(g.ty)?;
                    if g.mutable && !self.features.mutable_globals {
                        return invalid(FEATURE_DISABLED);
                    }
                }
            }
        }
        for type_idx in &m.funcs {
            self.type_at(*type_idx)?;
        }
        if self.tables.len() > 1 && !self.features.reference_types {
            return invalid(MULTIPLE_TABLES);
        }
        for t in &m.tables {
            self.check_table_type(t)?;
        }
        if self.mems.len() > 1 {
            return invalid(MULTIPLE_MEMORIES);
        }
        for mem in &m.memories {
            self.check_memory_type(mem)?;
        }

        self.collect_refs();

        for g in &m.globals {
            self.check_val_type(g.ty.ty)?;
            self.validate_const_expr(&g.init, g.ty.ty)?;
        }
        self.validate_exports()?;
        if let Some(start) = m.start {
            let ty = self.func_type(start)?;
            if !ty.params.is_empty() || !ty.results.is_empty() {
                return invalid(START_FUNC);
            }
        }
        self.validate_elements()?;
        self.validate_data()?;

        let n_imported = m.num_imported_funcs();
        for (i, body) in m.code.iter().enumerate() {
            let func_idx = n_imported + i as u32;
            let ty = self.type_at(m.funcs[i])?.clone();
            trace!(func = func_idx, instructions = body.body.len(), "validating function");
            self.validate_function(func_idx, &ty, body)?;
        }
        Ok(())
    }

    // ---------------- Lookups ----------------
    fn type_at(&self, idx: u32) -> Result<&FuncType, ValidationError> {
        self.module.types.get(idx as usize).ok_or(ValidationError::new(UNKNOWN_TYPE))
    }

    fn func_type(&self, func_idx: u32) -> Result<&FuncType, ValidationError> {
        let type_idx = *self.funcs.get(func_idx as usize).ok_or(ValidationError::new(UNKNOWN_FUNC))?;
        self.type_at(type_idx)
    }

    fn table(&self, idx: u32) -> Result<TableType, ValidationError> {
        if idx != 0 && !self.features.reference_types {
            return invalid(FEATURE_DISABLED);
        }
        self.tables.get(idx as usize).copied().ok_or(ValidationError::new(UNKNOWN_TABLE))
    }

    fn memory(&self, idx: u32) -> Result<MemoryType, ValidationError> {
        self.mems.get(idx as usize).copied().ok_or(ValidationError::new(UNKNOWN_MEMORY))
    }

    fn global(&self, idx: u32) -> Result<GlobalType, ValidationError> {
        self.globals.get(idx as usize).copied().ok_or(ValidationError::new(UNKNOWN_GLOBAL))
    }

    fn elem_type(&self, idx: u32) -> Result<RefType, ValidationError> {
        self.module.elements.get(idx as usize).map(|e| e.ty).ok_or(ValidationError::new(UNKNOWN_ELEM))
    }

    fn data(&self, idx: u32) -> Result<(), ValidationError> {
        if idx >= self.n_data {
            return invalid(UNKNOWN_DATA);
        }
        Ok(())
    }

    // ---------------- Types ----------------
    fn check_val_type(&self, ty: ValType) -> Result<(), ValidationError> {
        if ty.is_ref() && !self.features.reference_types {
            return invalid(FEATURE_DISABLED);
        }
        Ok(())
    }

    fn check_func_type(&self, ty: &FuncType) -> Result<(), ValidationError> {
        if ty.results.len() > 1 && !self.features.multi_value {
            return invalid(INVALID_RESULT_ARITY);
        }
        ty.params.iter().chain(&ty.results).try_for_each(|t| self.check_val_type(*t))
    }

    fn check_limits(limits: &Limits, bound: u64, msg: &'static str) -> Result<(), ValidationError> {
        if limits.min as u64 > bound || limits.max.is_some_and(|max| max as u64 > bound) {
            return invalid(msg);
        }
        if limits.max.is_some_and(|max| limits.min > max) {
            return invalid(MIN_GREATER_THAN_MAX);
        }
        Ok(())
    }

    fn check_table_type(&self, t: &TableType) -> Result<(), ValidationError> {
        self.check_val_type(t.elem.into())?;
        Self::check_limits(&t.limits, u32::MAX as u64, MIN_GREATER_THAN_MAX)
    }

    fn check_memory_type(&self, mem: &MemoryType) -> Result<(), ValidationError> {
        Self::check_limits(&mem.limits, Module::MAX_PAGES as u64, MEMORY_SIZE_LIMIT)
    }

    fn block_type(&self, bt: BlockType) -> Result<FuncType, ValidationError> {
        match bt {
            BlockType::Empty => Ok(FuncType::default()),
            BlockType::Value(t) => {
                self.check_val_type(t)?;
                Ok(FuncType::new(Vec::new(), [t]))
            }
            BlockType::Func(idx) => {
                if !self.features.multi_value {
                    return invalid(FEATURE_DISABLED);
                }
                self.type_at(idx).cloned()
            }
        }
    }

    // ---------------- Module-level items ----------------
    /// Every function referenced outside function bodies counts as declared.
    fn collect_refs(&mut self) {
        let m = self.module;
        let in_exprs = m
            .globals
            .iter()
            .map(|g| &g.init)
            .chain(m.elements.iter().flat_map(|e| e.items.iter()))
            .flat_map(|expr| expr.0.iter())
            .filter_map(|ins| match ins {
                Instruction::RefFunc(idx) => Some(*idx),
                _ => None,
            });
        let exported = m.exports.iter().filter(|e| e.kind == ExternKind::Func).map(|e| e.index);
        self.refs.extend(in_exprs.chain(exported));
    }

    fn validate_const_expr(&self, expr: &ConstExpr, expected: ValType) -> Result<(), ValidationError> {
        let mut stack: Vec<ValType> = Vec::with_capacity(2);
        let binop = |stack: &mut Vec<ValType>, ty: ValType| -> Result<(), ValidationError> {
            for _ in 0..2 {
                match stack.pop() {
                    Some(t) if t == ty => {}
                    actual => return Err(ValidationError::mismatch(Some(ty), actual)),
                }
            }
            stack.push(ty);
            Ok(())
        };
        for ins in &expr.0 {
            match ins {
                Instruction::I32Const(_) => stack.push(I32),
                Instruction::I64Const(_) => stack.push(I64),
                Instruction::F32Const(_) => stack.push(F32),
                Instruction::F64Const(_) => stack.push(F64),
                Instruction::RefNull(t) => {
                    self.check_val_type((*t).into())?;
                    stack.push((*t).into());
                }
                Instruction::RefFunc(idx) => {
                    self.func_type(*idx)?;
                    stack.push(FuncRef);
                }
                Instruction::GlobalGet(idx) => {
                    let g = self.global(*idx)?;
                    if g.mutable {
                        return invalid(CONST_EXP_REQUIRED);
                    }
                    stack.push(g.ty);
                }
                Instruction::I32Add | Instruction::I32Sub | Instruction::I32Mul => binop(&mut stack, I32)?,
                Instruction::I64Add | Instruction::I64Sub | Instruction::I64Mul => binop(&mut stack, I64)?,
                Instruction::End => break,
                _ => return invalid(CONST_EXP_REQUIRED),
            }
        }
        match stack.as_slice() {
            [t] if *t == expected => Ok(()),
            _ => Err(ValidationError::mismatch(Some(expected), stack.last().copied())),
        }
    }

    fn validate_exports(&self) -> Result<(), ValidationError> {
        let mut names = std::collections::HashSet::with_capacity(self.module.exports.len());
        for export in &self.module.exports {
            if !names.insert(export.name.as_str()) {
                return invalid(DUP_EXPORT_NAME);
            }
            match export.kind {
                ExternKind::Func => { self.func_type(export.index)?; }
                ExternKind::Table => { self.table(export.index)?; }
                ExternKind::Memory => { self.memory(export.index)?; }
                ExternKind::Global => {
                    if self.global(export.index)?.mutable && !self.features.mutable_globals {
                        return invalid(FEATURE_DISABLED);
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_elements(&self) -> Result<(), ValidationError> {
        for seg in &self.module.elements {
            self.check_val_type(seg.ty.into())?;
            match &seg.mode {
                ElementMode::Active { table, offset } => {
                    let t = self.table(*table)?;
                    if t.elem != seg.ty {
                        return Err(ValidationError::mismatch(Some(t.elem.into()), Some(seg.ty.into())));
                    }
                    self.validate_const_expr(offset, I32)?;
                }
                ElementMode::Passive | ElementMode::Declarative => {
                    if !self.features.bulk_memory && !self.features.reference_types {
                        return invalid(FEATURE_DISABLED);
                    }
                }
            }
            for item in &seg.items {
                self.validate_const_expr(item, seg.ty.into())?;
            }
        }
        Ok(())
    }

    fn validate_data(&self) -> Result<(), ValidationError> {
        for seg in &self.module.data {
            match &seg.mode {
                DataMode::Active { memory, offset } => {
                    self.memory(*memory)?;
                    self.validate_const_expr(offset, I32)?;
                }
                DataMode::Passive => {
                    if !self.features.bulk_memory {
                        return invalid(FEATURE_DISABLED);
                    }
                }
            }
        }
        Ok(())
    }

    // ---------------- Function Validation ----------------
    fn validate_function(&self, func_idx: u32, ty: &FuncType, body: &FunctionBody) -> Result<(), ValidationError> {
        let mut locals = Vec::with_capacity(ty.params.len() + body.locals.len());
        locals.extend_from_slice(&ty.params);
        for t in &body.locals {
            self.check_val_type(*t)?;
            locals.push(*t);
        }

        let mut vs = ValidatorStack::default();
        vs.ctrls.push(ControlFrame {
            control_type: ControlType::Function,
            start_types: Vec::new(),
            end_types: ty.results.clone(),
            height: 0,
            unreachable: false,
        });

        let mut f = FunctionValidator { cx: self, vs, locals: &locals, results: &ty.results };
        for (pc, ins) in body.body.iter().enumerate() {
            f.step(ins).map_err(|e| e.at(func_idx, pc))?;
        }
        if !f.vs.ctrls.is_empty() {
            return Err(ValidationError::new(END_EXPECTED).at(func_idx, body.body.len()));
        }
        Ok(())
    }
}

struct FunctionValidator<'a, 'm> {
    cx: &'a Context<'m>,
    vs: ValidatorStack,
    locals: &'a [ValType],
    results: &'a [ValType],
}

/// Operand and result types of the plain numeric instructions.
fn numeric_sig(ins: &Instruction) -> Option<(&'static [ValType], ValType)> {
    use Instruction::*;
    let sig: (&'static [ValType], ValType) = match ins {
        I32Eqz | I32Clz | I32Ctz | I32Popcnt | I32Extend8S | I32Extend16S => (&[I32], I32),
        I64Eqz | I32WrapI64 => (&[I64], I32),
        I32Eq | I32Ne | I32LtS | I32LtU | I32GtS | I32GtU | I32LeS | I32LeU | I32GeS | I32GeU
        | I32Add | I32Sub | I32Mul | I32DivS | I32DivU | I32RemS | I32RemU | I32And | I32Or | I32Xor
        | I32Shl | I32ShrS | I32ShrU | I32Rotl | I32Rotr => (&[I32, I32], I32),
        I64Eq | I64Ne | I64LtS | I64LtU | I64GtS | I64GtU | I64LeS | I64LeU | I64GeS | I64GeU => (&[I64, I64], I32),
        I64Clz | I64Ctz | I64Popcnt | I64Extend8S | I64Extend16S | I64Extend32S => (&[I64], I64),
        I64Add | I64Sub | I64Mul | I64DivS | I64DivU | I64RemS | I64RemU | I64And | I64Or | I64Xor
        | I64Shl | I64ShrS | I64ShrU | I64Rotl | I64Rotr => (&[I64, I64], I64),
        F32Eq | F32Ne | F32Lt | F32Gt | F32Le | F32Ge => (&[F32, F32], I32),
        F64Eq | F64Ne | F64Lt | F64Gt | F64Le | F64Ge => (&[F64, F64], I32),
        F32Abs | F32Neg | F32Ceil | F32Floor | F32Trunc | F32Nearest | F32Sqrt => (&[F32], F32),
        F32Add | F32Sub | F32Mul | F32Div | F32Min | F32Max | F32Copysign => (&[F32, F32], F32),
        F64Abs | F64Neg | F64Ceil | F64Floor | F64Trunc | F64Nearest | F64Sqrt => (&[F64], F64),
        F64Add | F64Sub | F64Mul | F64Div | F64Min | F64Max | F64Copysign => (&[F64, F64], F64),
        I32TruncF32S | I32TruncF32U | I32ReinterpretF32 | I32TruncSatF32S | I32TruncSatF32U => (&[F32], I32),
        I32TruncF64S | I32TruncF64U | I32TruncSatF64S | I32TruncSatF64U => (&[F64], I32),
        I64ExtendI32S | I64ExtendI32U => (&[I32], I64),
        I64TruncF32S | I64TruncF32U | I64TruncSatF32S | I64TruncSatF32U => (&[F32], I64),
        I64TruncF64S | I64TruncF64U | I64ReinterpretF64 | I64TruncSatF64S | I64TruncSatF64U => (&[F64], I64),
        F32ConvertI32S | F32ConvertI32U | F32ReinterpretI32 => (&[I32], F32),
        F32ConvertI64S | F32ConvertI64U => (&[I64], F32),
        F32DemoteF64 => (&[F64], F32),
        F64ConvertI32S | F64ConvertI32U => (&[I32], F64),
        F64ConvertI64S | F64ConvertI64U | F64ReinterpretI64 => (&[I64], F64),
        F64PromoteF32 => (&[F32], F64),
        _ => return None,
    };
    Some(sig)
}

/// Value type and natural access width in bytes of a load or store.
fn memory_access(ins: &Instruction) -> Option<(MemArg, ValType, u32, bool)> {
    use Instruction::*;
    Some(match *ins {
        I32Load(a) => (a, I32, 4, false),
        I64Load(a) => (a, I64, 8, false),
        F32Load(a) => (a, F32, 4, false),
        F64Load(a) => (a, F64, 8, false),
        I32Load8S(a) | I32Load8U(a) => (a, I32, 1, false),
        I32Load16S(a) | I32Load16U(a) => (a, I32, 2, false),
        I64Load8S(a) | I64Load8U(a) => (a, I64, 1, false),
        I64Load16S(a) | I64Load16U(a) => (a, I64, 2, false),
        I64Load32S(a) | I64Load32U(a) => (a, I64, 4, false),
        I32Store(a) => (a, I32, 4, true),
        I64Store(a) => (a, I64, 8, true),
        F32Store(a) => (a, F32, 4, true),
        F64Store(a) => (a, F64, 8, true),
        I32Store8(a) => (a, I32, 1, true),
        I32Store16(a) => (a, I32, 2, true),
        I64Store8(a) => (a, I64, 1, true),
        I64Store16(a) => (a, I64, 2, true),
        I64Store32(a) => (a, I64, 4, true),
        _ => return None,
    })
}

impl FunctionValidator<'_, '_> {
    fn require(&self, enabled: bool) -> Result<(), ValidationError> {
        if enabled { Ok(()) } else { invalid(FEATURE_DISABLED) }
    }

    fn local(&self, idx: u32) -> Result<ValType, ValidationError> {
        self.locals.get(idx as usize).copied().ok_or(ValidationError::new(UNKNOWN_LOCAL))
    }

    fn step(&mut self, ins: &Instruction) -> Result<(), ValidationError> {
        use Instruction::*;
        let features = self.cx.features;

        if let Some((params, result)) = numeric_sig(ins) {
            match ins {
                I32Extend8S | I32Extend16S | I64Extend8S | I64Extend16S | I64Extend32S => {
                    self.require(features.sign_extension)?
                }
                I32TruncSatF32S | I32TruncSatF32U | I32TruncSatF64S | I32TruncSatF64U | I64TruncSatF32S
                | I64TruncSatF32U | I64TruncSatF64S | I64TruncSatF64U => self.require(features.saturating_float_to_int)?,
                _ => {}
            }
            return self.vs.apply_sig(params, &[result]);
        }

        if let Some((memarg, ty, width, is_store)) = memory_access(ins) {
            self.cx.memory(0)?;
            if memarg.align >= 32 || 1u64 << memarg.align > width as u64 {
                return invalid(ALIGNMENT_TOO_LARGE);
            }
            return if is_store { self.vs.apply_sig(&[I32, ty], &[]) } else { self.vs.apply_sig(&[I32], &[ty]) };
        }

        match ins {
            // Control
            Unreachable => self.vs.polymorphize(),
            Nop => {}
            Block { ty, .. } => {
                let sig = self.cx.block_type(*ty)?;
                self.vs.enter_flow(ControlType::Block, sig)?;
            }
            Loop { ty } => {
                let sig = self.cx.block_type(*ty)?;
                self.vs.enter_flow(ControlType::Loop, sig)?;
            }
            If { ty, .. } => {
                let sig = self.cx.block_type(*ty)?;
                self.vs.pop_expect(I32)?;
                self.vs.enter_flow(ControlType::If, sig)?;
            }
            Else { .. } => {
                let frame = self.vs.exit_flow()?;
                if frame.control_type != ControlType::If {
                    return invalid(UNEXPECTED_ELSE);
                }
                let sig = FuncType { params: frame.start_types, results: frame.end_types };
                self.vs.push_slice(&sig.params);
                let height = self.vs.vals.len() - sig.params.len();
                self.vs.ctrls.push(ControlFrame {
                    control_type: ControlType::Else,
                    start_types: sig.params,
                    end_types: sig.results,
                    height,
                    unreachable: false,
                });
            }
            End => {
                let frame = self.vs.exit_flow()?;
                // An `if` without `else` behaves as if the missing arm passed its inputs through.
                if frame.control_type == ControlType::If && frame.start_types != frame.end_types {
                    return Err(ValidationError::mismatch(frame.end_types.first().copied(), frame.start_types.first().copied()));
                }
                self.vs.push_slice(&frame.end_types);
            }
            Br(depth) => {
                let labels = self.vs.label_types(*depth)?;
                self.vs.pop_slice(&labels)?;
                self.vs.polymorphize();
            }
            BrIf(depth) => {
                self.vs.pop_expect(I32)?;
                let labels = self.vs.label_types(*depth)?;
                self.vs.apply_sig(&labels, &labels)?;
            }
            BrTable { targets, default } => {
                self.vs.pop_expect(I32)?;
                let default_labels = self.vs.label_types(*default)?;
                let arity = default_labels.len();
                for target in targets.iter() {
                    let labels = self.vs.label_types(*target)?;
                    if labels.len() != arity {
                        return invalid(TYPE_MISMATCH);
                    }
                    let popped = self.vs.pop_slice(&labels)?;
                    self.vs.vals.extend(popped);
                }
                self.vs.pop_slice(&default_labels)?;
                self.vs.polymorphize();
            }
            Return => {
                self.vs.pop_slice(self.results)?;
                self.vs.polymorphize();
            }
            Call(idx) => {
                let ty = self.cx.func_type(*idx)?;
                self.vs.apply_sig(&ty.params, &ty.results)?;
            }
            CallIndirect { type_idx, table } => {
                let t = self.cx.table(*table)?;
                if t.elem != RefType::FuncRef {
                    return Err(ValidationError::mismatch(Some(FuncRef), Some(t.elem.into())));
                }
                let ty = self.cx.type_at(*type_idx)?;
                self.vs.pop_expect(I32)?;
                self.vs.apply_sig(&ty.params, &ty.results)?;
            }

            // Reference
            RefNull(t) => {
                self.require(features.reference_types)?;
                self.vs.push((*t).into());
            }
            RefIsNull => {
                self.require(features.reference_types)?;
                match self.vs.pop()? {
                    Some(t) if !t.is_ref() => return Err(ValidationError::mismatch(None, Some(t))),
                    _ => {}
                }
                self.vs.push(I32);
            }
            RefFunc(idx) => {
                self.require(features.reference_types)?;
                self.cx.func_type(*idx)?;
                if !self.cx.refs.contains(idx) {
                    return invalid(UNDECLARED_FUNC_REF);
                }
                self.vs.push(FuncRef);
            }

            // Parametric
            Drop => {
                self.vs.pop()?;
            }
            Select(None) => {
                self.vs.pop_expect(I32)?;
                let t1 = self.vs.pop()?;
                let t2 = self.vs.pop()?;
                if t1.is_some_and(ValType::is_ref) || t2.is_some_and(ValType::is_ref) {
                    return Err(ValidationError::mismatch(None, t1.or(t2)));
                }
                if let (Some(a), Some(b)) = (t1, t2) {
                    if a != b {
                        return Err(ValidationError::mismatch(Some(b), Some(a)));
                    }
                }
                self.vs.vals.push(t1.or(t2));
            }
            Select(Some(t)) => {
                self.require(features.reference_types)?;
                self.vs.apply_sig(&[*t, *t, I32], &[*t])?;
            }

            // Variable
            LocalGet(idx) => {
                let t = self.local(*idx)?;
                self.vs.push(t);
            }
            LocalSet(idx) => {
                let t = self.local(*idx)?;
                self.vs.pop_expect(t)?;
            }
            LocalTee(idx) => {
                let t = self.local(*idx)?;
                self.vs.apply_sig(&[t], &[t])?;
            }
            GlobalGet(idx) => {
                let g = self.cx.global(*idx)?;
                self.vs.push(g.ty);
            }
            GlobalSet(idx) => {
                let g = self.cx.global(*idx)?;
                if !g.mutable {
                    return invalid(GLOBAL_IS_IMMUTABLE);
                }
                self.vs.pop_expect(g.ty)?;
            }

            // Table
            TableGet(idx) => {
                self.require(features.reference_types)?;
                let t = self.cx.table(*idx)?;
                self.vs.apply_sig(&[I32], &[t.elem.into()])?;
            }
            TableSet(idx) => {
                self.require(features.reference_types)?;
                let t = self.cx.table(*idx)?;
                self.vs.apply_sig(&[I32, t.elem.into()], &[])?;
            }
            TableSize(idx) => {
                self.require(features.reference_types)?;
                self.cx.table(*idx)?;
                self.vs.push(I32);
            }
            TableGrow(idx) => {
                self.require(features.reference_types)?;
                let t = self.cx.table(*idx)?;
                self.vs.apply_sig(&[t.elem.into(), I32], &[I32])?;
            }
            TableFill(idx) => {
                self.require(features.reference_types)?;
                let t = self.cx.table(*idx)?;
                self.vs.apply_sig(&[I32, t.elem.into(), I32], &[])?;
            }
            TableCopy { dst, src } => {
                self.require(features.bulk_memory)?;
                let d = self.cx.table(*dst)?;
                let s = self.cx.table(*src)?;
                if d.elem != s.elem {
                    return Err(ValidationError::mismatch(Some(d.elem.into()), Some(s.elem.into())));
                }
                self.vs.apply_sig(&[I32, I32, I32], &[])?;
            }
            TableInit { elem, table } => {
                self.require(features.bulk_memory)?;
                let t = self.cx.table(*table)?;
                let e = self.cx.elem_type(*elem)?;
                if t.elem != e {
                    return Err(ValidationError::mismatch(Some(t.elem.into()), Some(e.into())));
                }
                self.vs.apply_sig(&[I32, I32, I32], &[])?;
            }
            ElemDrop(elem) => {
                self.require(features.bulk_memory)?;
                self.cx.elem_type(*elem)?;
            }

            // Memory
            MemorySize => {
                self.cx.memory(0)?;
                self.vs.push(I32);
            }
            MemoryGrow => {
                self.cx.memory(0)?;
                self.vs.apply_sig(&[I32], &[I32])?;
            }
            MemoryInit(data) => {
                self.require(features.bulk_memory)?;
                self.cx.memory(0)?;
                self.cx.data(*data)?;
                self.vs.apply_sig(&[I32, I32, I32], &[])?;
            }
            DataDrop(data) => {
                self.require(features.bulk_memory)?;
                self.cx.data(*data)?;
            }
            MemoryCopy | MemoryFill => {
                self.require(features.bulk_memory)?;
                self.cx.memory(0)?;
                self.vs.apply_sig(&[I32, I32, I32], &[])?;
            }

            // Constants
            I32Const(_) => self.vs.push(I32),
            I64Const(_) => self.vs.push(I64),
            F32Const(_) => self.vs.push(F32),
            F64Const(_) => self.vs.push(F64),

            // Numeric and memory-access instructions were handled above.
            _ => return invalid(TYPE_MISMATCH),
        }
        Ok(())
    }
}
