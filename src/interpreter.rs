use std::sync::Arc;

use paste::paste;
use tracing::debug;
#[cfg(feature = "wasm_debug")]
use tracing::trace;

use crate::config::Config;
use crate::error::*;
use crate::instruction::Instruction;
use crate::module::Module;
use crate::store::*;
use crate::types::{FuncType, ValType};
use crate::value::{Value, WasmValue};

/// Executes functions in a [`Store`]. Holds no state between invocations.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter {
    max_call_depth: usize,
}

impl Interpreter {
    pub fn new(config: &Config) -> Self {
        Self { max_call_depth: config.max_call_depth }
    }

    /// Calls `func` with typed arguments. Arguments are checked against the
    /// function type before anything runs, so a mismatch is never a trap.
    pub fn invoke(&self, store: &mut Store, func: FuncAddr, args: &[Value]) -> Result<Vec<Value>, Error> {
        let ty = store.func_type(func).ok_or(InvocationError::InvalidHandle)?.clone();
        let actual: Vec<ValType> = args.iter().map(Value::ty).collect();
        if actual != ty.params {
            return Err(InvocationError::ArgumentMismatch { expected: ty.params, actual }.into());
        }
        debug!(func = func.0, args = ?args, "invoke");

        let mut machine = Machine {
            store,
            stack: Vec::with_capacity(1024),
            labels: Vec::with_capacity(64),
            frames: Vec::new(),
            max_call_depth: self.max_call_depth,
        };
        machine.stack.extend(args.iter().map(Value::raw));
        if let Err(trap) = machine.run(func) {
            debug!(func = func.0, %trap, "invocation trapped");
            return Err(trap.into());
        }

        // Results are the top of the stack, in declaration order.
        let start = machine.stack.len() - ty.results.len();
        let results: Vec<Value> =
            machine.stack[start..].iter().zip(&ty.results).map(|(v, t)| v.typed(*t)).collect();
        debug!(func = func.0, results = ?results, "invoke returned");
        Ok(results)
    }
}

/// Branch target: `arity` values move down to `height`, execution resumes at `cont`.
#[derive(Debug, Clone, Copy)]
struct Label {
    arity: usize,
    height: usize,
    cont: usize,
}

/// Per-activation bookkeeping. Locals occupy the stack from `locals_base`.
#[derive(Debug, Clone, Copy)]
struct FrameState {
    instance: InstanceHandle,
    /// Index into the module's code section.
    code: u32,
    locals_base: usize,
    label_base: usize,
    arity: usize,
    memory: Option<MemAddr>,
}

/// Suspended caller.
struct Frame {
    module: Arc<Module>,
    state: FrameState,
    return_pc: usize,
}

enum Flow {
    Next,
    Call(FuncAddr),
    Return,
}

struct Machine<'s> {
    store: &'s mut Store,
    stack: Vec<WasmValue>,
    labels: Vec<Label>,
    frames: Vec<Frame>,
    max_call_depth: usize,
}

impl Machine<'_> {
    fn run(&mut self, entry: FuncAddr) -> Result<(), Trap> {
        let Some((mut module, mut fr)) = self.enter(entry, 0)? else { return Ok(()) };
        let mut pc = 0usize;

        loop {
            let at = pc;
            let flow = {
                let ins = &module.code[fr.code as usize].body[at];
                pc += 1;
                #[cfg(feature = "wasm_debug")]
                trace!(func = fr.code, pc = at, stack = self.stack.len(), ?ins, "exec");
                self.step(&module, &fr, ins, &mut pc)
            };
            let locate = |kind: TrapKind, module: &Module, fr: &FrameState| Trap {
                kind,
                func: Some(module.num_imported_funcs() + fr.code),
                offset: Some(at),
            };
            match flow.map_err(|kind| locate(kind, &module, &fr))? {
                Flow::Next => {}
                Flow::Call(addr) => {
                    let depth = self.frames.len() + 1;
                    let entered = self.enter(addr, depth).map_err(|mut trap| {
                        if trap.kind == TrapKind::CallStackExhausted {
                            trap = locate(trap.kind, &module, &fr);
                        }
                        trap
                    })?;
                    if let Some((callee_module, callee)) = entered {
                        let caller = std::mem::replace(&mut module, callee_module);
                        self.frames.push(Frame { module: caller, state: fr, return_pc: pc });
                        fr = callee;
                        pc = 0;
                    }
                }
                Flow::Return => {
                    self.unwind(&fr);
                    match self.frames.pop() {
                        Some(caller) => {
                            module = caller.module;
                            fr = caller.state;
                            pc = caller.return_pc;
                        }
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Sets up a call whose arguments are on the stack. Host functions run to
    /// completion here and yield `None`; wasm functions yield their new frame.
    fn enter(&mut self, addr: FuncAddr, depth: usize) -> Result<Option<(Arc<Module>, FrameState)>, Trap> {
        let (module, instance, code, n_params, arity) = match &self.store.funcs[addr.0 as usize] {
            FuncInst::Wasm { ty, instance, module, index } => {
                (module.clone(), *instance, *index, ty.params.len(), ty.results.len())
            }
            FuncInst::Host { ty, callback } => {
                let (ty, callback) = (ty.clone(), callback.clone());
                self.call_host(&ty, &callback)?;
                return Ok(None);
            }
        };
        if depth >= self.max_call_depth {
            return Err(TrapKind::CallStackExhausted.into());
        }
        let locals_base = self.stack.len() - n_params;
        let n_locals = module.code[code as usize].locals.len();
        self.stack.resize(self.stack.len() + n_locals, WasmValue::default());
        let memory = self.store.instances[instance.0 as usize].mems.first().copied();
        let state = FrameState { instance, code, locals_base, label_base: self.labels.len(), arity, memory };
        Ok(Some((module, state)))
    }

    fn call_host(&mut self, ty: &FuncType, callback: &HostFunc) -> Result<(), Trap> {
        let split = self.stack.len() - ty.params.len();
        let args: Vec<Value> = self.stack[split..].iter().zip(&ty.params).map(|(v, t)| v.typed(*t)).collect();
        self.stack.truncate(split);
        let results = callback(&args)?;
        if results.len() != ty.results.len() || results.iter().zip(&ty.results).any(|(v, t)| v.ty() != *t) {
            return Err(TrapKind::HostResultMismatch.into());
        }
        self.stack.extend(results.iter().map(Value::raw));
        Ok(())
    }

    /// Leaves the function's results where its locals began.
    fn unwind(&mut self, fr: &FrameState) {
        let len = self.stack.len();
        self.stack.copy_within(len - fr.arity..len, fr.locals_base);
        self.stack.truncate(fr.locals_base + fr.arity);
        self.labels.truncate(fr.label_base);
    }

    /// Branch to the label `depth` levels out. The function body itself is the
    /// outermost label, so branching to it returns.
    #[inline]
    fn branch(&mut self, fr: &FrameState, depth: u32, pc: &mut usize) -> Flow {
        let n_labels = self.labels.len() - fr.label_base;
        if depth as usize >= n_labels {
            return Flow::Return;
        }
        let idx = self.labels.len() - 1 - depth as usize;
        let target = self.labels[idx];
        let len = self.stack.len();
        if target.arity > 0 {
            self.stack.copy_within(len - target.arity..len, target.height);
        }
        self.stack.truncate(target.height + target.arity);
        self.labels.truncate(idx);
        *pc = target.cont;
        Flow::Next
    }

    #[inline]
    fn inst(&self, fr: &FrameState) -> &ModuleInst {
        &self.store.instances[fr.instance.0 as usize]
    }

    #[inline]
    fn table_addr(&self, fr: &FrameState, idx: u32) -> usize {
        self.inst(fr).tables[idx as usize].0 as usize
    }

    #[inline]
    fn global_addr(&self, fr: &FrameState, idx: u32) -> usize {
        self.inst(fr).globals[idx as usize].0 as usize
    }

    fn step(&mut self, module: &Module, fr: &FrameState, ins: &Instruction, pc: &mut usize) -> Result<Flow, TrapKind> {
        // Validated code never pops an empty stack.
        macro_rules! pop_val { () => { self.stack.pop().unwrap_or_default() } }
        macro_rules! push { ($v:expr) => { self.stack.push($v) } }
        macro_rules! binary {
            ($type:ident, $op:tt) => {{
                paste! {
                    let b = pop_val!().[<as_ $type>]();
                    let a = pop_val!().[<as_ $type>]();
                    push!(WasmValue::[<from_ $type>](a $op b));
                }
            }};
            ($type:ident, .$method:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $type>]();
                    let a = pop_val!().[<as_ $type>]();
                    push!(WasmValue::[<from_ $type>](a.$method(b)));
                }
            }};
        }
        macro_rules! compare {
            ($type:ident, $op:tt) => {{
                paste! {
                    let b = pop_val!().[<as_ $type>]();
                    let a = pop_val!().[<as_ $type>]();
                    push!(WasmValue::from_u32((a $op b) as u32));
                }
            }};
        }
        macro_rules! shift {
            ($type:ident, $method:ident) => {{
                paste! {
                    let b = pop_val!().as_u32();
                    let a = pop_val!().[<as_ $type>]();
                    push!(WasmValue::[<from_ $type>](a.$method(b)));
                }
            }};
        }
        macro_rules! unary {
            ($type:ident, $f:expr) => {{
                paste! {
                    let a = pop_val!().[<as_ $type>]();
                    push!(WasmValue::[<from_ $type>]($f(a)));
                }
            }};
        }
        macro_rules! eqz {
            ($type:ident, $f:expr) => {{
                paste! {
                    let a = pop_val!().[<as_ $type>]();
                    push!(WasmValue::from_u32($f(a) as u32));
                }
            }};
        }
        macro_rules! minmax {
            ($type:ident, min) => {{ minmax!(@impl $type, min, true) }};
            ($type:ident, max) => {{ minmax!(@impl $type, max, false) }};
            (@impl $type:ident, $op:ident, $want_negative:literal) => {{
                paste! {
                    let b = pop_val!().[<as_ $type>]();
                    let a = pop_val!().[<as_ $type>]();
                    let result = if a.is_nan() || b.is_nan() {
                        a + b
                    } else if a == b && a == 0.0 {
                        if a.is_sign_negative() == $want_negative { a } else { b }
                    } else {
                        a.$op(b)
                    };
                    push!(WasmValue::[<from_ $type>](result));
                }
            }};
        }
        macro_rules! nearest {
            ($type:ident) => {{
                paste! {
                    let x = pop_val!().[<as_ $type>]();
                    push!(WasmValue::[<from_ $type>](x.round_ties_even()));
                }
            }};
        }
        macro_rules! convert {
            ($src_type:ident -> $dst_type:ident) => {{
                paste! {
                    let v = pop_val!().[<as_ $src_type>]();
                    push!(WasmValue::[<from_ $dst_type>](v as $dst_type));
                }
            }};
        }
        // Truncate first, then range-check the integral value against the exact
        // bounds of the target type; both bounds are powers of two and exact.
        macro_rules! trunc {
            ($src_type:ident -> $dst_type:ident : $min:expr, $max:expr) => {{
                paste! {
                    let x = pop_val!().[<as_ $src_type>]();
                    if x.is_nan() {
                        return Err(TrapKind::InvalidConversion);
                    }
                    let t = x.trunc();
                    if !(t >= $min && t < $max) {
                        return Err(TrapKind::IntegerOverflow);
                    }
                    push!(WasmValue::[<from_ $dst_type>](t as $dst_type));
                }
            }};
        }
        macro_rules! div_s {
            ($int_type:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $int_type>]();
                    let a = pop_val!().[<as_ $int_type>]();
                    if b == 0 { return Err(TrapKind::DivideByZero); }
                    if a == $int_type::MIN && b == -1 { return Err(TrapKind::IntegerOverflow); }
                    push!(WasmValue::[<from_ $int_type>](a / b));
                }
            }};
        }
        macro_rules! div_u {
            ($uint_type:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $uint_type>]();
                    let a = pop_val!().[<as_ $uint_type>]();
                    if b == 0 { return Err(TrapKind::DivideByZero); }
                    push!(WasmValue::[<from_ $uint_type>](a / b));
                }
            }};
        }
        macro_rules! rem_s {
            ($int_type:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $int_type>]();
                    let a = pop_val!().[<as_ $int_type>]();
                    if b == 0 { return Err(TrapKind::DivideByZero); }
                    push!(WasmValue::[<from_ $int_type>](a.wrapping_rem(b)));
                }
            }};
        }
        macro_rules! rem_u {
            ($uint_type:ident) => {{
                paste! {
                    let b = pop_val!().[<as_ $uint_type>]();
                    let a = pop_val!().[<as_ $uint_type>]();
                    if b == 0 { return Err(TrapKind::DivideByZero); }
                    push!(WasmValue::[<from_ $uint_type>](a % b));
                }
            }};
        }
        macro_rules! memory {
            () => {{
                // Validation guarantees a memory exists for memory instructions.
                let addr = fr.memory.map_or(0, |m| m.0 as usize);
                &mut self.store.mems[addr]
            }};
        }
        macro_rules! load {
            ($memarg:expr, $method:ident, $push:expr) => {{
                let ptr = pop_val!().as_u32();
                let v = memory!().$method(ptr, $memarg.offset)?;
                push!(($push)(v));
            }};
        }
        macro_rules! store {
            ($memarg:expr, $method:ident, $from:expr) => {{
                let raw = pop_val!();
                let ptr = pop_val!().as_u32();
                memory!().$method(ptr, $memarg.offset, ($from)(raw))?;
            }};
        }

        use Instruction::*;
        match ins {
            // Control
            Unreachable => return Err(TrapKind::Unreachable),
            Nop => {}
            Block { ty, end } => {
                let (params, results) = module.block_arity(*ty);
                self.labels.push(Label { arity: results, height: self.stack.len() - params, cont: *end as usize + 1 });
            }
            Loop { ty } => {
                let (params, _) = module.block_arity(*ty);
                self.labels.push(Label { arity: params, height: self.stack.len() - params, cont: *pc - 1 });
            }
            If { ty, else_pos, end } => {
                let cond = pop_val!().as_u32();
                let (params, results) = module.block_arity(*ty);
                let label = Label { arity: results, height: self.stack.len() - params, cont: *end as usize + 1 };
                if cond != 0 {
                    self.labels.push(label);
                } else if let Some(e) = else_pos {
                    self.labels.push(label);
                    *pc = *e as usize + 1;
                } else {
                    *pc = *end as usize + 1;
                }
            }
            Else { end } => {
                // End of the then-arm: the stack already holds exactly the results.
                self.labels.pop();
                *pc = *end as usize + 1;
            }
            End => {
                if self.labels.len() > fr.label_base {
                    self.labels.pop();
                } else {
                    return Ok(Flow::Return);
                }
            }
            Br(depth) => return Ok(self.branch(fr, *depth, pc)),
            BrIf(depth) => {
                if pop_val!().as_u32() != 0 {
                    return Ok(self.branch(fr, *depth, pc));
                }
            }
            BrTable { targets, default } => {
                let i = pop_val!().as_u32() as usize;
                let depth = targets.get(i).copied().unwrap_or(*default);
                return Ok(self.branch(fr, depth, pc));
            }
            Return => return Ok(Flow::Return),
            Call(idx) => return Ok(Flow::Call(self.inst(fr).funcs[*idx as usize])),
            CallIndirect { type_idx, table } => {
                let i = pop_val!().as_u32();
                let t = self.table_addr(fr, *table);
                let entry = self.store.tables[t].get(i).map_err(|_| TrapKind::UndefinedElement)?;
                let callee = FuncAddr(entry.as_ref().ok_or(TrapKind::UninitializedElement)?);
                if self.store.funcs[callee.0 as usize].ty() != &module.types[*type_idx as usize] {
                    return Err(TrapKind::IndirectCallTypeMismatch);
                }
                return Ok(Flow::Call(callee));
            }

            // Reference
            RefNull(_) => push!(WasmValue::NULL),
            RefIsNull => {
                let v = pop_val!();
                push!(WasmValue::from_u32(v.is_null() as u32));
            }
            RefFunc(idx) => {
                let addr = self.inst(fr).funcs[*idx as usize];
                push!(WasmValue::from_ref(Some(addr.0)));
            }

            // Parametric
            Drop => { pop_val!(); }
            Select(_) => {
                let cond = pop_val!().as_u32();
                let v2 = pop_val!();
                let v1 = pop_val!();
                push!(if cond != 0 { v1 } else { v2 });
            }

            // Variable
            LocalGet(idx) => push!(self.stack[fr.locals_base + *idx as usize]),
            LocalSet(idx) => {
                let v = pop_val!();
                self.stack[fr.locals_base + *idx as usize] = v;
            }
            LocalTee(idx) => {
                let v = self.stack.last().copied().unwrap_or_default();
                self.stack[fr.locals_base + *idx as usize] = v;
            }
            GlobalGet(idx) => {
                let g = self.global_addr(fr, *idx);
                push!(self.store.globals[g].value);
            }
            GlobalSet(idx) => {
                let g = self.global_addr(fr, *idx);
                self.store.globals[g].value = pop_val!();
            }

            // Table
            TableGet(idx) => {
                let i = pop_val!().as_u32();
                let t = self.table_addr(fr, *idx);
                push!(self.store.tables[t].get(i)?);
            }
            TableSet(idx) => {
                let v = pop_val!();
                let i = pop_val!().as_u32();
                let t = self.table_addr(fr, *idx);
                self.store.tables[t].set(i, v)?;
            }
            TableSize(idx) => {
                let t = self.table_addr(fr, *idx);
                push!(WasmValue::from_u32(self.store.tables[t].size()));
            }
            TableGrow(idx) => {
                let delta = pop_val!().as_u32();
                let init = pop_val!();
                let t = self.table_addr(fr, *idx);
                push!(WasmValue::from_u32(self.store.tables[t].grow(delta, init)));
            }
            TableFill(idx) => {
                let n = pop_val!().as_u32();
                let v = pop_val!();
                let i = pop_val!().as_u32();
                let t = self.table_addr(fr, *idx);
                self.store.tables[t].fill(i, v, n)?;
            }
            TableCopy { dst, src } => {
                let n = pop_val!().as_u32();
                let s = pop_val!().as_u32();
                let d = pop_val!().as_u32();
                let (dt, st) = (self.table_addr(fr, *dst), self.table_addr(fr, *src));
                if dt == st {
                    self.store.tables[dt].copy_within(d, s, n)?;
                } else {
                    let values = self.store.tables[st].read(s, n)?.to_vec();
                    self.store.tables[dt].write(d, &values)?;
                }
            }
            TableInit { elem, table } => {
                let n = pop_val!().as_u32();
                let s = pop_val!().as_u32();
                let d = pop_val!().as_u32();
                let t = self.table_addr(fr, *table);
                let e = self.inst(fr).elems[*elem as usize].0 as usize;
                let items = &self.store.elems[e].elements;
                let end = s as u64 + n as u64;
                if end > items.len() as u64 {
                    return Err(TrapKind::TableOutOfBounds);
                }
                self.store.tables[t].write(d, &items[s as usize..end as usize])?;
            }
            ElemDrop(elem) => {
                let e = self.inst(fr).elems[*elem as usize].0 as usize;
                self.store.elems[e].elements = Vec::new();
            }

            // Memory
            I32Load(m) => load!(m, load_u32, WasmValue::from_u32),
            I64Load(m) => load!(m, load_u64, WasmValue::from_u64),
            F32Load(m) => load!(m, load_u32, WasmValue::from_f32_bits),
            F64Load(m) => load!(m, load_u64, WasmValue::from_f64_bits),
            I32Load8S(m) => load!(m, load_i8, |v: i8| WasmValue::from_i32(v as i32)),
            I32Load8U(m) => load!(m, load_u8, |v: u8| WasmValue::from_u32(v as u32)),
            I32Load16S(m) => load!(m, load_i16, |v: i16| WasmValue::from_i32(v as i32)),
            I32Load16U(m) => load!(m, load_u16, |v: u16| WasmValue::from_u32(v as u32)),
            I64Load8S(m) => load!(m, load_i8, |v: i8| WasmValue::from_i64(v as i64)),
            I64Load8U(m) => load!(m, load_u8, |v: u8| WasmValue::from_u64(v as u64)),
            I64Load16S(m) => load!(m, load_i16, |v: i16| WasmValue::from_i64(v as i64)),
            I64Load16U(m) => load!(m, load_u16, |v: u16| WasmValue::from_u64(v as u64)),
            I64Load32S(m) => load!(m, load_i32, |v: i32| WasmValue::from_i64(v as i64)),
            I64Load32U(m) => load!(m, load_u32, |v: u32| WasmValue::from_u64(v as u64)),
            I32Store(m) => store!(m, store_u32, |w: WasmValue| w.as_u32()),
            I64Store(m) => store!(m, store_u64, |w: WasmValue| w.as_u64()),
            F32Store(m) => store!(m, store_u32, |w: WasmValue| w.as_f32_bits()),
            F64Store(m) => store!(m, store_u64, |w: WasmValue| w.as_f64_bits()),
            I32Store8(m) => store!(m, store_u8, |w: WasmValue| w.as_u32() as u8),
            I32Store16(m) => store!(m, store_u16, |w: WasmValue| w.as_u32() as u16),
            I64Store8(m) => store!(m, store_u8, |w: WasmValue| w.as_u64() as u8),
            I64Store16(m) => store!(m, store_u16, |w: WasmValue| w.as_u64() as u16),
            I64Store32(m) => store!(m, store_u32, |w: WasmValue| w.as_u64() as u32),
            MemorySize => {
                let size = memory!().size();
                push!(WasmValue::from_u32(size));
            }
            MemoryGrow => {
                let delta = pop_val!().as_u32();
                let old = memory!().grow(delta);
                push!(WasmValue::from_u32(old));
            }
            MemoryInit(data) => {
                let n = pop_val!().as_u32();
                let s = pop_val!().as_u32();
                let d = pop_val!().as_u32();
                let seg = self.inst(fr).datas[*data as usize].0 as usize;
                let mem = fr.memory.map_or(0, |m| m.0 as usize);
                let bytes = &self.store.datas[seg].bytes;
                let end = s as u64 + n as u64;
                if end > bytes.len() as u64 {
                    return Err(TrapKind::MemoryOutOfBounds);
                }
                self.store.mems[mem].write(d, &bytes[s as usize..end as usize])?;
            }
            DataDrop(data) => {
                let seg = self.inst(fr).datas[*data as usize].0 as usize;
                self.store.datas[seg].bytes = Vec::new();
            }
            MemoryCopy => {
                let n = pop_val!().as_u32();
                let s = pop_val!().as_u32();
                let d = pop_val!().as_u32();
                memory!().copy_within(d, s, n)?;
            }
            MemoryFill => {
                let n = pop_val!().as_u32();
                let v = pop_val!().as_u32() as u8;
                let d = pop_val!().as_u32();
                memory!().fill(d, v, n)?;
            }

            // Constants
            I32Const(v) => push!(WasmValue::from_i32(*v)),
            I64Const(v) => push!(WasmValue::from_i64(*v)),
            F32Const(bits) => push!(WasmValue::from_f32_bits(*bits)),
            F64Const(bits) => push!(WasmValue::from_f64_bits(*bits)),

            // i32 comparison
            I32Eqz => eqz!(u32, |x: u32| x == 0),
            I32Eq => compare!(u32, ==),
            I32Ne => compare!(u32, !=),
            I32LtS => compare!(i32, <),
            I32LtU => compare!(u32, <),
            I32GtS => compare!(i32, >),
            I32GtU => compare!(u32, >),
            I32LeS => compare!(i32, <=),
            I32LeU => compare!(u32, <=),
            I32GeS => compare!(i32, >=),
            I32GeU => compare!(u32, >=),
            // i64 comparison
            I64Eqz => eqz!(u64, |x: u64| x == 0),
            I64Eq => compare!(u64, ==),
            I64Ne => compare!(u64, !=),
            I64LtS => compare!(i64, <),
            I64LtU => compare!(u64, <),
            I64GtS => compare!(i64, >),
            I64GtU => compare!(u64, >),
            I64LeS => compare!(i64, <=),
            I64LeU => compare!(u64, <=),
            I64GeS => compare!(i64, >=),
            I64GeU => compare!(u64, >=),
            // float comparison
            F32Eq => compare!(f32, ==),
            F32Ne => compare!(f32, !=),
            F32Lt => compare!(f32, <),
            F32Gt => compare!(f32, >),
            F32Le => compare!(f32, <=),
            F32Ge => compare!(f32, >=),
            F64Eq => compare!(f64, ==),
            F64Ne => compare!(f64, !=),
            F64Lt => compare!(f64, <),
            F64Gt => compare!(f64, >),
            F64Le => compare!(f64, <=),
            F64Ge => compare!(f64, >=),

            // i32 arithmetic
            I32Clz => unary!(u32, |x: u32| x.leading_zeros()),
            I32Ctz => unary!(u32, |x: u32| x.trailing_zeros()),
            I32Popcnt => unary!(u32, |x: u32| x.count_ones()),
            I32Add => binary!(u32, .wrapping_add),
            I32Sub => binary!(u32, .wrapping_sub),
            I32Mul => binary!(u32, .wrapping_mul),
            I32DivS => div_s!(i32),
            I32DivU => div_u!(u32),
            I32RemS => rem_s!(i32),
            I32RemU => rem_u!(u32),
            I32And => binary!(u32, &),
            I32Or => binary!(u32, |),
            I32Xor => binary!(u32, ^),
            I32Shl => shift!(u32, wrapping_shl),
            I32ShrS => shift!(i32, wrapping_shr),
            I32ShrU => shift!(u32, wrapping_shr),
            I32Rotl => shift!(u32, rotate_left),
            I32Rotr => shift!(u32, rotate_right),
            // i64 arithmetic
            I64Clz => unary!(u64, |x: u64| x.leading_zeros() as u64),
            I64Ctz => unary!(u64, |x: u64| x.trailing_zeros() as u64),
            I64Popcnt => unary!(u64, |x: u64| x.count_ones() as u64),
            I64Add => binary!(u64, .wrapping_add),
            I64Sub => binary!(u64, .wrapping_sub),
            I64Mul => binary!(u64, .wrapping_mul),
            I64DivS => div_s!(i64),
            I64DivU => div_u!(u64),
            I64RemS => rem_s!(i64),
            I64RemU => rem_u!(u64),
            I64And => binary!(u64, &),
            I64Or => binary!(u64, |),
            I64Xor => binary!(u64, ^),
            I64Shl => shift!(u64, wrapping_shl),
            I64ShrS => shift!(i64, wrapping_shr),
            I64ShrU => shift!(u64, wrapping_shr),
            I64Rotl => shift!(u64, rotate_left),
            I64Rotr => shift!(u64, rotate_right),
            // f32 arithmetic
            F32Abs => unary!(f32_bits, |x: u32| x & 0x7fff_ffff),
            F32Neg => unary!(f32_bits, |x: u32| x ^ 0x8000_0000),
            F32Ceil => unary!(f32, |x: f32| x.ceil()),
            F32Floor => unary!(f32, |x: f32| x.floor()),
            F32Trunc => unary!(f32, |x: f32| x.trunc()),
            F32Nearest => nearest!(f32),
            F32Sqrt => unary!(f32, |x: f32| x.sqrt()),
            F32Add => binary!(f32, +),
            F32Sub => binary!(f32, -),
            F32Mul => binary!(f32, *),
            F32Div => binary!(f32, /),
            F32Min => minmax!(f32, min),
            F32Max => minmax!(f32, max),
            F32Copysign => binary!(f32, .copysign),
            // f64 arithmetic
            F64Abs => unary!(f64_bits, |x: u64| x & 0x7fff_ffff_ffff_ffff),
            F64Neg => unary!(f64_bits, |x: u64| x ^ 0x8000_0000_0000_0000),
            F64Ceil => unary!(f64, |x: f64| x.ceil()),
            F64Floor => unary!(f64, |x: f64| x.floor()),
            F64Trunc => unary!(f64, |x: f64| x.trunc()),
            F64Nearest => nearest!(f64),
            F64Sqrt => unary!(f64, |x: f64| x.sqrt()),
            F64Add => binary!(f64, +),
            F64Sub => binary!(f64, -),
            F64Mul => binary!(f64, *),
            F64Div => binary!(f64, /),
            F64Min => minmax!(f64, min),
            F64Max => minmax!(f64, max),
            F64Copysign => binary!(f64, .copysign),

            // Conversions
            I32WrapI64 => convert!(u64 -> u32),
            I32TruncF32S => trunc!(f32 -> i32 : -2147483648.0, 2147483648.0),
            I32TruncF32U => trunc!(f32 -> u32 : 0.0, 4294967296.0),
            I32TruncF64S => trunc!(f64 -> i32 : -2147483648.0, 2147483648.0),
            I32TruncF64U => trunc!(f64 -> u32 : 0.0, 4294967296.0),
            I64ExtendI32S => convert!(i32 -> i64),
            I64ExtendI32U => convert!(u32 -> u64),
            I64TruncF32S => trunc!(f32 -> i64 : -9223372036854775808.0, 9223372036854775808.0),
            I64TruncF32U => trunc!(f32 -> u64 : 0.0, 18446744073709551616.0),
            I64TruncF64S => trunc!(f64 -> i64 : -9223372036854775808.0, 9223372036854775808.0),
            I64TruncF64U => trunc!(f64 -> u64 : 0.0, 18446744073709551616.0),
            F32ConvertI32S => convert!(i32 -> f32),
            F32ConvertI32U => convert!(u32 -> f32),
            F32ConvertI64S => convert!(i64 -> f32),
            F32ConvertI64U => convert!(u64 -> f32),
            F32DemoteF64 => convert!(f64 -> f32),
            F64ConvertI32S => convert!(i32 -> f64),
            F64ConvertI32U => convert!(u32 -> f64),
            F64ConvertI64S => convert!(i64 -> f64),
            F64ConvertI64U => convert!(u64 -> f64),
            F64PromoteF32 => convert!(f32 -> f64),
            // Same bits, new type.
            I32ReinterpretF32 | F32ReinterpretI32 => {}
            I64ReinterpretF64 | F64ReinterpretI64 => {}

            // Sign extension
            I32Extend8S => unary!(i32, |x: i32| x as i8 as i32),
            I32Extend16S => unary!(i32, |x: i32| x as i16 as i32),
            I64Extend8S => unary!(i64, |x: i64| x as i8 as i64),
            I64Extend16S => unary!(i64, |x: i64| x as i16 as i64),
            I64Extend32S => unary!(i64, |x: i64| x as i32 as i64),

            // Saturating truncation: `as` already saturates and maps NaN to 0.
            I32TruncSatF32S => convert!(f32 -> i32),
            I32TruncSatF32U => convert!(f32 -> u32),
            I32TruncSatF64S => convert!(f64 -> i32),
            I32TruncSatF64U => convert!(f64 -> u32),
            I64TruncSatF32S => convert!(f32 -> i64),
            I64TruncSatF32U => convert!(f32 -> u64),
            I64TruncSatF64S => convert!(f64 -> i64),
            I64TruncSatF64U => convert!(f64 -> u64),
        }
        Ok(Flow::Next)
    }
}
