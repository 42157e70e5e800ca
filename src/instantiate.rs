use std::collections::HashMap;

use tracing::debug;

use crate::config::Config;
use crate::error::*;
use crate::instruction::Instruction;
use crate::interpreter::Interpreter;
use crate::module::*;
use crate::store::*;
use crate::types::ExternKind;
use crate::validator::ValidModule;
use crate::value::WasmValue;

pub type ModuleImports = HashMap<String, Extern>;

/// Import resolution map: module name, then field name, to a store entity.
#[derive(Debug, Clone, Default)]
pub struct Imports {
    modules: HashMap<String, ModuleImports>,
}

impl Imports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, module: impl Into<String>, field: impl Into<String>, ext: Extern) -> &mut Self {
        self.modules.entry(module.into()).or_default().insert(field.into(), ext);
        self
    }

    /// Makes every export of an instance importable under `module`.
    pub fn define_instance(&mut self, store: &Store, module: &str, handle: InstanceHandle) -> Result<&mut Self, Error> {
        let inst = store.instance(handle).ok_or(InvocationError::InvalidHandle)?;
        let entry = self.modules.entry(module.to_owned()).or_default();
        for (name, ext) in &inst.exports {
            entry.insert(name.clone(), *ext);
        }
        Ok(self)
    }

    pub fn get(&self, module: &str, field: &str) -> Option<Extern> {
        self.modules.get(module)?.get(field).copied()
    }
}

/// Instantiates with default limits.
pub fn instantiate(store: &mut Store, module: &ValidModule, imports: &Imports) -> Result<InstanceHandle, Error> {
    instantiate_with(store, module, imports, &Config::default())
}

/// Resolves imports, allocates every entity of `module`, applies active segments
/// and runs the start function. A trap in the last two steps aborts instantiation,
/// but table and memory writes already made stay visible through shared imports.
pub fn instantiate_with(
    store: &mut Store,
    module: &ValidModule,
    imports: &Imports,
    config: &Config,
) -> Result<InstanceHandle, Error> {
    let m = module.module();
    let handle = InstanceHandle(store.instances.len() as u32);

    // Imports
    let mut funcs: Vec<FuncAddr> = Vec::with_capacity(m.imports.len() + m.funcs.len());
    let mut tables: Vec<TableAddr> = Vec::new();
    let mut mems: Vec<MemAddr> = Vec::new();
    let mut globals: Vec<GlobalAddr> = Vec::new();
    for import in &m.imports {
        let ext = imports.get(&import.module, &import.field).ok_or_else(|| LinkError::UnknownImport {
            module: import.module.clone(),
            field: import.field.clone(),
        })?;
        store.extern_matches(ext, &import.desc, m).map_err(|reason| LinkError::IncompatibleImport {
            module: import.module.clone(),
            field: import.field.clone(),
            reason,
        })?;
        match ext {
            Extern::Func(a) => funcs.push(a),
            Extern::Table(a) => tables.push(a),
            Extern::Memory(a) => mems.push(a),
            Extern::Global(a) => globals.push(a),
        }
    }

    // Functions
    let shared = module.shared();
    for (index, type_idx) in m.funcs.iter().enumerate() {
        let ty = m.types[*type_idx as usize].clone();
        funcs.push(store.push_func(FuncInst::Wasm { ty, instance: handle, module: shared.clone(), index: index as u32 }));
    }

    // Tables and memories
    for t in &m.tables {
        tables.push(store.alloc_table(*t)?);
    }
    for mem in &m.memories {
        mems.push(store.alloc_memory(*mem)?);
    }

    // Globals, in order; initializers may only read globals that already exist.
    let n_imported_globals = globals.len() as u32;
    for (i, g) in m.globals.iter().enumerate() {
        let global = n_imported_globals + i as u32;
        let value = eval_const(&g.init, store, &funcs, &globals).map_err(|e| match e {
            ConstError::Forward(referenced) => Error::from(LinkError::GlobalForwardReference { global, referenced }),
            ConstError::Other(e) => e,
        })?;
        globals.push(store.push_global_raw(g.ty, value));
    }

    // Segments
    let mut elems = Vec::with_capacity(m.elements.len());
    for seg in &m.elements {
        let elements = seg
            .items
            .iter()
            .map(|item| eval_const(item, store, &funcs, &globals))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConstError::into_error)?;
        elems.push(store.push_elem(ElemInst { ty: seg.ty, elements }));
    }
    let datas = m.data.iter().map(|seg| store.push_data(DataInst { bytes: seg.init.clone() })).collect::<Vec<_>>();

    // Exports
    let exports = m
        .exports
        .iter()
        .map(|e| {
            let idx = e.index as usize;
            let ext = match e.kind {
                ExternKind::Func => Extern::Func(funcs[idx]),
                ExternKind::Table => Extern::Table(tables[idx]),
                ExternKind::Memory => Extern::Memory(mems[idx]),
                ExternKind::Global => Extern::Global(globals[idx]),
            };
            (e.name.clone(), ext)
        })
        .collect();

    let inst = ModuleInst { module: shared, funcs, tables, mems, globals, elems, datas, exports };
    store.push_instance(inst.clone());
    debug!(
        instance = handle.0,
        functions = inst.funcs.len(),
        tables = inst.tables.len(),
        memories = inst.mems.len(),
        globals = inst.globals.len(),
        "module instantiated"
    );

    // Active element segments, then data segments. Applied segments are dropped.
    for (i, seg) in m.elements.iter().enumerate() {
        let elem = inst.elems[i];
        match &seg.mode {
            ElementMode::Active { table, offset } => {
                let offset = eval_const(offset, store, &inst.funcs, &inst.globals).map_err(ConstError::into_error)?.as_u32();
                let table = inst.tables[*table as usize];
                let items = std::mem::take(&mut store.elems[elem.0 as usize].elements);
                store.tables[table.0 as usize].write(offset, &items).map_err(Trap::from)?;
            }
            ElementMode::Declarative => store.elems[elem.0 as usize].elements.clear(),
            ElementMode::Passive => {}
        }
    }
    for (i, seg) in m.data.iter().enumerate() {
        if let DataMode::Active { memory, offset } = &seg.mode {
            let offset = eval_const(offset, store, &inst.funcs, &inst.globals).map_err(ConstError::into_error)?.as_u32();
            let data = inst.datas[i];
            let bytes = std::mem::take(&mut store.datas[data.0 as usize].bytes);
            store.mems[inst.mems[*memory as usize].0 as usize].write(offset, &bytes).map_err(Trap::from)?;
        }
    }

    // Start
    if let Some(start) = m.start {
        debug!(instance = handle.0, func = start, "running start function");
        Interpreter::new(config).invoke(store, inst.funcs[start as usize], &[])?;
    }
    Ok(handle)
}

enum ConstError {
    /// `global.get` of a global that is not allocated yet.
    Forward(u32),
    Other(Error),
}

impl ConstError {
    fn into_error(self) -> Error {
        match self {
            ConstError::Forward(referenced) => {
                Error::from(LinkError::GlobalForwardReference { global: referenced, referenced })
            }
            ConstError::Other(e) => e,
        }
    }
}

/// Evaluates a validated constant expression.
fn eval_const(expr: &ConstExpr, store: &Store, funcs: &[FuncAddr], globals: &[GlobalAddr]) -> Result<WasmValue, ConstError> {
    let mut stack: Vec<WasmValue> = Vec::with_capacity(2);
    macro_rules! binop {
        ($as:ident, $from:ident, $op:ident) => {{
            let b = stack.pop().unwrap_or_default().$as();
            let a = stack.pop().unwrap_or_default().$as();
            stack.push(WasmValue::$from(a.$op(b)));
        }};
    }
    for ins in &expr.0 {
        match ins {
            Instruction::I32Const(v) => stack.push(WasmValue::from_i32(*v)),
            Instruction::I64Const(v) => stack.push(WasmValue::from_i64(*v)),
            Instruction::F32Const(bits) => stack.push(WasmValue::from_f32_bits(*bits)),
            Instruction::F64Const(bits) => stack.push(WasmValue::from_f64_bits(*bits)),
            Instruction::RefNull(_) => stack.push(WasmValue::NULL),
            Instruction::RefFunc(idx) => stack.push(WasmValue::from_ref(Some(funcs[*idx as usize].0))),
            Instruction::GlobalGet(idx) => {
                let addr = globals.get(*idx as usize).ok_or(ConstError::Forward(*idx))?;
                let g = store.global(*addr).ok_or(ConstError::Other(InvocationError::InvalidHandle.into()))?;
                stack.push(g.value);
            }
            Instruction::I32Add => binop!(as_u32, from_u32, wrapping_add),
            Instruction::I32Sub => binop!(as_u32, from_u32, wrapping_sub),
            Instruction::I32Mul => binop!(as_u32, from_u32, wrapping_mul),
            Instruction::I64Add => binop!(as_u64, from_u64, wrapping_add),
            Instruction::I64Sub => binop!(as_u64, from_u64, wrapping_sub),
            Instruction::I64Mul => binop!(as_u64, from_u64, wrapping_mul),
            Instruction::End => break,
            _ => return Err(ConstError::Other(ValidationError::new(CONST_EXP_REQUIRED).into())),
        }
    }
    stack.pop().ok_or(ConstError::Other(ValidationError::new(CONST_EXP_REQUIRED).into()))
}
