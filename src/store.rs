use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, InvocationError, Trap};
use crate::memory::MemoryInst;
use crate::module::{ImportDesc, Module};
use crate::table::TableInst;
use crate::types::*;
use crate::value::{Value, WasmValue};

macro_rules! addr {
    ($($(#[$doc:meta])* $name:ident),*) => {$(
        $(#[$doc])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub u32);
    )*};
}

addr!(
    /// Function in the store.
    FuncAddr,
    TableAddr,
    MemAddr,
    GlobalAddr,
    ElemAddr,
    DataAddr,
    /// Module instance in the store.
    InstanceHandle
);

/// Host callback: receives typed arguments, returns typed results or a trap.
pub type HostFunc = Arc<dyn Fn(&[Value]) -> Result<Vec<Value>, Trap> + Send + Sync>;

#[derive(Clone)]
pub enum FuncInst {
    Wasm {
        ty: FuncType,
        instance: InstanceHandle,
        module: Arc<Module>,
        /// Index into the module's code section.
        index: u32,
    },
    Host {
        ty: FuncType,
        callback: HostFunc,
    },
}

impl FuncInst {
    pub fn ty(&self) -> &FuncType {
        match self {
            FuncInst::Wasm { ty, .. } | FuncInst::Host { ty, .. } => ty,
        }
    }
}

impl Debug for FuncInst {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FuncInst::Wasm { ty, instance, index, .. } => {
                write!(f, "Wasm {{ ty: {ty}, instance: {}, index: {index} }}", instance.0)
            }
            FuncInst::Host { ty, .. } => write!(f, "Host {{ ty: {ty} }}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GlobalInst {
    pub ty: GlobalType,
    pub value: WasmValue,
}

/// Element segment contents; emptied by `elem.drop`.
#[derive(Debug, Clone)]
pub struct ElemInst {
    pub ty: RefType,
    pub elements: Vec<WasmValue>,
}

/// Data segment contents; emptied by `data.drop`.
#[derive(Debug, Clone)]
pub struct DataInst {
    pub bytes: Vec<u8>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Extern {
    Func(FuncAddr),
    Table(TableAddr),
    Memory(MemAddr),
    Global(GlobalAddr),
}

impl Extern {
    pub fn kind(&self) -> ExternKind {
        match self {
            Extern::Func(_) => ExternKind::Func,
            Extern::Table(_) => ExternKind::Table,
            Extern::Memory(_) => ExternKind::Memory,
            Extern::Global(_) => ExternKind::Global,
        }
    }
}

/// Runtime view of an instantiated module: its index spaces mapped to store addresses.
#[derive(Debug, Clone)]
pub struct ModuleInst {
    pub module: Arc<Module>,
    pub funcs: Vec<FuncAddr>,
    pub tables: Vec<TableAddr>,
    pub mems: Vec<MemAddr>,
    pub globals: Vec<GlobalAddr>,
    pub elems: Vec<ElemAddr>,
    pub datas: Vec<DataAddr>,
    /// Exports in declaration order.
    pub exports: Vec<(String, Extern)>,
}

impl ModuleInst {
    pub fn export(&self, name: &str) -> Option<Extern> {
        self.exports.iter().find(|(n, _)| n == name).map(|(_, e)| *e)
    }
}

/// Owns every runtime entity. Instances refer to each other only through addresses,
/// so entities shared through imports stay alive as long as the store does.
#[derive(Debug, Clone)]
pub struct Store {
    pub(crate) funcs: Vec<FuncInst>,
    pub(crate) tables: Vec<TableInst>,
    pub(crate) mems: Vec<MemoryInst>,
    pub(crate) globals: Vec<GlobalInst>,
    pub(crate) elems: Vec<ElemInst>,
    pub(crate) datas: Vec<DataInst>,
    pub(crate) instances: Vec<ModuleInst>,
    max_memory_pages: u32,
    max_table_elements: u32,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Store {
    pub fn new(config: &Config) -> Self {
        Self {
            funcs: Vec::new(),
            tables: Vec::new(),
            mems: Vec::new(),
            globals: Vec::new(),
            elems: Vec::new(),
            datas: Vec::new(),
            instances: Vec::new(),
            max_memory_pages: config.max_memory_pages,
            max_table_elements: config.max_table_elements,
        }
    }

    // ---------------- Allocation ----------------
    pub(crate) fn push_func(&mut self, func: FuncInst) -> FuncAddr {
        self.funcs.push(func);
        FuncAddr(self.funcs.len() as u32 - 1)
    }

    pub(crate) fn push_elem(&mut self, elem: ElemInst) -> ElemAddr {
        self.elems.push(elem);
        ElemAddr(self.elems.len() as u32 - 1)
    }

    pub(crate) fn push_data(&mut self, data: DataInst) -> DataAddr {
        self.datas.push(data);
        DataAddr(self.datas.len() as u32 - 1)
    }

    pub(crate) fn push_instance(&mut self, inst: ModuleInst) -> InstanceHandle {
        self.instances.push(inst);
        InstanceHandle(self.instances.len() as u32 - 1)
    }

    pub(crate) fn push_global_raw(&mut self, ty: GlobalType, value: WasmValue) -> GlobalAddr {
        self.globals.push(GlobalInst { ty, value });
        GlobalAddr(self.globals.len() as u32 - 1)
    }

    pub fn alloc_host_func<F>(&mut self, ty: FuncType, callback: F) -> FuncAddr
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, Trap> + Send + Sync + 'static,
    {
        self.push_func(FuncInst::Host { ty, callback: Arc::new(callback) })
    }

    /// Fails when the minimum exceeds the configured page limit or cannot be allocated.
    pub fn alloc_memory(&mut self, ty: MemoryType) -> Result<MemAddr, Error> {
        self.mems.push(MemoryInst::new(ty, self.max_memory_pages)?);
        Ok(MemAddr(self.mems.len() as u32 - 1))
    }

    /// New table with every slot null.
    pub fn alloc_table(&mut self, ty: TableType) -> Result<TableAddr, Error> {
        self.tables.push(TableInst::new(ty, WasmValue::NULL, self.max_table_elements)?);
        Ok(TableAddr(self.tables.len() as u32 - 1))
    }

    pub fn alloc_global(&mut self, ty: GlobalType, value: Value) -> Result<GlobalAddr, Error> {
        if value.ty() != ty.ty {
            return Err(InvocationError::ArgumentMismatch { expected: vec![ty.ty], actual: vec![value.ty()] }.into());
        }
        Ok(self.push_global_raw(ty, value.raw()))
    }

    // ---------------- Access ----------------
    pub fn func(&self, addr: FuncAddr) -> Option<&FuncInst> {
        self.funcs.get(addr.0 as usize)
    }

    pub fn func_type(&self, addr: FuncAddr) -> Option<&FuncType> {
        self.func(addr).map(FuncInst::ty)
    }

    pub fn memory(&self, addr: MemAddr) -> Option<&MemoryInst> {
        self.mems.get(addr.0 as usize)
    }

    pub fn memory_mut(&mut self, addr: MemAddr) -> Option<&mut MemoryInst> {
        self.mems.get_mut(addr.0 as usize)
    }

    pub fn table(&self, addr: TableAddr) -> Option<&TableInst> {
        self.tables.get(addr.0 as usize)
    }

    pub fn global(&self, addr: GlobalAddr) -> Option<&GlobalInst> {
        self.globals.get(addr.0 as usize)
    }

    pub fn global_value(&self, addr: GlobalAddr) -> Option<Value> {
        self.global(addr).map(|g| g.value.typed(g.ty.ty))
    }

    /// Host-side write; the global must be mutable and the value must match its type.
    pub fn set_global(&mut self, addr: GlobalAddr, value: Value) -> Result<(), Error> {
        let global = self.globals.get_mut(addr.0 as usize).ok_or(InvocationError::InvalidHandle)?;
        if value.ty() != global.ty.ty || !global.ty.mutable {
            return Err(InvocationError::ArgumentMismatch { expected: vec![global.ty.ty], actual: vec![value.ty()] }.into());
        }
        global.value = value.raw();
        Ok(())
    }

    pub fn read_memory(&self, addr: MemAddr, offset: u32, len: u32) -> Result<&[u8], Error> {
        let mem = self.memory(addr).ok_or(InvocationError::InvalidHandle)?;
        Ok(mem.read(offset, len).map_err(Trap::from)?)
    }

    pub fn write_memory(&mut self, addr: MemAddr, offset: u32, bytes: &[u8]) -> Result<(), Error> {
        let mem = self.memory_mut(addr).ok_or(InvocationError::InvalidHandle)?;
        mem.write(offset, bytes).map_err(Trap::from)?;
        Ok(())
    }

    pub fn instance(&self, handle: InstanceHandle) -> Option<&ModuleInst> {
        self.instances.get(handle.0 as usize)
    }

    pub fn export(&self, handle: InstanceHandle, name: &str) -> Option<Extern> {
        self.instance(handle)?.export(name)
    }

    /// Checks an external value against the type an importer declared for it.
    pub(crate) fn extern_matches(&self, ext: Extern, desc: &ImportDesc, module: &Module) -> Result<(), &'static str> {
        match (ext, desc) {
            (Extern::Func(a), ImportDesc::Func(type_idx)) => {
                let have = self.func_type(a).ok_or("dangling function")?;
                match module.types.get(*type_idx as usize) {
                    Some(want) if want == have => Ok(()),
                    _ => Err("function type mismatch"),
                }
            }
            (Extern::Table(a), ImportDesc::Table(want)) => {
                let have = self.table(a).ok_or("dangling table")?.ty();
                if have.elem != want.elem {
                    return Err("table element type mismatch");
                }
                if !have.limits.satisfies(&want.limits) {
                    return Err("table limits mismatch");
                }
                Ok(())
            }
            (Extern::Memory(a), ImportDesc::Memory(want)) => {
                let have = self.memory(a).ok_or("dangling memory")?.ty();
                if !have.limits.satisfies(&want.limits) {
                    return Err("memory limits mismatch");
                }
                Ok(())
            }
            (Extern::Global(a), ImportDesc::Global(want)) => {
                let have = self.global(a).ok_or("dangling global")?.ty;
                if have != *want {
                    return Err("global type mismatch");
                }
                Ok(())
            }
            _ => Err("incompatible import kind"),
        }
    }
}
