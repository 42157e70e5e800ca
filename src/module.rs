use crate::instruction::Instruction;
use crate::types::*;

// ---------------- Import/Export related ----------------
#[derive(Clone, Debug, PartialEq)]
pub struct Import {
    pub module: String,
    pub field: String,
    pub desc: ImportDesc,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImportDesc {
    Func(u32),
    Table(TableType),
    Memory(MemoryType),
    Global(GlobalType),
}

impl ImportDesc {
    pub fn kind(&self) -> ExternKind {
        match self {
            ImportDesc::Func(_) => ExternKind::Func,
            ImportDesc::Table(_) => ExternKind::Table,
            ImportDesc::Memory(_) => ExternKind::Memory,
            ImportDesc::Global(_) => ExternKind::Global,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExternKind,
    pub index: u32,
}

// ---------------- Structures ----------------
/// Constant initializer expression, terminated by `end`.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstExpr(pub Vec<Instruction>);

#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub ty: GlobalType,
    pub init: ConstExpr,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ElementMode {
    Passive,
    Active { table: u32, offset: ConstExpr },
    Declarative,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElementSegment {
    pub ty: RefType,
    /// Each item is a constant expression producing one reference; plain
    /// function-index lists are decoded as `ref.func` expressions.
    pub items: Vec<ConstExpr>,
    pub mode: ElementMode,
}

#[derive(Clone, Debug, PartialEq)]
pub enum DataMode {
    Passive,
    Active { memory: u32, offset: ConstExpr },
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataSegment {
    pub init: Vec<u8>,
    pub mode: DataMode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionBody {
    /// Declared locals, parameters excluded.
    pub locals: Vec<ValType>,
    pub body: Vec<Instruction>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
}

// ---------------- Module Structure ----------------
/// Decoded module. Index spaces list imports first, then local definitions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub types: Vec<FuncType>,
    pub imports: Vec<Import>,
    /// Type index of each locally defined function.
    pub funcs: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<Global>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    pub data_count: Option<u32>,
    pub code: Vec<FunctionBody>,
    pub data: Vec<DataSegment>,
    pub customs: Vec<CustomSection>,
}

impl Module {
    pub const MAX_PAGES: u32 = 65536;
    pub const MAX_LOCALS: u64 = 50000;

    fn imported(&self, kind: ExternKind) -> impl Iterator<Item = &ImportDesc> + '_ {
        self.imports.iter().map(|i| &i.desc).filter(move |d| d.kind() == kind)
    }

    pub fn num_imported_funcs(&self) -> u32 {
        self.imported(ExternKind::Func).count() as u32
    }

    /// Type index of every function in the function index space.
    pub fn func_type_indices(&self) -> Vec<u32> {
        self.imported(ExternKind::Func)
            .filter_map(|d| match d { ImportDesc::Func(t) => Some(*t), _ => None })
            .chain(self.funcs.iter().copied())
            .collect()
    }

    pub fn table_types(&self) -> Vec<TableType> {
        self.imported(ExternKind::Table)
            .filter_map(|d| match d { ImportDesc::Table(t) => Some(*t), _ => None })
            .chain(self.tables.iter().copied())
            .collect()
    }

    pub fn memory_types(&self) -> Vec<MemoryType> {
        self.imported(ExternKind::Memory)
            .filter_map(|d| match d { ImportDesc::Memory(m) => Some(*m), _ => None })
            .chain(self.memories.iter().copied())
            .collect()
    }

    pub fn global_types(&self) -> Vec<GlobalType> {
        self.imported(ExternKind::Global)
            .filter_map(|d| match d { ImportDesc::Global(g) => Some(*g), _ => None })
            .chain(self.globals.iter().map(|g| g.ty))
            .collect()
    }

    pub fn func_type(&self, func_idx: u32) -> Option<&FuncType> {
        let n_imported = self.num_imported_funcs();
        let type_idx = if func_idx < n_imported {
            match self.imported(ExternKind::Func).nth(func_idx as usize) {
                Some(ImportDesc::Func(t)) => *t,
                _ => return None,
            }
        } else {
            *self.funcs.get((func_idx - n_imported) as usize)?
        };
        self.types.get(type_idx as usize)
    }

    /// Parameter and result counts of a block type. Only meaningful on validated modules.
    pub fn block_arity(&self, ty: BlockType) -> (usize, usize) {
        match ty {
            BlockType::Empty => (0, 0),
            BlockType::Value(_) => (0, 1),
            BlockType::Func(idx) => self
                .types
                .get(idx as usize)
                .map(|t| (t.params.len(), t.results.len()))
                .unwrap_or((0, 0)),
        }
    }
}
