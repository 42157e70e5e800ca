use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{ExternKind, ValType};

// Malformed errors
pub const DATA_COUNT_MISMATCH: &str = "data count and data section have inconsistent lengths";
pub const DATA_COUNT_REQUIRED: &str = "data count section required";
pub const DUPLICATE_SECTION: &str = "duplicate section";
pub const END_EXPECTED: &str = "END opcode expected";
pub const FUNC_CODE_INCONSISTENT: &str = "function and code section have inconsistent lengths";
pub const ILLEGAL_OP: &str = "illegal opcode";
pub const INT_TOO_LARGE: &str = "integer too large";
pub const INT_TOO_LONG: &str = "integer representation too long";
pub const MALFORMED_FUNC_TYPE: &str = "malformed function type";
pub const INVALID_MUTABILITY: &str = "malformed mutability";
pub const INVALID_SECTION_ID: &str = "malformed section id";
pub const INVALID_UTF8: &str = "malformed UTF-8 encoding";
pub const INVALID_VALUE_TYPE: &str = "invalid value type";
pub const LENGTH_OUT_OF_BOUNDS: &str = "length out of bounds";
pub const MALFORMED_ELEM_KIND: &str = "malformed element kind";
pub const MALFORMED_IMPORT_KIND: &str = "malformed import kind";
pub const MALFORMED_EXPORT_KIND: &str = "malformed export kind";
pub const MALFORMED_LIMITS_FLAGS: &str = "malformed limits flags";
pub const MALFORMED_REF_TYPE: &str = "malformed reference type";
pub const MALFORMED_SEGMENT_FLAGS: &str = "malformed segment flags";
pub const NO_MAGIC_HEADER: &str = "magic header not detected";
pub const SECTION_OUT_OF_ORDER: &str = "unexpected content after last section";
pub const SECTION_SIZE_MISMATCH: &str = "section size mismatch";
pub const TOO_MANY_LOCALS: &str = "too many locals";
pub const UNEXPECTED_ELSE: &str = "else must close an if";
pub const UNEXPECTED_END: &str = "unexpected end of section or function";
pub const UNEXPECTED_END_SHORT: &str = "unexpected end";
pub const UNKNOWN_BINARY_VERSION: &str = "unknown binary version";
pub const ZERO_FLAG_EXPECTED: &str = "zero byte expected";
// Validation errors
pub const ALIGNMENT_TOO_LARGE: &str = "alignment must not be larger than natural";
pub const CONST_EXP_REQUIRED: &str = "constant expression required";
pub const DUP_EXPORT_NAME: &str = "duplicate export name";
pub const FEATURE_DISABLED: &str = "instruction requires a disabled feature";
pub const GLOBAL_IS_IMMUTABLE: &str = "global is immutable";
pub const INVALID_RESULT_ARITY: &str = "invalid result arity";
pub const MEMORY_SIZE_LIMIT: &str = "memory size must be at most 65536 pages (4GiB)";
pub const MIN_GREATER_THAN_MAX: &str = "size minimum must not be greater than maximum";
pub const MULTIPLE_MEMORIES: &str = "multiple memories";
pub const MULTIPLE_TABLES: &str = "multiple tables";
pub const START_FUNC: &str = "start function";
pub const TYPE_MISMATCH: &str = "type mismatch";
pub const UNDECLARED_FUNC_REF: &str = "undeclared function reference";
pub const UNKNOWN_DATA: &str = "unknown data segment";
pub const UNKNOWN_ELEM: &str = "unknown elem segment";
pub const UNKNOWN_FUNC: &str = "unknown function";
pub const UNKNOWN_GLOBAL: &str = "unknown global";
pub const UNKNOWN_LABEL: &str = "unknown label";
pub const UNKNOWN_LOCAL: &str = "unknown local";
pub const UNKNOWN_MEMORY: &str = "unknown memory";
pub const UNKNOWN_TABLE: &str = "unknown table";
pub const UNKNOWN_TYPE: &str = "unknown type";

/// Malformed binary: the bytes are not a WebAssembly module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at byte {offset:#x})")]
pub struct DecodeError {
    pub offset: usize,
    pub message: &'static str,
}

impl DecodeError {
    pub fn new(offset: usize, message: &'static str) -> Self {
        Self { offset, message }
    }
}

/// A module that decoded fine but is not well-typed or references unknown entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: &'static str,
    /// Function index (in the function index space) whose body failed.
    pub func: Option<u32>,
    /// Instruction index inside that body.
    pub offset: Option<usize>,
    pub expected: Option<ValType>,
    pub actual: Option<ValType>,
}

impl ValidationError {
    pub fn new(message: &'static str) -> Self {
        Self { message, func: None, offset: None, expected: None, actual: None }
    }

    pub fn mismatch(expected: Option<ValType>, actual: Option<ValType>) -> Self {
        Self { expected, actual, ..Self::new(TYPE_MISMATCH) }
    }

    pub fn at(mut self, func: u32, offset: usize) -> Self {
        self.func.get_or_insert(func);
        self.offset.get_or_insert(offset);
        self
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message)?;
        if let (Some(func), Some(offset)) = (self.func, self.offset) {
            write!(f, " in function {func} at instruction {offset}")?;
        }
        match (self.expected, self.actual) {
            (Some(e), Some(a)) => write!(f, ": expected {e}, found {a}"),
            (Some(e), None) => write!(f, ": expected {e}, found nothing"),
            (None, Some(a)) => write!(f, ": unexpected {a}"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("unknown import {module}.{field}")]
    UnknownImport { module: String, field: String },
    #[error("incompatible import type for {module}.{field}: {reason}")]
    IncompatibleImport { module: String, field: String, reason: &'static str },
    #[error("global {global} initializer reads global {referenced} before it is allocated")]
    GlobalForwardReference { global: u32, referenced: u32 },
    #[error("{kind} minimum of {min} exceeds the configured limit of {limit}")]
    LimitExceeded { kind: ExternKind, min: u32, limit: u32 },
    #[error("out of memory allocating {kind} of minimum size {min}")]
    OutOfMemory { kind: ExternKind, min: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrapKind {
    #[error("unreachable")]
    Unreachable,
    #[error("integer divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversion,
    #[error("out of bounds memory access")]
    MemoryOutOfBounds,
    #[error("out of bounds table access")]
    TableOutOfBounds,
    #[error("undefined element")]
    UndefinedElement,
    #[error("uninitialized element")]
    UninitializedElement,
    #[error("indirect call type mismatch")]
    IndirectCallTypeMismatch,
    #[error("call stack exhausted")]
    CallStackExhausted,
    #[error("host function returned values not matching its type")]
    HostResultMismatch,
    #[error("{0}")]
    Host(String),
}

/// Runtime fault. Aborts the invocation; the store stays usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trap {
    pub kind: TrapKind,
    /// Function index (within its module) executing when the trap fired.
    pub func: Option<u32>,
    pub offset: Option<usize>,
}

impl Trap {
    pub fn host(message: impl Into<String>) -> Self {
        TrapKind::Host(message.into()).into()
    }
}

impl From<TrapKind> for Trap {
    fn from(kind: TrapKind) -> Self {
        Self { kind, func: None, offset: None }
    }
}

impl Display for Trap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let (Some(func), Some(offset)) = (self.func, self.offset) {
            write!(f, " in function {func} at instruction {offset}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Trap {}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvocationError {
    #[error("argument mismatch: expected {expected:?}, got {actual:?}")]
    ArgumentMismatch { expected: Vec<ValType>, actual: Vec<ValType> },
    #[error("export {0} not found")]
    ExportNotFound(String),
    #[error("export {0} is not a function")]
    NotAFunction(String),
    #[error("no module has been instantiated")]
    NoActiveInstance,
    #[error("stale or foreign store handle")]
    InvalidHandle,
    #[error("{0} called before the module was {1}")]
    WrongStage(&'static str, &'static str),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed module: {0}")]
    Decode(#[from] DecodeError),
    #[error("invalid module: {0}")]
    Validation(#[from] ValidationError),
    #[error("link error: {0}")]
    Link(#[from] LinkError),
    #[error("trap: {0}")]
    Trap(#[from] Trap),
    #[error("invocation error: {0}")]
    Invocation(#[from] InvocationError),
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<TrapKind> for Error {
    fn from(kind: TrapKind) -> Self {
        Error::Trap(kind.into())
    }
}

impl Error {
    pub fn trap_kind(&self) -> Option<&TrapKind> {
        match self {
            Error::Trap(t) => Some(&t.kind),
            _ => None,
        }
    }
}

#[inline(always)]
pub fn malformed<T>(offset: usize, msg: &'static str) -> Result<T, DecodeError> {
    Err(DecodeError::new(offset, msg))
}
#[inline(always)]
pub fn invalid<T>(msg: &'static str) -> Result<T, ValidationError> {
    Err(ValidationError::new(msg))
}
#[inline(always)]
pub fn trap<T>(kind: TrapKind) -> Result<T, TrapKind> {
    Err(kind)
}
