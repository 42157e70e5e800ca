#![deny(unsafe_code)]

mod byte_iter;
mod leb128;

pub mod config;
pub mod decoder;
pub mod error;
pub mod instantiate;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod module;
pub mod store;
pub mod table;
pub mod types;
pub mod validator;
pub mod value;
pub mod vm;

pub use config::{Config, Features};
pub use decoder::decode;
pub use error::{DecodeError, Error, InvocationError, LinkError, Trap, TrapKind, ValidationError};
pub use instantiate::{instantiate, instantiate_with, Imports};
pub use interpreter::Interpreter;
pub use module::Module;
pub use store::{Extern, FuncAddr, GlobalAddr, InstanceHandle, MemAddr, Store, TableAddr};
pub use types::{FuncType, GlobalType, Limits, MemoryType, RefType, TableType, ValType};
pub use validator::{validate, ValidModule, Validator};
pub use value::{Value, WasmValue};
pub use vm::Vm;
