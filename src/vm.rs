use std::path::Path;

use tracing::{debug, info};

use crate::config::Config;
use crate::decoder::decode;
use crate::error::*;
use crate::instantiate::{instantiate_with, Imports};
use crate::interpreter::Interpreter;
use crate::module::Module;
use crate::store::*;
use crate::types::FuncType;
use crate::validator::{ValidModule, Validator};
use crate::value::Value;

/// Where the VM is in the load, validate, instantiate pipeline.
#[derive(Debug, Default)]
enum Stage {
    #[default]
    Empty,
    Loaded(Module),
    Validated(ValidModule),
    Instantiated(InstanceHandle),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Stage::Empty => "empty",
            Stage::Loaded(_) => "loaded",
            Stage::Validated(_) => "validated",
            Stage::Instantiated(_) => "instantiated",
        }
    }
}

/// Drives one module at a time through decoding, validation, instantiation
/// and invocation against an owned [`Store`]. Modules registered by name stay
/// importable for every later instantiation.
pub struct Vm {
    config: Config,
    store: Store,
    imports: Imports,
    stage: Stage,
}

impl Vm {
    pub fn new(config: Config) -> Self {
        let store = Store::new(&config);
        Self::with_store(config, store)
    }

    pub fn with_store(config: Config, store: Store) -> Self {
        Self { config, store, imports: Imports::new(), stage: Stage::Empty }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    /// Handle of the active instance, if the last module got that far.
    pub fn active_instance(&self) -> Option<InstanceHandle> {
        match self.stage {
            Stage::Instantiated(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn load_wasm_from_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let module = decode(bytes)?;
        self.stage = Stage::Loaded(module);
        Ok(())
    }

    pub fn load_wasm_from_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let bytes = read_file(path.as_ref())?;
        self.load_wasm_from_bytes(&bytes)
    }

    pub fn validate(&mut self) -> Result<(), Error> {
        match std::mem::take(&mut self.stage) {
            Stage::Loaded(module) => {
                let valid = Validator::new(&self.config.features).validate(module)?;
                self.stage = Stage::Validated(valid);
                Ok(())
            }
            other => {
                let actual = other.name();
                self.stage = other;
                Err(InvocationError::WrongStage("validate", actual).into())
            }
        }
    }

    pub fn instantiate(&mut self) -> Result<InstanceHandle, Error> {
        let module = match &self.stage {
            Stage::Validated(valid) => valid.clone(),
            other => return Err(InvocationError::WrongStage("instantiate", other.name()).into()),
        };
        let handle = instantiate_with(&mut self.store, &module, &self.imports, &self.config)?;
        self.stage = Stage::Instantiated(handle);
        Ok(handle)
    }

    /// Invokes an exported function of the active instance.
    pub fn execute(&mut self, export: &str, args: &[Value]) -> Result<Vec<Value>, Error> {
        let func = self.exported_func(export)?;
        Interpreter::new(&self.config).invoke(&mut self.store, func, args)
    }

    pub fn run_wasm_from_bytes(&mut self, bytes: &[u8], export: &str, args: &[Value]) -> Result<Vec<Value>, Error> {
        self.load_wasm_from_bytes(bytes)?;
        self.validate()?;
        self.instantiate()?;
        self.execute(export, args)
    }

    pub fn run_wasm_from_file(
        &mut self,
        path: impl AsRef<Path>,
        export: &str,
        args: &[Value],
    ) -> Result<Vec<Value>, Error> {
        let bytes = read_file(path.as_ref())?;
        self.run_wasm_from_bytes(&bytes, export, args)
    }

    /// Decodes, validates and instantiates `bytes`, then makes its exports
    /// importable as `name`. The active module is left untouched.
    pub fn register_module(&mut self, name: &str, bytes: &[u8]) -> Result<InstanceHandle, Error> {
        let module = Validator::new(&self.config.features).validate(decode(bytes)?)?;
        let handle = instantiate_with(&mut self.store, &module, &self.imports, &self.config)?;
        self.imports.define_instance(&self.store, name, handle)?;
        info!(name, instance = handle.0, "registered module");
        Ok(handle)
    }

    pub fn register_host_function<F>(&mut self, module: &str, field: &str, ty: FuncType, callback: F) -> FuncAddr
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, Trap> + Send + Sync + 'static,
    {
        debug!(module, field, %ty, "registered host function");
        let addr = self.store.alloc_host_func(ty, callback);
        self.imports.define(module, field, Extern::Func(addr));
        addr
    }

    pub fn register_extern(&mut self, module: &str, field: &str, ext: Extern) {
        self.imports.define(module, field, ext);
    }

    pub fn get_function_type(&self, export: &str) -> Result<&FuncType, Error> {
        let func = self.exported_func(export)?;
        Ok(self.store.func_type(func).ok_or(InvocationError::InvalidHandle)?)
    }

    /// Exported functions of the active instance with their types, in export order.
    pub fn exported_functions(&self) -> Result<Vec<(String, FuncType)>, Error> {
        let inst = self.active()?;
        Ok(inst
            .exports
            .iter()
            .filter_map(|(name, ext)| match ext {
                Extern::Func(addr) => Some((name.clone(), self.store.func_type(*addr)?.clone())),
                _ => None,
            })
            .collect())
    }

    fn active(&self) -> Result<&ModuleInst, Error> {
        let handle = self.active_instance().ok_or(InvocationError::NoActiveInstance)?;
        Ok(self.store.instance(handle).ok_or(InvocationError::InvalidHandle)?)
    }

    fn exported_func(&self, export: &str) -> Result<FuncAddr, Error> {
        match self.active()?.export(export) {
            Some(Extern::Func(addr)) => Ok(addr),
            Some(_) => Err(InvocationError::NotAFunction(export.to_owned()).into()),
            None => Err(InvocationError::ExportNotFound(export.to_owned()).into()),
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })
}
