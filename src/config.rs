use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Post-MVP proposals the validator accepts. Everything defaults to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub multi_value: bool,
    pub reference_types: bool,
    pub bulk_memory: bool,
    pub sign_extension: bool,
    pub saturating_float_to_int: bool,
    pub mutable_globals: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            multi_value: true,
            reference_types: true,
            bulk_memory: true,
            sign_extension: true,
            saturating_float_to_int: true,
            mutable_globals: true,
        }
    }
}

impl Features {
    pub fn mvp() -> Self {
        Self {
            multi_value: false,
            reference_types: false,
            bulk_memory: false,
            sign_extension: false,
            saturating_float_to_int: false,
            mutable_globals: false,
        }
    }

    /// Turns one proposal off by its kebab-case or snake_case name.
    pub fn disable(&mut self, name: &str) -> bool {
        let flag = match name.replace('-', "_").as_str() {
            "multi_value" => &mut self.multi_value,
            "reference_types" => &mut self.reference_types,
            "bulk_memory" => &mut self.bulk_memory,
            "sign_extension" => &mut self.sign_extension,
            "saturating_float_to_int" => &mut self.saturating_float_to_int,
            "mutable_globals" => &mut self.mutable_globals,
            _ => return false,
        };
        *flag = false;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub features: Features,
    /// Nested calls allowed before `call stack exhausted`.
    pub max_call_depth: usize,
    /// Growth ceiling for every memory, in pages.
    pub max_memory_pages: u32,
    /// Growth ceiling for every table, in elements.
    pub max_table_elements: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            features: Features::default(),
            max_call_depth: 10_000,
            max_memory_pages: 65536,
            max_table_elements: 10_000_000,
        }
    }
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text)
    }
}
