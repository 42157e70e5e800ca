use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::store::FuncAddr;
use crate::types::{RefType, ValType};

/// Untyped 64-bit operand cell. Validation guarantees how each cell is read.
/// References use 0 for null and `index + 1` otherwise.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WasmValue(pub u64);

impl WasmValue {
    pub const NULL: Self = Self(0);

    #[inline] pub fn from_i32(v: i32) -> Self { Self(v as u32 as u64) }
    #[inline] pub fn as_i32(self) -> i32 { self.0 as u32 as i32 }
    #[inline] pub fn from_u32(v: u32) -> Self { Self(v as u64) }
    #[inline] pub fn as_u32(self) -> u32 { self.0 as u32 }
    #[inline] pub fn from_i64(v: i64) -> Self { Self(v as u64) }
    #[inline] pub fn as_i64(self) -> i64 { self.0 as i64 }
    #[inline] pub fn from_u64(v: u64) -> Self { Self(v) }
    #[inline] pub fn as_u64(self) -> u64 { self.0 }
    #[inline] pub fn from_f32_bits(bits: u32) -> Self { Self(bits as u64) }
    #[inline] pub fn as_f32_bits(self) -> u32 { self.0 as u32 }
    #[inline] pub fn from_f64_bits(bits: u64) -> Self { Self(bits) }
    #[inline] pub fn as_f64_bits(self) -> u64 { self.0 }
    #[inline] pub fn from_f32(v: f32) -> Self { Self::from_f32_bits(v.to_bits()) }
    #[inline] pub fn as_f32(self) -> f32 { f32::from_bits(self.as_f32_bits()) }
    #[inline] pub fn from_f64(v: f64) -> Self { Self::from_f64_bits(v.to_bits()) }
    #[inline] pub fn as_f64(self) -> f64 { f64::from_bits(self.as_f64_bits()) }

    #[inline] pub fn from_ref(idx: Option<u32>) -> Self { Self(idx.map_or(0, |i| i as u64 + 1)) }
    #[inline] pub fn as_ref(self) -> Option<u32> { self.0.checked_sub(1).map(|i| i as u32) }
    #[inline] pub fn is_null(self) -> bool { self.0 == 0 }

    /// Re-attaches a type tag.
    pub fn typed(self, ty: ValType) -> Value {
        match ty {
            ValType::I32 => Value::I32(self.as_i32()),
            ValType::I64 => Value::I64(self.as_i64()),
            ValType::F32 => Value::F32(self.as_f32_bits()),
            ValType::F64 => Value::F64(self.as_f64_bits()),
            ValType::FuncRef => Value::FuncRef(self.as_ref().map(FuncAddr)),
            ValType::ExternRef => Value::ExternRef(self.as_ref()),
        }
    }
}

/// Typed value crossing the embedding API. Floats are stored as raw bits so
/// NaN payloads survive unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    FuncRef(Option<FuncAddr>),
    ExternRef(Option<u32>),
}

impl Value {
    pub fn f32(v: f32) -> Self { Value::F32(v.to_bits()) }
    pub fn f64(v: f64) -> Self { Value::F64(v.to_bits()) }

    pub fn null(ty: RefType) -> Self {
        match ty {
            RefType::FuncRef => Value::FuncRef(None),
            RefType::ExternRef => Value::ExternRef(None),
        }
    }

    pub fn ty(&self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
            Value::FuncRef(_) => ValType::FuncRef,
            Value::ExternRef(_) => ValType::ExternRef,
        }
    }

    /// Zero value of a type, used for locals and fresh table slots.
    pub fn default_of(ty: ValType) -> Self {
        WasmValue::default().typed(ty)
    }

    pub fn raw(&self) -> WasmValue {
        match *self {
            Value::I32(v) => WasmValue::from_i32(v),
            Value::I64(v) => WasmValue::from_i64(v),
            Value::F32(bits) => WasmValue::from_f32_bits(bits),
            Value::F64(bits) => WasmValue::from_f64_bits(bits),
            Value::FuncRef(addr) => WasmValue::from_ref(addr.map(|a| a.0)),
            Value::ExternRef(r) => WasmValue::from_ref(r),
        }
    }

    pub fn as_i32(&self) -> Option<i32> { if let Value::I32(v) = self { Some(*v) } else { None } }
    pub fn as_i64(&self) -> Option<i64> { if let Value::I64(v) = self { Some(*v) } else { None } }
    pub fn as_f32(&self) -> Option<f32> { if let Value::F32(b) = self { Some(f32::from_bits(*b)) } else { None } }
    pub fn as_f64(&self) -> Option<f64> { if let Value::F64(b) = self { Some(f64::from_bits(*b)) } else { None } }

    /// Parses `"<value>:<type>"`, e.g. `42:i32` or `1.5:f64`. A bare number is an i32.
    pub fn parse(text: &str) -> Option<Value> {
        let (v, ty) = text.split_once(':').unwrap_or((text, "i32"));
        Some(match ty {
            "i32" => Value::I32(v.parse::<i32>().or_else(|_| v.parse::<u32>().map(|u| u as i32)).ok()?),
            "i64" => Value::I64(v.parse::<i64>().or_else(|_| v.parse::<u64>().map(|u| u as i64)).ok()?),
            "f32" => Value::f32(v.parse().ok()?),
            "f64" => Value::f64(v.parse().ok()?),
            "funcref" if v == "null" => Value::FuncRef(None),
            "externref" if v == "null" => Value::ExternRef(None),
            "externref" => Value::ExternRef(Some(v.parse().ok()?)),
            _ => return None,
        })
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{v}:i32"),
            Value::I64(v) => write!(f, "{v}:i64"),
            Value::F32(b) => write!(f, "{}:f32", f32::from_bits(*b)),
            Value::F64(b) => write!(f, "{}:f64", f64::from_bits(*b)),
            Value::FuncRef(None) => f.write_str("null:funcref"),
            Value::FuncRef(Some(a)) => write!(f, "func#{}:funcref", a.0),
            Value::ExternRef(None) => f.write_str("null:externref"),
            Value::ExternRef(Some(r)) => write!(f, "{r}:externref"),
        }
    }
}

impl From<i32> for Value { fn from(v: i32) -> Self { Value::I32(v) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::I64(v) } }
impl From<f32> for Value { fn from(v: f32) -> Self { Value::f32(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::f64(v) } }
