//! Dynamic field values exchanged with the codec.

use crate::error::{Result, StructError};
use std::collections::BTreeMap;

/// A decoded (or to-be-encoded) field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(u32),
    Bytes(Vec<u8>),
    Struct(Record),
}

/// Field values of one struct, keyed by field name.
///
/// Derived length fields never appear in a record. An optional embedded
/// struct is represented by the absence of its key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_int(mut self, name: &str, value: u32) -> Self {
        self.values.insert(name.to_string(), Value::Int(value));
        self
    }

    pub fn with_bytes(mut self, name: &str, value: &[u8]) -> Self {
        self.values
            .insert(name.to_string(), Value::Bytes(value.to_vec()));
        self
    }

    pub fn with_struct(mut self, name: &str, value: Record) -> Self {
        self.values.insert(name.to_string(), Value::Struct(value));
        self
    }

    pub fn with_optional_struct(self, name: &str, value: Option<Record>) -> Self {
        match value {
            Some(record) => self.with_struct(name, record),
            None => self,
        }
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn int(&self, name: &str) -> Result<u32> {
        match self.values.get(name) {
            Some(Value::Int(v)) => Ok(*v),
            Some(_) => Err(mismatch(name, "an integer")),
            None => Err(missing(name)),
        }
    }

    pub fn u16(&self, name: &str) -> Result<u16> {
        let value = self.int(name)?;
        u16::try_from(value).map_err(|_| {
            StructError::conversion(format!("field '{}' value {} exceeds 16 bits", name, value))
        })
    }

    /// Remove and return a byte array field.
    pub fn take_bytes(&mut self, name: &str) -> Result<Vec<u8>> {
        match self.values.remove(name) {
            Some(Value::Bytes(v)) => Ok(v),
            Some(_) => Err(mismatch(name, "a byte array")),
            None => Err(missing(name)),
        }
    }

    /// Remove and return a required embedded struct.
    pub fn take_struct(&mut self, name: &str) -> Result<Record> {
        self.take_optional_struct(name)?.ok_or_else(|| missing(name))
    }

    /// Remove and return an embedded struct that may be absent.
    pub fn take_optional_struct(&mut self, name: &str) -> Result<Option<Record>> {
        match self.values.remove(name) {
            Some(Value::Struct(r)) => Ok(Some(r)),
            Some(_) => Err(mismatch(name, "a struct")),
            None => Ok(None),
        }
    }
}

fn missing(name: &str) -> StructError {
    StructError::conversion(format!("record is missing field '{}'", name))
}

fn mismatch(name: &str, expected: &str) -> StructError {
    StructError::conversion(format!("field '{}' is not {}", name, expected))
}
