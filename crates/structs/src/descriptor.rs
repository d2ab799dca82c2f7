//! Layout metadata for wire structs.

use crate::error::{Result, StructError};

/// Integer widths the wire format defines (byte, short, int).
pub const SUPPORTED_INT_WIDTHS: [u8; 3] = [1, 2, 4];

/// The kind of a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// Unsigned big-endian integer of `width` bytes
    Int { width: u8 },
    /// Variable-length byte array, always paired with a length field
    Bytes,
    /// Embedded struct resolved by name through the registry
    Struct(&'static str),
}

/// One field of a struct layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Set on integer fields that carry the byte length of a later field
    pub length_of: Option<&'static str>,
}

impl FieldDescriptor {
    pub fn is_length(&self) -> bool {
        self.length_of.is_some()
    }
}

/// Ordered field layout of a wire struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDescriptor {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl StructDescriptor {
    pub fn builder(name: &'static str) -> StructDescriptorBuilder {
        StructDescriptorBuilder {
            name,
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The length field paired with `target`, if any.
    pub fn length_field_for(&self, target: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.length_of == Some(target))
    }

    /// Check the layout rules that do not need other descriptors.
    ///
    /// Every length field must be an integer of a supported width that
    /// precedes its target, targets must be byte arrays or structs, and every
    /// byte array must be paired with exactly one length field.
    pub fn check(&self) -> Result<()> {
        for (index, field) in self.fields.iter().enumerate() {
            if self.fields[..index].iter().any(|f| f.name == field.name) {
                return Err(StructError::conversion(format!(
                    "{}: duplicate field '{}'",
                    self.name, field.name
                )));
            }

            if let FieldKind::Int { width } = field.kind {
                if !SUPPORTED_INT_WIDTHS.contains(&width) {
                    return Err(StructError::conversion(format!(
                        "{}.{}: unsupported integer width of {} bytes",
                        self.name, field.name, width
                    )));
                }
            }

            if let Some(target) = field.length_of {
                if !matches!(field.kind, FieldKind::Int { .. }) {
                    return Err(StructError::conversion(format!(
                        "{}.{}: length field must be an integer",
                        self.name, field.name
                    )));
                }
                let target_index = self
                    .fields
                    .iter()
                    .position(|f| f.name == target)
                    .ok_or_else(|| {
                        StructError::conversion(format!(
                            "{}.{}: length of unknown field '{}'",
                            self.name, field.name, target
                        ))
                    })?;
                if target_index <= index {
                    return Err(StructError::conversion(format!(
                        "{}.{}: length field must precede '{}'",
                        self.name, field.name, target
                    )));
                }
                if matches!(self.fields[target_index].kind, FieldKind::Int { .. }) {
                    return Err(StructError::conversion(format!(
                        "{}.{}: '{}' is an integer and cannot be length-prefixed",
                        self.name, field.name, target
                    )));
                }
            }
        }

        for field in &self.fields {
            let pairings = self
                .fields
                .iter()
                .filter(|f| f.length_of == Some(field.name))
                .count();
            if pairings > 1 {
                return Err(StructError::conversion(format!(
                    "{}.{}: paired with {} length fields",
                    self.name, field.name, pairings
                )));
            }
            if field.kind == FieldKind::Bytes && pairings == 0 {
                return Err(StructError::conversion(format!(
                    "{}.{}: byte array has no length field",
                    self.name, field.name
                )));
            }
        }

        Ok(())
    }
}

/// Builder for [`StructDescriptor`], fields appended in wire order.
#[derive(Debug)]
pub struct StructDescriptorBuilder {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
}

impl StructDescriptorBuilder {
    pub fn int(mut self, name: &'static str, width: u8) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind: FieldKind::Int { width },
            length_of: None,
        });
        self
    }

    /// Integer holding the byte length of `of`.
    pub fn length(mut self, name: &'static str, width: u8, of: &'static str) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind: FieldKind::Int { width },
            length_of: Some(of),
        });
        self
    }

    pub fn bytes(mut self, name: &'static str) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind: FieldKind::Bytes,
            length_of: None,
        });
        self
    }

    pub fn embedded(mut self, name: &'static str, struct_name: &'static str) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind: FieldKind::Struct(struct_name),
            length_of: None,
        });
        self
    }

    pub fn build(self) -> StructDescriptor {
        StructDescriptor {
            name: self.name,
            fields: self.fields,
        }
    }
}
