//! Schema registry built once at startup.

use crate::descriptor::{FieldKind, StructDescriptor};
use crate::error::{Result, StructError};
use crate::record::Record;
use std::collections::{HashMap, HashSet};

/// A typed message with a registered wire layout.
pub trait WireStruct: Sized {
    /// Registry key of the layout.
    const NAME: &'static str;

    fn descriptor() -> StructDescriptor;

    /// Field values for encoding. Byte arrays are copied.
    fn to_record(&self) -> Record;

    fn from_record(record: Record) -> Result<Self>;
}

/// Validated set of struct layouts, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    descriptors: HashMap<&'static str, StructDescriptor>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder {
            descriptors: Vec::new(),
        }
    }

    /// Registry holding every provisioning wire message.
    pub fn provisioning() -> Result<Self> {
        use crate::messages::*;

        Self::builder()
            .register::<SymmetricSubParams>()
            .register::<SymmetricKeyParams>()
            .register::<SymmetricAttestation>()
            .register::<IdentityRequestEnvelope>()
            .register::<IdentityResponseEnvelope>()
            .register::<CertificateRequestEnvelope>()
            .register::<CertificateResponseEnvelope>()
            .build()
    }

    pub fn get(&self, name: &str) -> Result<&StructDescriptor> {
        self.descriptors.get(name).ok_or_else(|| {
            StructError::conversion(format!("no layout registered for '{}'", name))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Collects descriptors and validates them as a set.
#[derive(Debug)]
pub struct SchemaRegistryBuilder {
    descriptors: Vec<StructDescriptor>,
}

impl SchemaRegistryBuilder {
    pub fn register<T: WireStruct>(self) -> Self {
        self.descriptor(T::descriptor())
    }

    pub fn descriptor(mut self, descriptor: StructDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Validate every layout and the references between them.
    pub fn build(self) -> Result<SchemaRegistry> {
        let mut descriptors = HashMap::new();
        for descriptor in self.descriptors {
            descriptor.check()?;
            let name = descriptor.name();
            if descriptors.insert(name, descriptor).is_some() {
                return Err(StructError::conversion(format!(
                    "layout '{}' registered twice",
                    name
                )));
            }
        }

        for descriptor in descriptors.values() {
            for field in descriptor.fields() {
                if let FieldKind::Struct(target) = field.kind {
                    if !descriptors.contains_key(target) {
                        return Err(StructError::conversion(format!(
                            "{}.{}: embedded layout '{}' is not registered",
                            descriptor.name(),
                            field.name,
                            target
                        )));
                    }
                }
            }
        }

        for name in descriptors.keys() {
            let mut visiting = HashSet::new();
            check_required_cycle(&descriptors, *name, &mut visiting)?;
        }

        Ok(SchemaRegistry { descriptors })
    }
}

/// Reject layouts that embed themselves through non-optional fields,
/// which could never be encoded in finite space.
fn check_required_cycle(
    descriptors: &HashMap<&'static str, StructDescriptor>,
    name: &'static str,
    visiting: &mut HashSet<&'static str>,
) -> Result<()> {
    if !visiting.insert(name) {
        return Err(StructError::conversion(format!(
            "layout '{}' embeds itself",
            name
        )));
    }
    if let Some(descriptor) = descriptors.get(name) {
        for field in descriptor.fields() {
            if let FieldKind::Struct(target) = field.kind {
                if descriptor.length_field_for(field.name).is_none() {
                    check_required_cycle(descriptors, target, visiting)?;
                }
            }
        }
    }
    visiting.remove(name);
    Ok(())
}
