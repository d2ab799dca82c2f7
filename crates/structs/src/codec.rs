//! Encoder/decoder driven by registered layouts.

use crate::descriptor::{FieldKind, StructDescriptor};
use crate::error::{Result, StructError};
use crate::record::{Record, Value};
use crate::registry::{SchemaRegistry, WireStruct};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Stateless codec over a shared [`SchemaRegistry`].
///
/// Cloning is cheap and clones share the registry; every call allocates its
/// own buffers so a codec can be used from any number of threads.
#[derive(Debug, Clone)]
pub struct StructCodec {
    registry: Arc<SchemaRegistry>,
}

impl StructCodec {
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Codec over [`SchemaRegistry::provisioning`].
    pub fn provisioning() -> Result<Self> {
        Ok(Self::new(SchemaRegistry::provisioning()?))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn encode<T: WireStruct>(&self, value: &T) -> Result<Vec<u8>> {
        let descriptor = self.registry.get(T::NAME)?;
        self.encode_record(&value.to_record(), descriptor)
    }

    pub fn decode<T: WireStruct>(&self, bytes: &[u8]) -> Result<T> {
        let descriptor = self.registry.get(T::NAME)?;
        let record = self.decode_record(bytes, descriptor).map_err(|e| {
            debug!(layout = T::NAME, len = bytes.len(), error = %e, "Rejected wire message");
            e
        })?;
        T::from_record(record)
    }

    /// Encode `record` with `descriptor`, writing derived length fields.
    pub fn encode_record(&self, record: &Record, descriptor: &StructDescriptor) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_struct(record, descriptor, &mut out)?;
        Ok(out)
    }

    /// Decode a complete message. Trailing bytes are rejected.
    pub fn decode_record(&self, bytes: &[u8], descriptor: &StructDescriptor) -> Result<Record> {
        let mut reader = Reader::new(bytes);
        let record = self.read_struct(&mut reader, descriptor)?;
        if reader.remaining() != 0 {
            return Err(StructError::invalid(format!(
                "{}: {} trailing bytes after message",
                descriptor.name(),
                reader.remaining()
            )));
        }
        Ok(record)
    }

    fn write_struct(
        &self,
        record: &Record,
        descriptor: &StructDescriptor,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        for name in record.names() {
            match descriptor.field(name) {
                None => {
                    return Err(StructError::conversion(format!(
                        "{}: record has unknown field '{}'",
                        descriptor.name(),
                        name
                    )))
                }
                Some(field) if field.is_length() => {
                    return Err(StructError::conversion(format!(
                        "{}.{}: length fields are derived and cannot be set",
                        descriptor.name(),
                        name
                    )))
                }
                Some(_) => {}
            }
        }

        // Length fields may precede their target by several fields, so
        // variable-length payloads are rendered up front.
        let mut payloads: HashMap<&str, Vec<u8>> = HashMap::new();
        for field in descriptor.fields() {
            if descriptor.length_field_for(field.name).is_none() {
                continue;
            }
            let payload = match (&field.kind, record.get(field.name)) {
                (FieldKind::Bytes, Some(Value::Bytes(bytes))) => bytes.clone(),
                (FieldKind::Struct(layout), Some(Value::Struct(inner))) => {
                    let mut buf = Vec::new();
                    self.write_struct(inner, self.registry.get(layout)?, &mut buf)?;
                    buf
                }
                (FieldKind::Struct(_), None) => Vec::new(),
                (_, None) => {
                    return Err(StructError::conversion(format!(
                        "{}: record is missing field '{}'",
                        descriptor.name(),
                        field.name
                    )))
                }
                (_, Some(_)) => {
                    return Err(StructError::conversion(format!(
                        "{}.{}: value does not match the declared kind",
                        descriptor.name(),
                        field.name
                    )))
                }
            };
            payloads.insert(field.name, payload);
        }

        for field in descriptor.fields() {
            if let Some(payload) = payloads.get(field.name) {
                out.extend_from_slice(payload);
                continue;
            }
            match field.kind {
                FieldKind::Int { width } => {
                    let value = match field.length_of {
                        Some(target) => {
                            let len = payloads.get(target).map(Vec::len).ok_or_else(|| {
                                StructError::conversion(format!(
                                    "{}.{}: length of unknown field '{}'",
                                    descriptor.name(),
                                    field.name,
                                    target
                                ))
                            })?;
                            u32::try_from(len).map_err(|_| {
                                StructError::conversion(format!(
                                    "{}.{}: {} bytes exceed the length field",
                                    descriptor.name(),
                                    target,
                                    len
                                ))
                            })?
                        }
                        None => record.int(field.name)?,
                    };
                    write_int(out, width, value).map_err(|msg| {
                        StructError::conversion(format!(
                            "{}.{}: {}",
                            descriptor.name(),
                            field.name,
                            msg
                        ))
                    })?;
                }
                FieldKind::Struct(layout) => match record.get(field.name) {
                    Some(Value::Struct(inner)) => {
                        self.write_struct(inner, self.registry.get(layout)?, out)?
                    }
                    Some(_) => {
                        return Err(StructError::conversion(format!(
                            "{}.{}: value is not a struct",
                            descriptor.name(),
                            field.name
                        )))
                    }
                    None => {
                        return Err(StructError::conversion(format!(
                            "{}: record is missing field '{}'",
                            descriptor.name(),
                            field.name
                        )))
                    }
                },
                FieldKind::Bytes => {
                    return Err(StructError::conversion(format!(
                        "{}.{}: byte array has no length field",
                        descriptor.name(),
                        field.name
                    )))
                }
            }
        }

        Ok(())
    }

    fn read_struct(&self, reader: &mut Reader<'_>, descriptor: &StructDescriptor) -> Result<Record> {
        let mut record = Record::new();
        let mut lengths: HashMap<&str, usize> = HashMap::new();

        for field in descriptor.fields() {
            let context = || format!("{}.{}", descriptor.name(), field.name);
            match (&field.kind, field.length_of) {
                (FieldKind::Int { width }, Some(target)) => {
                    let len = reader.read_int(*width, &context())?;
                    lengths.insert(target, len as usize);
                }
                (FieldKind::Int { width }, None) => {
                    let value = reader.read_int(*width, &context())?;
                    record.insert(field.name, Value::Int(value));
                }
                (FieldKind::Bytes, _) => {
                    let len = lengths.remove(field.name).ok_or_else(|| {
                        StructError::conversion(format!("{}: byte array has no length field", context()))
                    })?;
                    let bytes = reader.take(len, &context())?;
                    record.insert(field.name, Value::Bytes(bytes.to_vec()));
                }
                (FieldKind::Struct(layout), _) => {
                    let inner_descriptor = self.registry.get(layout)?;
                    match lengths.remove(field.name) {
                        Some(0) => {}
                        Some(len) => {
                            let slice = reader.take(len, &context())?;
                            let mut inner_reader = Reader::new(slice);
                            let inner = self.read_struct(&mut inner_reader, inner_descriptor)?;
                            if inner_reader.remaining() != 0 {
                                return Err(StructError::invalid(format!(
                                    "{}: declared length {} but struct used {} bytes",
                                    context(),
                                    len,
                                    len - inner_reader.remaining()
                                )));
                            }
                            record.insert(field.name, Value::Struct(inner));
                        }
                        None => {
                            let inner = self.read_struct(reader, inner_descriptor)?;
                            record.insert(field.name, Value::Struct(inner));
                        }
                    }
                }
            }
        }

        Ok(record)
    }
}

fn write_int(out: &mut Vec<u8>, width: u8, value: u32) -> std::result::Result<(), String> {
    match width {
        1 => {
            let v = u8::try_from(value)
                .map_err(|_| format!("value {} does not fit in 1 byte", value))?;
            out.push(v);
        }
        2 => {
            let v = u16::try_from(value)
                .map_err(|_| format!("value {} does not fit in 2 bytes", value))?;
            out.extend_from_slice(&v.to_be_bytes());
        }
        4 => out.extend_from_slice(&value.to_be_bytes()),
        other => return Err(format!("unsupported integer width of {} bytes", other)),
    }
    Ok(())
}

/// Bounds-checked cursor over an input buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, context: &str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(StructError::invalid(format!(
                "{}: truncated input, need {} bytes but {} remain",
                context,
                n,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_int(&mut self, width: u8, context: &str) -> Result<u32> {
        match width {
            1 => Ok(self.take(1, context)?[0] as u32),
            2 => {
                let b = self.take(2, context)?;
                Ok(u16::from_be_bytes([b[0], b[1]]) as u32)
            }
            4 => {
                let b = self.take(4, context)?;
                Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            other => Err(StructError::conversion(format!(
                "{}: unsupported integer width of {} bytes",
                context, other
            ))),
        }
    }
}
