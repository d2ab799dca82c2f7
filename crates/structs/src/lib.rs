//! Descriptor-driven binary codec for the provisioning wire messages.
//!
//! Every message exchanged with a provisioning client is a fixed layout of
//! big-endian integers, length-prefixed byte arrays and embedded structs.
//! Layouts are declared once as [`StructDescriptor`] values, checked when the
//! [`SchemaRegistry`] is built, and interpreted by [`StructCodec`] for both
//! directions so encode and decode can never disagree on offsets.
//!
//! Length fields are derived: callers never set or see them. On encode the
//! codec writes the byte length of the paired field, on decode it consumes
//! exactly that many bytes.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod messages;
pub mod record;
pub mod registry;

pub use codec::StructCodec;
pub use descriptor::{FieldDescriptor, FieldKind, StructDescriptor, StructDescriptorBuilder};
pub use error::{Result, StructError};
pub use messages::{
    CertificateRequestEnvelope, CertificateResponseEnvelope, IdentityRequestEnvelope,
    IdentityResponseEnvelope, SymmetricAttestation, SymmetricKeyParams, SymmetricSubParams,
};
pub use record::{Record, Value};
pub use registry::{SchemaRegistry, SchemaRegistryBuilder, WireStruct};
