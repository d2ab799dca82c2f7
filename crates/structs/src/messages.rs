//! Provisioning wire messages.
//!
//! Field order is part of the wire contract shared with provisioning
//! clients. Reordering a layout requires a protocol version bump.

use crate::descriptor::StructDescriptor;
use crate::error::Result;
use crate::record::Record;
use crate::registry::WireStruct;

/// TPM_ALG_AES
pub const ALG_AES: u32 = 0x0006;
/// TPM_ALG_CFB
pub const SCHEME_CFB: u16 = 0x0043;
/// TPM_ALG_NULL
pub const SCHEME_NULL: u16 = 0x0010;

/// Phase 1 request: the device's identity claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRequestEnvelope {
    /// `TPMT_PUBLIC` of the attestation key
    pub request: Vec<u8>,
    /// Raw RSA modulus of the endorsement key
    pub endorsement_credential_modulus: Vec<u8>,
    /// DER endorsement credential, empty when the device has none
    pub endorsement_credential: Vec<u8>,
    /// JSON device info report
    pub device_info_report: Vec<u8>,
}

impl WireStruct for IdentityRequestEnvelope {
    const NAME: &'static str = "IdentityRequestEnvelope";

    fn descriptor() -> StructDescriptor {
        StructDescriptor::builder(Self::NAME)
            .length("requestLength", 4, "request")
            .bytes("request")
            .length(
                "endorsementCredentialModulusLength",
                4,
                "endorsementCredentialModulus",
            )
            .bytes("endorsementCredentialModulus")
            .length("endorsementCredentialLength", 4, "endorsementCredential")
            .bytes("endorsementCredential")
            .length("deviceInfoReportLength", 4, "deviceInfoReport")
            .bytes("deviceInfoReport")
            .build()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_bytes("request", &self.request)
            .with_bytes(
                "endorsementCredentialModulus",
                &self.endorsement_credential_modulus,
            )
            .with_bytes("endorsementCredential", &self.endorsement_credential)
            .with_bytes("deviceInfoReport", &self.device_info_report)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            request: record.take_bytes("request")?,
            endorsement_credential_modulus: record.take_bytes("endorsementCredentialModulus")?,
            endorsement_credential: record.take_bytes("endorsementCredential")?,
            device_info_report: record.take_bytes("deviceInfoReport")?,
        })
    }
}

/// Phase 1 response: the activation challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityResponseEnvelope {
    /// Seed encrypted to the endorsement key
    pub asymmetric_contents: Vec<u8>,
    pub symmetric_attestation: SymmetricAttestation,
}

impl WireStruct for IdentityResponseEnvelope {
    const NAME: &'static str = "IdentityResponseEnvelope";

    fn descriptor() -> StructDescriptor {
        StructDescriptor::builder(Self::NAME)
            .length("asymmetricContentsSize", 4, "asymmetricContents")
            .bytes("asymmetricContents")
            .embedded("symmetricAttestation", SymmetricAttestation::NAME)
            .build()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_bytes("asymmetricContents", &self.asymmetric_contents)
            .with_struct(
                "symmetricAttestation",
                self.symmetric_attestation.to_record(),
            )
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            asymmetric_contents: record.take_bytes("asymmetricContents")?,
            symmetric_attestation: SymmetricAttestation::from_record(
                record.take_struct("symmetricAttestation")?,
            )?,
        })
    }
}

/// Symmetrically protected credential and the parameters to unwrap it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricAttestation {
    pub algorithm: SymmetricKeyParams,
    pub credential: Vec<u8>,
}

impl WireStruct for SymmetricAttestation {
    const NAME: &'static str = "SymmetricAttestation";

    fn descriptor() -> StructDescriptor {
        StructDescriptor::builder(Self::NAME)
            .length("credentialSize", 4, "credential")
            .embedded("algorithm", SymmetricKeyParams::NAME)
            .bytes("credential")
            .build()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_struct("algorithm", self.algorithm.to_record())
            .with_bytes("credential", &self.credential)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            algorithm: SymmetricKeyParams::from_record(record.take_struct("algorithm")?)?,
            credential: record.take_bytes("credential")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricKeyParams {
    pub algorithm_id: u32,
    pub encryption_scheme: u16,
    pub signature_scheme: u16,
    pub params: Option<SymmetricSubParams>,
}

impl SymmetricKeyParams {
    /// AES-128 in CFB mode with a zero IV, as used by credential activation.
    pub fn aes128_cfb() -> Self {
        Self {
            algorithm_id: ALG_AES,
            encryption_scheme: SCHEME_CFB,
            signature_scheme: SCHEME_NULL,
            params: Some(SymmetricSubParams {
                key_length: 128,
                block_size: 128,
                iv: vec![0u8; 16],
            }),
        }
    }
}

impl WireStruct for SymmetricKeyParams {
    const NAME: &'static str = "SymmetricKeyParams";

    fn descriptor() -> StructDescriptor {
        StructDescriptor::builder(Self::NAME)
            .int("algorithmId", 4)
            .int("encryptionScheme", 2)
            .int("signatureScheme", 2)
            .length("paramsSize", 4, "params")
            .embedded("params", SymmetricSubParams::NAME)
            .build()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_int("algorithmId", self.algorithm_id)
            .with_int("encryptionScheme", self.encryption_scheme as u32)
            .with_int("signatureScheme", self.signature_scheme as u32)
            .with_optional_struct("params", self.params.as_ref().map(|p| p.to_record()))
    }

    fn from_record(mut record: Record) -> Result<Self> {
        let params = record
            .take_optional_struct("params")?
            .map(SymmetricSubParams::from_record)
            .transpose()?;
        Ok(Self {
            algorithm_id: record.int("algorithmId")?,
            encryption_scheme: record.u16("encryptionScheme")?,
            signature_scheme: record.u16("signatureScheme")?,
            params,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymmetricSubParams {
    /// Key length in bits
    pub key_length: u32,
    /// Block size in bits
    pub block_size: u32,
    pub iv: Vec<u8>,
}

impl WireStruct for SymmetricSubParams {
    const NAME: &'static str = "SymmetricSubParams";

    fn descriptor() -> StructDescriptor {
        StructDescriptor::builder(Self::NAME)
            .int("keyLength", 4)
            .int("blockSize", 4)
            .length("ivSize", 4, "iv")
            .bytes("iv")
            .build()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_int("keyLength", self.key_length)
            .with_int("blockSize", self.block_size)
            .with_bytes("iv", &self.iv)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            key_length: record.int("keyLength")?,
            block_size: record.int("blockSize")?,
            iv: record.take_bytes("iv")?,
        })
    }
}

/// Phase 2 request: the recovered nonce plus late evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequestEnvelope {
    pub nonce: Vec<u8>,
    /// Optional TPM quote, empty when not supplied
    pub quote: Vec<u8>,
    /// PEM bundle of platform attribute certificates, possibly empty
    pub platform_credentials: Vec<u8>,
}

impl WireStruct for CertificateRequestEnvelope {
    const NAME: &'static str = "CertificateRequestEnvelope";

    fn descriptor() -> StructDescriptor {
        StructDescriptor::builder(Self::NAME)
            .length("nonceLength", 4, "nonce")
            .bytes("nonce")
            .length("quoteLength", 4, "quote")
            .bytes("quote")
            .length("platformCredentialsLength", 4, "platformCredentials")
            .bytes("platformCredentials")
            .build()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with_bytes("nonce", &self.nonce)
            .with_bytes("quote", &self.quote)
            .with_bytes("platformCredentials", &self.platform_credentials)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            nonce: record.take_bytes("nonce")?,
            quote: record.take_bytes("quote")?,
            platform_credentials: record.take_bytes("platformCredentials")?,
        })
    }
}

/// Phase 2 response carrying the issued DER certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResponseEnvelope {
    pub certificate: Vec<u8>,
}

impl WireStruct for CertificateResponseEnvelope {
    const NAME: &'static str = "CertificateResponseEnvelope";

    fn descriptor() -> StructDescriptor {
        StructDescriptor::builder(Self::NAME)
            .length("certificateLength", 4, "certificate")
            .bytes("certificate")
            .build()
    }

    fn to_record(&self) -> Record {
        Record::new().with_bytes("certificate", &self.certificate)
    }

    fn from_record(mut record: Record) -> Result<Self> {
        Ok(Self {
            certificate: record.take_bytes("certificate")?,
        })
    }
}
