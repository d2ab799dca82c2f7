//! Strict PEM bundle parsing for certificates and attribute certificates.

use crate::error::{CredentialError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const ATTRIBUTE_CERTIFICATE_LABEL: &str = "ATTRIBUTE CERTIFICATE";

/// One decoded block of a PEM bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemBlock {
    pub label: String,
    pub der: Vec<u8>,
}

/// Parse every block of `bundle`, in order.
///
/// Rejects nested or unmatched markers, non-base64 content inside a block,
/// and anything but whitespace between blocks. An empty bundle yields no
/// blocks.
pub fn parse_bundle(bundle: &str) -> Result<Vec<PemBlock>> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, String)> = None;

    for (idx, line) in bundle.lines().enumerate() {
        let line_number = idx + 1;
        let trimmed = line.trim();

        if let Some(label) = marker(trimmed, "-----BEGIN ") {
            if current.is_some() {
                return Err(CredentialError::Pem(format!(
                    "nested BEGIN marker at line {}",
                    line_number
                )));
            }
            current = Some((label.to_string(), String::new()));
            continue;
        }

        if let Some(label) = marker(trimmed, "-----END ") {
            let (open_label, body) = current.take().ok_or_else(|| {
                CredentialError::Pem(format!("END without BEGIN at line {}", line_number))
            })?;
            if open_label != label {
                return Err(CredentialError::Pem(format!(
                    "END {} does not close BEGIN {} at line {}",
                    label, open_label, line_number
                )));
            }
            if body.is_empty() {
                return Err(CredentialError::Pem(format!(
                    "empty {} block at line {}",
                    label, line_number
                )));
            }
            let der = STANDARD
                .decode(&body)
                .map_err(|e| CredentialError::Pem(format!("{} block: {}", label, e)))?;
            blocks.push(PemBlock { label: open_label, der });
            continue;
        }

        match current.as_mut() {
            Some((_, body)) => {
                if !trimmed.is_empty() && !is_base64_line(trimmed) {
                    return Err(CredentialError::Pem(format!(
                        "invalid base64 at line {}",
                        line_number
                    )));
                }
                body.push_str(trimmed);
            }
            None if !trimmed.is_empty() => {
                return Err(CredentialError::Pem(format!(
                    "unexpected content at line {}",
                    line_number
                )));
            }
            None => {}
        }
    }

    if current.is_some() {
        return Err(CredentialError::Pem("unclosed PEM block".to_string()));
    }
    Ok(blocks)
}

/// Parse a bundle that may only contain blocks labelled `label`.
pub fn parse_labelled(bundle: &str, label: &str) -> Result<Vec<Vec<u8>>> {
    parse_bundle(bundle)?
        .into_iter()
        .map(|block| {
            if block.label == label {
                Ok(block.der)
            } else {
                Err(CredentialError::Pem(format!(
                    "expected {} block, found {}",
                    label, block.label
                )))
            }
        })
        .collect()
}

/// Encode DER as a PEM block with 64-column lines.
pub fn encode(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut out = format!("-----BEGIN {}-----\n", label);
    for chunk in body.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

fn marker<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix("-----")
}

fn is_base64_line(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}
