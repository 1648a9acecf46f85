use serde::Serialize;

use super::common::MANAGEMENT_NAMESPACE;

/// Encoding of uploaded service certificate bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateFormat {
    /// PKCS#12 archive carrying the private key, protected by a password.
    Pfx,
    /// DER-encoded public certificate only.
    Cer,
}

impl CertificateFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateFormat::Pfx => "pfx",
            CertificateFormat::Cer => "cer",
        }
    }
}

/// Body of the add-certificate request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename = "CertificateFile")]
pub struct CertificateFile {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Data")]
    pub data: String,
    #[serde(rename = "CertificateFormat")]
    pub certificate_format: &'static str,
    #[serde(rename = "Password")]
    pub password: String,
}

impl CertificateFile {
    pub fn new(data_base64: String, format: CertificateFormat, password: &str) -> Self {
        Self {
            xmlns: MANAGEMENT_NAMESPACE,
            data: data_base64,
            certificate_format: format.as_str(),
            password: password.to_string(),
        }
    }
}
