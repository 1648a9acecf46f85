use std::fmt;

use crate::error::{Error, CONFIG_ERROR_MISSING_SUBSCRIPTION};

/// X.509 management certificate with its private key, both PEM encoded.
///
/// Only ever used to build the TLS client identity.
#[derive(Clone)]
pub struct ManagementCertificate {
    identity_pem: Vec<u8>,
}

impl ManagementCertificate {
    /// Accepts a single PEM bundle holding the certificate and its private key.
    pub fn from_pem(identity_pem: &[u8]) -> Self {
        Self {
            identity_pem: identity_pem.to_vec(),
        }
    }

    pub fn from_parts(cert_pem: &[u8], key_pem: &[u8]) -> Self {
        let mut combined = Vec::with_capacity(cert_pem.len() + key_pem.len() + 1);
        combined.extend_from_slice(cert_pem);
        if !combined.ends_with(b"\n") {
            combined.push(b'\n');
        }
        combined.extend_from_slice(key_pem);
        Self {
            identity_pem: combined,
        }
    }

    pub(crate) fn identity(&self) -> Result<reqwest::Identity, Error> {
        Ok(reqwest::Identity::from_pem(&self.identity_pem)?)
    }
}

impl fmt::Debug for ManagementCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagementCertificate")
            .field("identity_pem", &"<redacted>")
            .finish()
    }
}

/// Subscription id plus the management certificate that authenticates it.
#[derive(Debug, Clone)]
pub struct Credentials {
    subscription_id: String,
    certificate: ManagementCertificate,
}

impl Credentials {
    pub fn new(
        subscription_id: impl Into<String>,
        certificate: ManagementCertificate,
    ) -> Result<Self, Error> {
        let subscription_id = subscription_id.into();
        if subscription_id.trim().is_empty() {
            return Err(Error::Config(CONFIG_ERROR_MISSING_SUBSCRIPTION.to_string()));
        }
        Ok(Self {
            subscription_id,
            certificate,
        })
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn certificate(&self) -> &ManagementCertificate {
        &self.certificate
    }
}
