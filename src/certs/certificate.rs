use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use pem::{parse_many, Pem};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, LineEnding};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use time::OffsetDateTime;
use cms::builder::{
    ContentEncryptionAlgorithm, EnvelopedDataBuilder, KeyEncryptionInfo,
    KeyTransRecipientInfoBuilder,
};
use cms::cert::IssuerAndSerialNumber;
use cms::content_info::ContentInfo;
use cms::enveloped_data::RecipientIdentifier;
use x509_cert::der::oid::ObjectIdentifier;
use x509_cert::der::{Any, Decode, Encode};
use x509_cert::Certificate;

use crate::client_defaults::{CERTIFICATE_BACKDATE, CERTIFICATE_LIFETIME, RSA_KEY_BITS};
use crate::error::{crypto_error, Error};
use crate::models::CertificateFormat;

const CERTIFICATE_TAG: &str = "CERTIFICATE";
const PKCS8_KEY_TAG: &str = "PRIVATE KEY";
const PKCS1_KEY_TAG: &str = "RSA PRIVATE KEY";

/// `id-envelopedData` (RFC 5652).
pub(crate) const ID_ENVELOPED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.3");

/// A service certificate: DER certificate, optional RSA private key and the
/// password protecting its `.pfx` export.
#[derive(Clone)]
pub struct ServiceCertificate {
    name: String,
    der: Vec<u8>,
    private_key: Option<RsaPrivateKey>,
    password: Option<String>,
}

/// Paths written by [`ServiceCertificate::write_to_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub cer: PathBuf,
    pub pem: PathBuf,
    pub pfx: Option<PathBuf>,
}

impl ServiceCertificate {
    /// Self-signed certificate with subject `CN={name}`, valid from one day ago
    /// for two years.
    pub fn generate(name: &str, password: &str) -> Result<Self, Error> {
        let now = OffsetDateTime::now_utc();
        Self::generate_with_validity(
            name,
            password,
            now - CERTIFICATE_BACKDATE,
            now + CERTIFICATE_LIFETIME,
        )
    }

    pub fn generate_with_validity(
        name: &str,
        password: &str,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
    ) -> Result<Self, Error> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "certificate name must not be empty".to_string(),
            ));
        }
        if not_after <= not_before {
            return Err(Error::InvalidArgument(
                "certificate validity ends before it starts".to_string(),
            ));
        }
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| crypto_error("rsa key generation", e))?;
        Self::self_signed(name, password, private_key, not_before, not_after)
    }

    pub(crate) fn self_signed(
        name: &str,
        password: &str,
        private_key: RsaPrivateKey,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
    ) -> Result<Self, Error> {
        let key_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| crypto_error("pkcs8 encoding", e))?;
        let key_pair = rcgen::KeyPair::from_pem_and_sign_algo(&key_pem, &rcgen::PKCS_RSA_SHA256)
            .map_err(|e| crypto_error("signing key", e))?;

        let mut params = rcgen::CertificateParams::new(Vec::<String>::new())
            .map_err(|e| crypto_error("certificate parameters", e))?;
        let mut subject = rcgen::DistinguishedName::new();
        subject.push(rcgen::DnType::CommonName, name);
        params.distinguished_name = subject;
        params.not_before = not_before;
        params.not_after = not_after;

        let certificate = params
            .self_signed(&key_pair)
            .map_err(|e| crypto_error("self-signed certificate", e))?;
        let generated = Self {
            name: name.to_string(),
            der: certificate.der().to_vec(),
            private_key: Some(private_key),
            password: Some(password.to_string()),
        };
        info!(
            "generated service certificate {} with thumbprint {}",
            generated.name,
            generated.thumbprint()
        );
        Ok(generated)
    }

    /// Wraps a DER certificate without a private key.
    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let name = subject_common_name(der)?;
        Ok(Self {
            name,
            der: der.to_vec(),
            private_key: None,
            password: None,
        })
    }

    /// Reads the first `CERTIFICATE` block and, if present, an RSA private key
    /// (`PRIVATE KEY` or `RSA PRIVATE KEY`).
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, Error> {
        let blocks = parse_many(pem_bytes).map_err(|e| crypto_error("pem parse error", e))?;
        let der = blocks
            .iter()
            .find(|block| block.tag() == CERTIFICATE_TAG)
            .map(|block| block.contents().to_vec())
            .ok_or_else(|| Error::Crypto("pem contains no certificate".to_string()))?;
        let private_key = blocks.iter().find_map(|block| match block.tag() {
            PKCS8_KEY_TAG => RsaPrivateKey::from_pkcs8_der(block.contents()).ok(),
            PKCS1_KEY_TAG => RsaPrivateKey::from_pkcs1_der(block.contents()).ok(),
            _ => None,
        });
        let mut certificate = Self::from_der(&der)?;
        certificate.private_key = private_key;
        Ok(certificate)
    }

    /// Opens a PKCS#12 archive; the first certificate and key bags are used.
    pub fn from_pfx(bytes: &[u8], password: &str) -> Result<Self, Error> {
        let pfx = p12::PFX::parse(bytes)
            .map_err(|e| Error::Crypto(format!("pfx parse error: {e:?}")))?;
        if !pfx.verify_mac(password) {
            return Err(Error::Crypto("pfx password does not match".to_string()));
        }
        let der = pfx
            .cert_x509_bags(password)
            .map_err(|e| Error::Crypto(format!("pfx certificate error: {e:?}")))?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Crypto("pfx contains no certificate".to_string()))?;
        let key_der = pfx
            .key_bags(password)
            .map_err(|e| Error::Crypto(format!("pfx key error: {e:?}")))?
            .into_iter()
            .next();
        let private_key = match key_der {
            Some(key) => Some(
                RsaPrivateKey::from_pkcs8_der(&key)
                    .map_err(|e| crypto_error("rsa pkcs8 private key error", e))?,
            ),
            None => None,
        };
        let mut certificate = Self::from_der(&der)?;
        certificate.private_key = private_key;
        certificate.password = Some(password.to_string());
        Ok(certificate)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// SHA-1 of the DER encoding, upper-case hex.
    pub fn thumbprint(&self) -> String {
        hex::encode_upper(Sha1::digest(&self.der))
    }

    pub fn matches_thumbprint(&self, thumbprint: &str) -> bool {
        let wanted: String = thumbprint.chars().filter(|c| !c.is_whitespace()).collect();
        self.thumbprint().eq_ignore_ascii_case(&wanted)
    }

    pub fn public_key(&self) -> Result<RsaPublicKey, Error> {
        let certificate =
            Certificate::from_der(&self.der).map_err(|e| crypto_error("x509 decode", e))?;
        let spki = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| crypto_error("subject public key", e))?;
        RsaPublicKey::from_public_key_der(&spki).map_err(|e| crypto_error("rsa public key", e))
    }

    /// Encrypts `plaintext` for the holder of this certificate's private key.
    ///
    /// Returns a DER CMS `ContentInfo` wrapping `EnvelopedData`: AES-256-CBC
    /// content encryption, the content key RSA-wrapped for the recipient named
    /// by issuer and serial number.
    pub fn envelope(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let certificate =
            Certificate::from_der(&self.der).map_err(|e| crypto_error("x509 decode", e))?;
        let recipient = RecipientIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: certificate.tbs_certificate.issuer.clone(),
            serial_number: certificate.tbs_certificate.serial_number.clone(),
        });
        let mut key_rng = rand::thread_rng();
        let recipient_info = KeyTransRecipientInfoBuilder::new(
            recipient,
            KeyEncryptionInfo::Rsa(self.public_key()?),
            &mut key_rng,
        )
        .map_err(cms_error)?;
        let mut builder = EnvelopedDataBuilder::new(
            None,
            plaintext,
            ContentEncryptionAlgorithm::Aes256Cbc,
            None,
        )
        .map_err(cms_error)?;
        let enveloped = builder
            .add_recipient_info(recipient_info)
            .map_err(cms_error)?
            .build_with_rng(&mut rand::thread_rng())
            .map_err(cms_error)?;
        let content_info = ContentInfo {
            content_type: ID_ENVELOPED_DATA,
            content: Any::encode_from(&enveloped).map_err(|e| crypto_error("cms encoding", e))?,
        };
        content_info
            .to_der()
            .map_err(|e| crypto_error("cms encoding", e))
    }

    pub fn export_cer(&self) -> Vec<u8> {
        self.der.clone()
    }

    pub fn export_pfx(&self, password: &str) -> Result<Vec<u8>, Error> {
        let key = self.private_key.as_ref().ok_or_else(|| {
            Error::InvalidArgument(format!("certificate {} has no private key", self.name))
        })?;
        let key_der = key
            .to_pkcs8_der()
            .map_err(|e| crypto_error("pkcs8 encoding", e))?;
        let pfx = p12::PFX::new(&self.der, key_der.as_bytes(), None, password, &self.name)
            .ok_or_else(|| Error::Crypto("pfx encoding failed".to_string()))?;
        Ok(pfx.to_der())
    }

    /// Certificate block followed by the PKCS#8 key block when a key is held.
    pub fn export_pem(&self) -> Result<String, Error> {
        let mut blocks = vec![Pem::new(CERTIFICATE_TAG, self.der.clone())];
        if let Some(key) = &self.private_key {
            let key_der = key
                .to_pkcs8_der()
                .map_err(|e| crypto_error("pkcs8 encoding", e))?;
            blocks.push(Pem::new(PKCS8_KEY_TAG, key_der.as_bytes().to_vec()));
        }
        Ok(pem::encode_many(&blocks))
    }

    /// Bytes for an upload: `.pfx` with the key when asked for, else `.cer`.
    pub fn export(
        &self,
        include_private_key: bool,
        password: &str,
    ) -> Result<(Vec<u8>, CertificateFormat), Error> {
        if include_private_key {
            Ok((self.export_pfx(password)?, CertificateFormat::Pfx))
        } else {
            Ok((self.export_cer(), CertificateFormat::Cer))
        }
    }

    /// Writes `{name}.cer`, `{name}.pem` and, with a private key, `{name}.pfx`.
    pub fn write_to_directory(&self, dir: &Path) -> Result<ExportedFiles, Error> {
        fs::create_dir_all(dir)?;
        let stem = file_stem(&self.name);
        let cer = dir.join(format!("{stem}.cer"));
        fs::write(&cer, self.export_cer())?;
        let pem = dir.join(format!("{stem}.pem"));
        fs::write(&pem, self.export_pem()?)?;
        let pfx = if self.has_private_key() {
            let path = dir.join(format!("{stem}.pfx"));
            fs::write(&path, self.export_pfx(self.password().unwrap_or_default())?)?;
            Some(path)
        } else {
            None
        };
        info!(
            "exported certificate {} to {}",
            self.thumbprint(),
            dir.display()
        );
        Ok(ExportedFiles { cer, pem, pfx })
    }
}

impl fmt::Debug for ServiceCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCertificate")
            .field("name", &self.name)
            .field("thumbprint", &self.thumbprint())
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}

fn cms_error(err: cms::builder::Error) -> Error {
    Error::Crypto(format!("cms envelope: {err:?}"))
}

fn subject_common_name(der: &[u8]) -> Result<String, Error> {
    let certificate = Certificate::from_der(der).map_err(|e| crypto_error("x509 decode", e))?;
    let subject = certificate.tbs_certificate.subject.to_string();
    let name = subject
        .split(',')
        .find_map(|part| part.trim().strip_prefix("CN="))
        .unwrap_or(subject.as_str())
        .to_string();
    Ok(name)
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}
