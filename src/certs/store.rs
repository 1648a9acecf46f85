use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::certificate::ServiceCertificate;
use crate::error::Error;

/// A source of certificates addressable by thumbprint.
pub trait CertificateStore: Send + Sync {
    /// Short label used in log messages.
    fn label(&self) -> &str;

    fn find_by_thumbprint(&self, thumbprint: &str) -> Result<Option<ServiceCertificate>, Error>;
}

/// Certificates held in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    certificates: Vec<ServiceCertificate>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, certificate: ServiceCertificate) {
        let thumbprint = certificate.thumbprint();
        self.certificates.retain(|c| c.thumbprint() != thumbprint);
        self.certificates.push(certificate);
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

impl CertificateStore for MemoryStore {
    fn label(&self) -> &str {
        "memory"
    }

    fn find_by_thumbprint(&self, thumbprint: &str) -> Result<Option<ServiceCertificate>, Error> {
        Ok(self
            .certificates
            .iter()
            .find(|c| c.matches_thumbprint(thumbprint))
            .cloned())
    }
}

/// Reads `.pem`, `.crt`, `.cer`, `.der` and `.pfx` files from one directory.
///
/// `.pfx` files are opened with the store password (empty when unset).
/// Unreadable files are skipped with a warning.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
    label: String,
    pfx_password: String,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let label = dir.display().to_string();
        Self {
            dir,
            label,
            pfx_password: String::new(),
        }
    }

    pub fn with_pfx_password(mut self, password: impl Into<String>) -> Self {
        self.pfx_password = password.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&self, path: &Path) -> Result<Option<ServiceCertificate>, Error> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let certificate = match extension.as_deref() {
            Some("pem") | Some("crt") => ServiceCertificate::from_pem(&fs::read(path)?)?,
            Some("cer") | Some("der") => {
                let bytes = fs::read(path)?;
                if bytes.starts_with(b"-----BEGIN") {
                    ServiceCertificate::from_pem(&bytes)?
                } else {
                    ServiceCertificate::from_der(&bytes)?
                }
            }
            Some("pfx") | Some("p12") => {
                ServiceCertificate::from_pfx(&fs::read(path)?, &self.pfx_password)?
            }
            _ => return Ok(None),
        };
        Ok(Some(certificate))
    }
}

impl CertificateStore for DirectoryStore {
    fn label(&self) -> &str {
        &self.label
    }

    fn find_by_thumbprint(&self, thumbprint: &str) -> Result<Option<ServiceCertificate>, Error> {
        let mut entries: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        entries.sort();

        let mut found: Option<ServiceCertificate> = None;
        for path in entries {
            let certificate = match self.load(&path) {
                Ok(Some(certificate)) => certificate,
                Ok(None) => continue,
                Err(err) => {
                    warn!("skipping certificate file {}: {err}", path.display());
                    continue;
                }
            };
            if !certificate.matches_thumbprint(thumbprint) {
                continue;
            }
            debug!("certificate {thumbprint} found in {}", path.display());
            // the same certificate often sits next to its .pfx; prefer the copy with a key
            if certificate.has_private_key() {
                return Ok(Some(certificate));
            }
            found.get_or_insert(certificate);
        }
        Ok(found)
    }
}

/// Ordered chain of stores, consulted until one has the certificate.
#[derive(Default)]
pub struct CertificateLookup {
    stores: Vec<Box<dyn CertificateStore>>,
}

impl CertificateLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: impl CertificateStore + 'static) -> Self {
        self.push(store);
        self
    }

    pub fn push(&mut self, store: impl CertificateStore + 'static) {
        self.stores.push(Box::new(store));
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// First match in store order. A failing store is logged and skipped;
    /// `CertificateNotFound` only when no store has the certificate.
    pub fn find(&self, thumbprint: &str) -> Result<ServiceCertificate, Error> {
        for store in &self.stores {
            match store.find_by_thumbprint(thumbprint) {
                Ok(Some(certificate)) => return Ok(certificate),
                Ok(None) => debug!("certificate {thumbprint} not in store {}", store.label()),
                Err(err) => warn!(
                    "certificate store {} failed looking up {thumbprint}: {err}",
                    store.label()
                ),
            }
        }
        Err(Error::CertificateNotFound(thumbprint.to_string()))
    }
}

impl std::fmt::Debug for CertificateLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.stores.iter().map(|s| s.label()))
            .finish()
    }
}
