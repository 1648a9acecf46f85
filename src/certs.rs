mod certificate;
mod store;

pub use certificate::{ExportedFiles, ServiceCertificate};
pub use store::{CertificateLookup, CertificateStore, DirectoryStore, MemoryStore};
