mod document;
mod remote_desktop;
mod xml;

pub use document::{
    CertificateReference, ConfigurationDocument, ConfigurationSnapshot,
    SERVICE_CONFIGURATION_NAMESPACE,
};
pub use remote_desktop::{ConfigExtension, RemoteDesktop, PASSWORD_ENCRYPTION_CERTIFICATE};
pub use xml::{XmlDeclaration, XmlDocument, XmlElement, XmlNode};
