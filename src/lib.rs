#![forbid(unsafe_code)]

mod build_url;
mod certs;
mod client_defaults;
mod command;
mod cscfg;
mod error;
mod models;
mod service;
mod transport;

#[cfg(test)]
mod test_support;

pub use error::{ApiError, Error};

pub use models::{
    CertificateFile, CertificateFormat, ChangeConfiguration, CreateHostedService, Deployment,
    DeploymentRole, DeploymentSlot, DeploymentStatus, Operation, OperationStatus, RoleInstance,
    RoleInstanceList, RoleList, UpdateDeploymentStatus, MANAGEMENT_NAMESPACE,
};

pub use transport::{
    CancellationToken, Credentials, ManagementCertificate, ManagementClient,
    ManagementClientBuilder, PollOptions, RawResponse, MISSING_OPERATION_ID,
};

pub use command::{Command, CommandKind, CommandOutput, RequestTemplate};

pub use cscfg::{
    CertificateReference, ConfigExtension, ConfigurationDocument, ConfigurationSnapshot,
    RemoteDesktop, XmlDeclaration, XmlDocument, XmlElement, XmlNode,
    PASSWORD_ENCRYPTION_CERTIFICATE, SERVICE_CONFIGURATION_NAMESPACE,
};

pub use certs::{
    CertificateLookup, CertificateStore, DirectoryStore, ExportedFiles, MemoryStore,
    ServiceCertificate,
};

pub use service::{ServiceClient, ServiceDefaults};
