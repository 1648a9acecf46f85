mod certificate;
mod common;
mod deployment;
mod hosted_service;
mod operation;

pub use certificate::{CertificateFile, CertificateFormat};
pub use common::{DeploymentSlot, DeploymentStatus, MANAGEMENT_NAMESPACE};
pub use deployment::{
    ChangeConfiguration, Deployment, DeploymentRole, RoleInstance, RoleInstanceList, RoleList,
    UpdateDeploymentStatus,
};
pub use hosted_service::CreateHostedService;
pub use operation::{Operation, OperationStatus};
