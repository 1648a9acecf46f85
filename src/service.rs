use std::path::Path;
use std::sync::Arc;

use log::info;
use time::OffsetDateTime;

use crate::certs::{CertificateLookup, ServiceCertificate};
use crate::client_defaults::{
    CERTIFICATE_BACKDATE, CERTIFICATE_LIFETIME, DEFAULT_SERVICE_DESCRIPTION,
    REMOTE_ACCESS_LIFETIME,
};
use crate::command::{Command, CommandOutput};
use crate::cscfg::{ConfigExtension, ConfigurationDocument, RemoteDesktop};
use crate::error::Error;
use crate::models::{DeploymentSlot, DeploymentStatus};
use crate::transport::{CancellationToken, ManagementClient};

/// Values the facade falls back to when a call does not supply them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefaults {
    /// Description of newly created cloud services.
    pub description: String,
    /// Validity of generated service certificates, counted from now.
    pub certificate_lifetime: time::Duration,
    /// Validity of remote desktop accounts, counted from now.
    pub remote_access_lifetime: time::Duration,
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            description: DEFAULT_SERVICE_DESCRIPTION.to_string(),
            certificate_lifetime: CERTIFICATE_LIFETIME,
            remote_access_lifetime: REMOTE_ACCESS_LIFETIME,
        }
    }
}

/// Operational surface of one cloud service in one deployment slot.
///
/// Every call builds fresh commands over the shared client; nothing is cached
/// between calls. Read-modify-write operations such as
/// [`ServiceClient::update_role_instance_count`] are not guarded against
/// concurrent writers, so callers touching the same deployment from several
/// places must serialize those calls themselves.
pub struct ServiceClient {
    client: Arc<ManagementClient>,
    name: String,
    slot: DeploymentSlot,
    defaults: ServiceDefaults,
    certificates: CertificateLookup,
    cancel: Option<CancellationToken>,
}

impl ServiceClient {
    pub fn new(
        client: Arc<ManagementClient>,
        name: impl Into<String>,
        slot: DeploymentSlot,
        defaults: ServiceDefaults,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            slot,
            defaults,
            certificates: CertificateLookup::new(),
            cancel: None,
        }
    }

    /// Token observed by this facade's calls in place of the client-wide one.
    /// Cancelling it stops this facade only; others sharing the client keep
    /// working.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Stores consulted by [`ServiceClient::upload_service_certificate_by_thumbprint`].
    pub fn with_certificate_lookup(mut self, certificates: CertificateLookup) -> Self {
        self.certificates = certificates;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> DeploymentSlot {
        self.slot
    }

    pub fn defaults(&self) -> &ServiceDefaults {
        &self.defaults
    }

    pub fn start(&self) -> Result<(), Error> {
        self.update_status(DeploymentStatus::Running)
    }

    pub fn stop(&self) -> Result<(), Error> {
        self.update_status(DeploymentStatus::Suspended)
    }

    fn update_status(&self, status: DeploymentStatus) -> Result<(), Error> {
        info!("setting {} ({}) to {status}", self.name, self.slot);
        self.run(Command::update_role_status(&self.name, self.slot, status))
    }

    /// Finds the certificate in the configured stores and uploads it, with
    /// its private key when the stored copy has one.
    pub fn upload_service_certificate_by_thumbprint(
        &self,
        thumbprint: &str,
        password: &str,
    ) -> Result<(), Error> {
        let certificate = self.certificates.find(thumbprint)?;
        let include_private_key = certificate.has_private_key();
        self.upload_service_certificate(&certificate, password, include_private_key)
    }

    /// Uploads `.pfx` bytes when `include_private_key`, else `.cer` bytes.
    pub fn upload_service_certificate(
        &self,
        certificate: &ServiceCertificate,
        password: &str,
        include_private_key: bool,
    ) -> Result<(), Error> {
        let (data, format) = certificate.export(include_private_key, password)?;
        info!(
            "uploading certificate {} to {} as {}",
            certificate.thumbprint(),
            self.name,
            format.as_str()
        );
        self.run(Command::add_service_certificate(
            &self.name, data, format, password,
        ))
    }

    /// Fetches the live configuration, changes one role's instance count and
    /// submits the whole document back.
    pub fn update_role_instance_count(&self, role: &str, count: i64) -> Result<(), Error> {
        if count < 0 {
            return Err(Error::InvalidArgument(format!(
                "instance count must not be negative, got {count}"
            )));
        }
        let mut document = self.deployment_configuration()?;
        document.set_instance_count_for_role(role, count)?;
        info!("scaling {role} of {} to {count} instance(s)", self.name);
        self.set_deployment_configuration(document)
    }

    /// Generates a certificate named after `username` and enables Remote
    /// Desktop in `document` with it. Nothing is sent; upload the certificate
    /// and submit the returned document to apply it.
    pub fn create_service_certificate_and_add_remote_desktop(
        &self,
        username: &str,
        password: &str,
        document: ConfigurationDocument,
    ) -> Result<(ServiceCertificate, ConfigurationDocument), Error> {
        let now = OffsetDateTime::now_utc();
        let certificate = ServiceCertificate::generate_with_validity(
            username,
            password,
            now - CERTIFICATE_BACKDATE,
            now + self.defaults.certificate_lifetime,
        )?;
        let extension = RemoteDesktop::new(&certificate, username, password)?
            .expires_at(now + self.defaults.remote_access_lifetime);
        let document = extension.apply(document)?;
        Ok((certificate, document))
    }

    /// Generates a self-signed certificate and writes its `.cer`, `.pfx` and
    /// `.pem` forms to `export_dir`.
    pub fn create_service_certificate(
        &self,
        name: &str,
        password: &str,
        export_dir: &Path,
    ) -> Result<ServiceCertificate, Error> {
        let now = OffsetDateTime::now_utc();
        let certificate = ServiceCertificate::generate_with_validity(
            name,
            password,
            now - CERTIFICATE_BACKDATE,
            now + self.defaults.certificate_lifetime,
        )?;
        certificate.write_to_directory(export_dir)?;
        Ok(certificate)
    }

    pub fn create_new_cloud_service(
        &self,
        location: &str,
        description: Option<&str>,
    ) -> Result<(), Error> {
        let description = description.unwrap_or(self.defaults.description.as_str());
        info!("creating cloud service {} in {location}", self.name);
        self.run(Command::create_cloud_service(
            &self.name,
            description,
            location,
        ))
    }

    pub fn delete_cloud_service(&self) -> Result<(), Error> {
        info!("deleting cloud service {}", self.name);
        self.run(Command::delete_hosted_service(&self.name))
    }

    pub fn delete_deployment(&self, slot: DeploymentSlot) -> Result<(), Error> {
        info!("deleting {slot} deployment of {}", self.name);
        self.run(Command::delete_deployment(&self.name, slot))
    }

    /// Role names of the deployment in the configured slot.
    pub fn roles(&self) -> Result<Vec<String>, Error> {
        let mut command = Command::get_deployment_role_names(&self.name, self.slot);
        self.execute(&mut command)?;
        Ok(command.role_names().map(<[String]>::to_vec).unwrap_or_default())
    }

    pub fn deployment_configuration(&self) -> Result<ConfigurationDocument, Error> {
        let mut command = Command::get_deployment_configuration(&self.name, self.slot);
        self.execute(&mut command)?;
        command.into_configuration().ok_or_else(|| {
            Error::InvalidConfiguration("deployment returned no configuration".to_string())
        })
    }

    pub fn set_deployment_configuration(&self, document: ConfigurationDocument) -> Result<(), Error> {
        self.run(Command::set_deployment_configuration(
            &self.name, self.slot, document,
        ))
    }

    fn run(&self, mut command: Command) -> Result<(), Error> {
        self.execute(&mut command)?;
        Ok(())
    }

    fn execute<'c>(&self, command: &'c mut Command) -> Result<&'c CommandOutput, Error> {
        match &self.cancel {
            Some(cancel) => command.execute_with_cancellation(&self.client, cancel),
            None => command.execute(&self.client),
        }
    }
}
