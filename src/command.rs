mod kind;

use log::{debug, info};

pub use kind::{CommandKind, CommandOutput, RequestTemplate};

use crate::cscfg::ConfigurationDocument;
use crate::error::{ApiError, Error};
use crate::models::{CertificateFormat, DeploymentSlot, DeploymentStatus};
use crate::transport::{CancellationToken, ManagementClient};

const SERVICES: &str = "services";

#[derive(Debug, Clone)]
enum CommandState {
    Pending,
    Succeeded(CommandOutput),
    Failed,
}

/// Single-shot unit of work against the management API.
///
/// A command runs at most once. After success its output stays readable;
/// after failure there is no output and the command cannot be retried, build
/// a new one instead.
#[derive(Debug, Clone)]
pub struct Command {
    kind: CommandKind,
    state: CommandState,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            state: CommandState::Pending,
        }
    }

    pub fn update_role_status(
        service: impl Into<String>,
        slot: DeploymentSlot,
        status: DeploymentStatus,
    ) -> Self {
        Self::new(CommandKind::UpdateRoleStatus {
            service: service.into(),
            slot,
            status,
        })
    }

    pub fn add_service_certificate(
        service: impl Into<String>,
        data: Vec<u8>,
        format: CertificateFormat,
        password: impl Into<String>,
    ) -> Self {
        Self::new(CommandKind::AddServiceCertificate {
            service: service.into(),
            data,
            format,
            password: password.into(),
        })
    }

    pub fn create_cloud_service(
        name: impl Into<String>,
        description: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self::new(CommandKind::CreateCloudService {
            name: name.into(),
            description: description.into(),
            location: location.into(),
        })
    }

    pub fn delete_hosted_service(service: impl Into<String>) -> Self {
        Self::new(CommandKind::DeleteHostedService {
            service: service.into(),
        })
    }

    pub fn delete_deployment(service: impl Into<String>, slot: DeploymentSlot) -> Self {
        Self::new(CommandKind::DeleteDeployment {
            service: service.into(),
            slot,
        })
    }

    pub fn get_deployment_configuration(service: impl Into<String>, slot: DeploymentSlot) -> Self {
        Self::new(CommandKind::GetDeploymentConfiguration {
            service: service.into(),
            slot,
        })
    }

    pub fn set_deployment_configuration(
        service: impl Into<String>,
        slot: DeploymentSlot,
        document: ConfigurationDocument,
    ) -> Self {
        Self::new(CommandKind::SetDeploymentConfiguration {
            service: service.into(),
            slot,
            document,
        })
    }

    pub fn get_deployment_role_names(service: impl Into<String>, slot: DeploymentSlot) -> Self {
        Self::new(CommandKind::GetDeploymentRoleNames {
            service: service.into(),
            slot,
        })
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, CommandState::Pending)
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.state, CommandState::Failed)
    }

    /// Issues the request, waits for any asynchronous operation and parses
    /// the result. A second call fails with `AlreadyExecuted` without
    /// touching the network.
    pub fn execute(&mut self, client: &ManagementClient) -> Result<&CommandOutput, Error> {
        let cancel = client.cancellation_token();
        self.execute_with_cancellation(client, &cancel)
    }

    /// Like [`Command::execute`], observing `cancel` instead of the client's
    /// token. A command stopped before its request went out is still spent.
    pub fn execute_with_cancellation(
        &mut self,
        client: &ManagementClient,
        cancel: &CancellationToken,
    ) -> Result<&CommandOutput, Error> {
        if !self.is_pending() {
            return Err(Error::AlreadyExecuted);
        }
        let output = match self.run(client, cancel) {
            Ok(output) => output,
            Err(err) => {
                self.state = CommandState::Failed;
                return Err(err);
            }
        };
        self.state = CommandState::Succeeded(output);
        self.output().ok_or(Error::AlreadyExecuted)
    }

    fn run(
        &self,
        client: &ManagementClient,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, Error> {
        let name = self.kind.name();
        let template = self.kind.request()?;
        let mut segments: Vec<&str> = Vec::with_capacity(template.segments.len() + 1);
        segments.push(SERVICES);
        segments.extend(template.segments.iter().map(String::as_str));

        debug!("executing {name}");
        let response = client
            .send_with_cancellation(
                template.method.clone(),
                &segments,
                template.query,
                template.body,
                cancel,
            )
            .map_err(|err| self.kind.translate_error(err))?;
        if !template.success.contains(&response.status) {
            return Err(Error::Api(ApiError {
                status: response.status,
                code: "UnexpectedStatus".to_string(),
                message: format!("{name} expected one of {:?}", template.success),
                request_id: response.request_id.clone(),
            }));
        }
        let output = self.kind.parse_response(&response)?;
        info!("{name} completed with status {}", response.status);
        Ok(output)
    }

    pub fn output(&self) -> Option<&CommandOutput> {
        match &self.state {
            CommandState::Succeeded(output) => Some(output),
            _ => None,
        }
    }

    pub fn configuration(&self) -> Option<&ConfigurationDocument> {
        match self.output()? {
            CommandOutput::Configuration(document) => Some(document),
            _ => None,
        }
    }

    pub fn into_configuration(self) -> Option<ConfigurationDocument> {
        match self.state {
            CommandState::Succeeded(CommandOutput::Configuration(document)) => Some(document),
            _ => None,
        }
    }

    pub fn role_names(&self) -> Option<&[String]> {
        match self.output()? {
            CommandOutput::RoleNames(names) => Some(names),
            _ => None,
        }
    }
}
