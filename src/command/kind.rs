use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Method;
use serde::Serialize;

use crate::cscfg::ConfigurationDocument;
use crate::error::Error;
use crate::models::{
    CertificateFile, CertificateFormat, ChangeConfiguration, CreateHostedService, Deployment,
    DeploymentSlot, DeploymentStatus, UpdateDeploymentStatus,
};
use crate::transport::RawResponse;

const HOSTED_SERVICES: &str = "hostedservices";
const DEPLOYMENT_SLOTS: &str = "deploymentslots";

const OK_OR_ACCEPTED: &[u16] = &[200, 202];
const CREATED: &[u16] = &[201];
const OK: &[u16] = &[200];

/// One remote operation against a hosted service.
#[derive(Debug, Clone)]
pub enum CommandKind {
    UpdateRoleStatus {
        service: String,
        slot: DeploymentSlot,
        status: DeploymentStatus,
    },
    AddServiceCertificate {
        service: String,
        data: Vec<u8>,
        format: CertificateFormat,
        password: String,
    },
    CreateCloudService {
        name: String,
        description: String,
        location: String,
    },
    DeleteHostedService {
        service: String,
    },
    DeleteDeployment {
        service: String,
        slot: DeploymentSlot,
    },
    GetDeploymentConfiguration {
        service: String,
        slot: DeploymentSlot,
    },
    SetDeploymentConfiguration {
        service: String,
        slot: DeploymentSlot,
        document: ConfigurationDocument,
    },
    GetDeploymentRoleNames {
        service: String,
        slot: DeploymentSlot,
    },
}

/// Everything the executor needs to issue a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    pub method: Method,
    /// Path below `{subscription-id}/services/`.
    pub segments: Vec<String>,
    pub query: Option<(&'static str, &'static str)>,
    pub body: Option<String>,
    pub success: &'static [u16],
}

/// Result of a successful command.
#[derive(Debug, Clone)]
pub enum CommandOutput {
    Completed,
    Configuration(ConfigurationDocument),
    RoleNames(Vec<String>),
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::UpdateRoleStatus { .. } => "UpdateRoleStatus",
            CommandKind::AddServiceCertificate { .. } => "AddServiceCertificate",
            CommandKind::CreateCloudService { .. } => "CreateCloudService",
            CommandKind::DeleteHostedService { .. } => "DeleteHostedService",
            CommandKind::DeleteDeployment { .. } => "DeleteDeployment",
            CommandKind::GetDeploymentConfiguration { .. } => "GetDeploymentConfiguration",
            CommandKind::SetDeploymentConfiguration { .. } => "SetDeploymentConfiguration",
            CommandKind::GetDeploymentRoleNames { .. } => "GetDeploymentRoleNames",
        }
    }

    /// Validates the inputs and renders the request.
    pub fn request(&self) -> Result<RequestTemplate, Error> {
        let template = match self {
            CommandKind::UpdateRoleStatus {
                service,
                slot,
                status,
            } => RequestTemplate {
                method: Method::POST,
                segments: slot_path(service, *slot)?,
                query: Some(("comp", "status")),
                body: Some(to_xml(&UpdateDeploymentStatus::new(status.as_str()))?),
                success: OK_OR_ACCEPTED,
            },
            CommandKind::AddServiceCertificate {
                service,
                data,
                format,
                password,
            } => {
                if data.is_empty() {
                    return Err(Error::InvalidArgument(
                        "certificate data must not be empty".to_string(),
                    ));
                }
                let body = CertificateFile::new(STANDARD.encode(data), *format, password);
                let mut segments = service_path(service)?;
                segments.push("certificates".to_string());
                RequestTemplate {
                    method: Method::POST,
                    segments,
                    query: None,
                    body: Some(to_xml(&body)?),
                    success: OK_OR_ACCEPTED,
                }
            }
            CommandKind::CreateCloudService {
                name,
                description,
                location,
            } => {
                require("service name", name)?;
                require("location", location)?;
                let label = STANDARD.encode(name.as_bytes());
                let body = CreateHostedService::new(name, label, description, location);
                RequestTemplate {
                    method: Method::POST,
                    segments: vec![HOSTED_SERVICES.to_string()],
                    query: None,
                    body: Some(to_xml(&body)?),
                    success: CREATED,
                }
            }
            CommandKind::DeleteHostedService { service } => RequestTemplate {
                method: Method::DELETE,
                segments: service_path(service)?,
                query: None,
                body: None,
                success: OK_OR_ACCEPTED,
            },
            CommandKind::DeleteDeployment { service, slot } => RequestTemplate {
                method: Method::DELETE,
                segments: slot_path(service, *slot)?,
                query: None,
                body: None,
                success: OK_OR_ACCEPTED,
            },
            CommandKind::GetDeploymentConfiguration { service, slot }
            | CommandKind::GetDeploymentRoleNames { service, slot } => RequestTemplate {
                method: Method::GET,
                segments: slot_path(service, *slot)?,
                query: None,
                body: None,
                success: OK,
            },
            CommandKind::SetDeploymentConfiguration {
                service,
                slot,
                document,
            } => {
                let xml = document.to_xml_string()?;
                let body = ChangeConfiguration::new(STANDARD.encode(xml.as_bytes()));
                RequestTemplate {
                    method: Method::POST,
                    segments: slot_path(service, *slot)?,
                    query: Some(("comp", "config")),
                    body: Some(to_xml(&body)?),
                    success: OK_OR_ACCEPTED,
                }
            }
        };
        Ok(template)
    }

    /// Interprets a successful response body.
    pub fn parse_response(&self, response: &RawResponse) -> Result<CommandOutput, Error> {
        match self {
            CommandKind::GetDeploymentConfiguration { .. } => {
                let deployment = parse_deployment(response)?;
                let encoded = deployment
                    .configuration
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        Error::InvalidConfiguration(
                            "deployment carries no configuration".to_string(),
                        )
                    })?;
                let bytes = STANDARD.decode(encoded)?;
                let document = ConfigurationDocument::from_bytes(&bytes)?;
                if document.role_names().is_empty() {
                    return Err(Error::InvalidConfiguration(
                        "deployment configuration has no roles".to_string(),
                    ));
                }
                Ok(CommandOutput::Configuration(document))
            }
            CommandKind::GetDeploymentRoleNames { .. } => {
                let deployment = parse_deployment(response)?;
                Ok(CommandOutput::RoleNames(deployment.role_names()))
            }
            _ => Ok(CommandOutput::Completed),
        }
    }

    /// Maps provider faults onto the error this command documents.
    pub fn translate_error(&self, err: Error) -> Error {
        match (self, err) {
            (CommandKind::CreateCloudService { .. }, Error::Conflict(api)) => {
                Error::NameConflict(api)
            }
            (_, err) => err,
        }
    }
}

fn require(what: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

fn service_path(service: &str) -> Result<Vec<String>, Error> {
    require("service name", service)?;
    Ok(vec![HOSTED_SERVICES.to_string(), service.to_string()])
}

fn slot_path(service: &str, slot: DeploymentSlot) -> Result<Vec<String>, Error> {
    let mut segments = service_path(service)?;
    segments.push(DEPLOYMENT_SLOTS.to_string());
    segments.push(slot.as_path_segment().to_string());
    Ok(segments)
}

fn to_xml<T: Serialize>(value: &T) -> Result<String, Error> {
    Ok(quick_xml::se::to_string(value)?)
}

fn parse_deployment(response: &RawResponse) -> Result<Deployment, Error> {
    Ok(quick_xml::de::from_str(&response.body_text())?)
}

#[cfg(test)]
mod tests {
    use super::{CommandKind, CommandOutput};
    use crate::error::{ApiError, Error};
    use crate::models::{CertificateFormat, DeploymentSlot, DeploymentStatus};
    use crate::transport::RawResponse;
    use reqwest::Method;

    #[test]
    fn update_status_renders_status_body() {
        let kind = CommandKind::UpdateRoleStatus {
            service: "web".to_string(),
            slot: DeploymentSlot::Staging,
            status: DeploymentStatus::Suspended,
        };
        let template = kind.request().expect("template");
        assert_eq!(template.method, Method::POST);
        assert_eq!(
            template.segments,
            vec!["hostedservices", "web", "deploymentslots", "staging"]
        );
        assert_eq!(template.query, Some(("comp", "status")));
        let body = template.body.expect("body");
        assert!(body.contains("<Status>Suspended</Status>"));
        assert!(body.contains(r#"xmlns="http://schemas.microsoft.com/windowsazure""#));
    }

    #[test]
    fn create_cloud_service_labels_with_base64_name() {
        let kind = CommandKind::CreateCloudService {
            name: "shop".to_string(),
            description: "d".to_string(),
            location: "West Europe".to_string(),
        };
        let template = kind.request().expect("template");
        assert_eq!(template.segments, vec!["hostedservices"]);
        assert_eq!(template.success.to_vec(), vec![201]);
        let body = template.body.expect("body");
        assert!(body.contains("<ServiceName>shop</ServiceName>"));
        assert!(body.contains("<Label>c2hvcA==</Label>"));
        assert!(body.contains("<Location>West Europe</Location>"));
    }

    #[test]
    fn certificate_upload_requires_data() {
        let kind = CommandKind::AddServiceCertificate {
            service: "web".to_string(),
            data: Vec::new(),
            format: CertificateFormat::Cer,
            password: String::new(),
        };
        assert!(matches!(kind.request(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn empty_service_name_is_rejected() {
        let kind = CommandKind::DeleteHostedService {
            service: " ".to_string(),
        };
        assert!(matches!(kind.request(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn conflict_on_create_is_name_conflict() {
        let create = CommandKind::CreateCloudService {
            name: "shop".to_string(),
            description: String::new(),
            location: "West US".to_string(),
        };
        let err = create.translate_error(Error::Conflict(ApiError::default()));
        assert!(matches!(err, Error::NameConflict(_)));

        let delete = CommandKind::DeleteHostedService {
            service: "shop".to_string(),
        };
        let err = delete.translate_error(Error::Conflict(ApiError::default()));
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn role_names_parse_and_may_be_empty() {
        let kind = CommandKind::GetDeploymentRoleNames {
            service: "web".to_string(),
            slot: DeploymentSlot::Production,
        };
        let response = RawResponse {
            status: 200,
            request_id: None,
            body: br#"<Deployment xmlns="http://schemas.microsoft.com/windowsazure"><Name>d</Name><RoleList><Role><RoleName>WebRole</RoleName></Role><Role><RoleName>WorkerRole</RoleName></Role></RoleList></Deployment>"#.to_vec(),
        };
        match kind.parse_response(&response).expect("parse") {
            CommandOutput::RoleNames(names) => assert_eq!(names, vec!["WebRole", "WorkerRole"]),
            other => panic!("unexpected output: {other:?}"),
        }

        let empty = RawResponse {
            status: 200,
            request_id: None,
            body: b"<Deployment><Name>d</Name></Deployment>".to_vec(),
        };
        match kind.parse_response(&empty).expect("parse") {
            CommandOutput::RoleNames(names) => assert!(names.is_empty()),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[test]
    fn missing_configuration_is_invalid() {
        let kind = CommandKind::GetDeploymentConfiguration {
            service: "web".to_string(),
            slot: DeploymentSlot::Production,
        };
        let response = RawResponse {
            status: 200,
            request_id: None,
            body: b"<Deployment><Name>d</Name></Deployment>".to_vec(),
        };
        assert!(matches!(
            kind.parse_response(&response),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
