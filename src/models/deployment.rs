use serde::{Deserialize, Serialize};

use super::common::MANAGEMENT_NAMESPACE;

/// Subset of the get-deployment response used by the commands.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename = "Deployment")]
pub struct Deployment {
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "DeploymentSlot", default)]
    pub deployment_slot: Option<String>,
    #[serde(rename = "PrivateID", default)]
    pub private_id: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
    #[serde(rename = "Label", default)]
    pub label: Option<String>,
    #[serde(rename = "Url", default)]
    pub url: Option<String>,
    /// Base64-encoded service configuration document.
    #[serde(rename = "Configuration", default)]
    pub configuration: Option<String>,
    #[serde(rename = "RoleInstanceList", default)]
    pub role_instance_list: Option<RoleInstanceList>,
    #[serde(rename = "RoleList", default)]
    pub role_list: Option<RoleList>,
}

impl Deployment {
    /// Role names in document order; empty when the response carries no role list.
    pub fn role_names(&self) -> Vec<String> {
        self.role_list
            .as_ref()
            .map(|list| list.roles.iter().map(|r| r.role_name.clone()).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoleList {
    #[serde(rename = "Role", default)]
    pub roles: Vec<DeploymentRole>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeploymentRole {
    #[serde(rename = "RoleName", default)]
    pub role_name: String,
    #[serde(rename = "OsVersion", default)]
    pub os_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoleInstanceList {
    #[serde(rename = "RoleInstance", default)]
    pub instances: Vec<RoleInstance>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoleInstance {
    #[serde(rename = "RoleName", default)]
    pub role_name: String,
    #[serde(rename = "InstanceName", default)]
    pub instance_name: String,
    #[serde(rename = "InstanceStatus", default)]
    pub instance_status: Option<String>,
    #[serde(rename = "InstanceSize", default)]
    pub instance_size: Option<String>,
}

/// Body of the update-deployment-status request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename = "UpdateDeploymentStatus")]
pub struct UpdateDeploymentStatus {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "Status")]
    pub status: &'static str,
}

impl UpdateDeploymentStatus {
    pub fn new(status: &'static str) -> Self {
        Self {
            xmlns: MANAGEMENT_NAMESPACE,
            status,
        }
    }
}

/// Body of the change-deployment-configuration request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename = "ChangeConfiguration")]
pub struct ChangeConfiguration {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    /// Base64-encoded service configuration document.
    #[serde(rename = "Configuration")]
    pub configuration: String,
    #[serde(rename = "TreatWarningsAsError")]
    pub treat_warnings_as_error: bool,
    #[serde(rename = "Mode")]
    pub mode: &'static str,
}

impl ChangeConfiguration {
    pub fn new(configuration_base64: String) -> Self {
        Self {
            xmlns: MANAGEMENT_NAMESPACE,
            configuration: configuration_base64,
            treat_warnings_as_error: false,
            mode: "Auto",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeConfiguration, Deployment, UpdateDeploymentStatus};

    #[test]
    fn deployment_exposes_role_names_in_order() {
        let xml = r#"<Deployment xmlns="http://schemas.microsoft.com/windowsazure">
  <Name>prod-1</Name>
  <DeploymentSlot>Production</DeploymentSlot>
  <Configuration>PFNlcnZpY2VDb25maWd1cmF0aW9uLz4=</Configuration>
  <RoleInstanceList>
    <RoleInstance><RoleName>WebRole</RoleName><InstanceName>WebRole_IN_0</InstanceName><InstanceStatus>ReadyRole</InstanceStatus></RoleInstance>
  </RoleInstanceList>
  <RoleList>
    <Role><RoleName>WebRole</RoleName><OsVersion>WA-GUEST-OS-2.12</OsVersion></Role>
    <Role><RoleName>WorkerRole</RoleName></Role>
  </RoleList>
</Deployment>"#;
        let deployment: Deployment = quick_xml::de::from_str(xml).expect("deployment");
        assert_eq!(deployment.name.as_deref(), Some("prod-1"));
        assert_eq!(deployment.role_names(), vec!["WebRole", "WorkerRole"]);
        let instances = deployment.role_instance_list.expect("instances").instances;
        assert_eq!(instances[0].instance_name, "WebRole_IN_0");
    }

    #[test]
    fn deployment_without_role_list_has_no_roles() {
        let deployment: Deployment =
            quick_xml::de::from_str("<Deployment><Name>d</Name></Deployment>").expect("deployment");
        assert!(deployment.role_names().is_empty());
    }

    #[test]
    fn request_bodies_carry_namespace() {
        let body = quick_xml::se::to_string(&UpdateDeploymentStatus::new("Suspended")).expect("xml");
        assert!(body.starts_with("<UpdateDeploymentStatus xmlns=\"http://schemas.microsoft.com/windowsazure\">"));
        assert!(body.contains("<Status>Suspended</Status>"));

        let body = quick_xml::se::to_string(&ChangeConfiguration::new("QUJD".to_string())).expect("xml");
        assert!(body.contains("<Configuration>QUJD</Configuration>"));
        assert!(body.contains("<TreatWarningsAsError>false</TreatWarningsAsError>"));
        assert!(body.contains("<Mode>Auto</Mode>"));
    }
}
