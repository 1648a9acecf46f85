use serde::Serialize;

use super::common::MANAGEMENT_NAMESPACE;

/// Body of the create-hosted-service request. The label is the base64 form
/// of the service name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename = "CreateHostedService")]
pub struct CreateHostedService {
    #[serde(rename = "@xmlns")]
    pub xmlns: &'static str,
    #[serde(rename = "ServiceName")]
    pub service_name: String,
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Location")]
    pub location: String,
}

impl CreateHostedService {
    pub fn new(service_name: &str, label: String, description: &str, location: &str) -> Self {
        Self {
            xmlns: MANAGEMENT_NAMESPACE,
            service_name: service_name.to_string(),
            label,
            description: description.to_string(),
            location: location.to_string(),
        }
    }
}
