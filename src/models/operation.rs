use serde::Deserialize;

use crate::error::ApiError;

/// Status document of an asynchronous operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "Operation")]
pub struct Operation {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "HttpStatusCode", default)]
    pub http_status_code: Option<u16>,
    #[serde(rename = "Error", default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl Operation {
    /// Unknown status strings are treated as still in progress.
    pub fn status(&self) -> OperationStatus {
        match self.status.as_str() {
            "Succeeded" => OperationStatus::Succeeded,
            "Failed" => OperationStatus::Failed,
            _ => OperationStatus::InProgress,
        }
    }

    /// The provider's failure detail, with the operation's HTTP status filled in.
    pub fn failure(&self) -> ApiError {
        let mut error = self.error.clone().unwrap_or_default();
        error.status = self.http_status_code.unwrap_or(error.status);
        if error.message.is_empty() {
            error.message = format!("operation {} failed", self.id);
        }
        error
    }
}
