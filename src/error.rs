use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::time::Duration;

pub(crate) const MAX_ERROR_BODY_BYTES: usize = 64 * 1024;
pub(crate) const CONFIG_ERROR_MISSING_SUBSCRIPTION: &str = "subscription id must not be empty";

/// Fault payload returned by the management API for non-2xx responses and
/// attached to failed asynchronous operations.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(skip)]
    pub request_id: Option<String>,
}

impl ApiError {
    /// Throttling and server-side faults are worth retrying; everything else is a caller mistake.
    pub fn is_retryable(&self) -> bool {
        self.status >= 500 || self.status == 429 || self.code == "TooManyRequests"
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "status={}, message={}", self.status, self.message)
        } else if self.message.is_empty() {
            write!(f, "status={}, code={}", self.status, self.code)
        } else {
            write!(
                f,
                "status={}, code={}, message={}",
                self.status, self.code, self.message
            )
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid client configuration: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml payload error: {0}")]
    XmlPayload(#[from] quick_xml::DeError),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("management api error: {0}")]
    Api(ApiError),
    #[error("resource not found: {0}")]
    NotFound(ApiError),
    #[error("conflict: {0}")]
    Conflict(ApiError),
    #[error("name already in use: {0}")]
    NameConflict(ApiError),
    #[error("operation {operation_id} failed: {error}")]
    OperationFailed {
        operation_id: String,
        error: ApiError,
    },
    #[error("operation {operation_id} did not complete within {waited:?}")]
    Timeout {
        operation_id: String,
        waited: Duration,
    },
    /// `operation_id` is `None` when the call was stopped before its request
    /// went out, so nothing changed remotely.
    #[error("{}", cancelled_message(.operation_id))]
    Cancelled { operation_id: Option<String> },
    #[error("role not found: {0}")]
    RoleNotFound(String),
    #[error("certificate not found: {0}")]
    CertificateNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid service configuration: {0}")]
    InvalidConfiguration(String),
    #[error("command has already been executed")]
    AlreadyExecuted,
}

impl Error {
    /// Returns the provider fault attached to this error, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(err)
            | Error::NotFound(err)
            | Error::Conflict(err)
            | Error::NameConflict(err) => Some(err),
            Error::OperationFailed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// True for failures the caller may retry unchanged.
    ///
    /// A `Timeout` is not retryable: the operation may still complete remotely,
    /// so callers should re-query state first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Api(err) => err.is_retryable(),
            _ => false,
        }
    }
}

fn cancelled_message(operation_id: &Option<String>) -> String {
    match operation_id {
        Some(id) => format!("operation {id} cancelled"),
        None => "cancelled before the request was sent".to_string(),
    }
}

pub(crate) fn crypto_error(context: &str, err: impl fmt::Display) -> Error {
    Error::Crypto(format!("{context}: {err}"))
}

pub(crate) fn read_body_with_limit<R: Read>(reader: &mut R, limit: usize) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    reader.take(limit as u64).read_to_end(&mut body)?;
    Ok(body)
}

/// Builds the error for a non-2xx response from its (possibly empty) fault body.
pub(crate) fn parse_error_from_body(status: u16, body: &[u8], request_id: Option<String>) -> Error {
    let text = String::from_utf8_lossy(body);
    let mut err = quick_xml::de::from_str::<ApiError>(text.trim()).unwrap_or_else(|_| ApiError {
        message: text.trim().to_string(),
        ..ApiError::default()
    });
    err.status = status;
    err.request_id = request_id;
    if err.message.is_empty() {
        err.message = fallback_message(status);
    }
    match status {
        404 => Error::NotFound(err),
        409 => Error::Conflict(err),
        _ => Error::Api(err),
    }
}

fn fallback_message(status: u16) -> String {
    match reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
    {
        Some(reason) => reason.to_string(),
        None => format!("http status {status}"),
    }
}
