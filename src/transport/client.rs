use log::{debug, warn};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::{Certificate, Identity, Method, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::credentials::{Credentials, ManagementCertificate};
use super::poll::{poll_until_complete, PollOptions};
use crate::build_url::{build_url, BuildUrlOptions};
use crate::client_defaults::{
    API_VERSION_HEADER, DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_TIMEOUT,
    REQUEST_ID_HEADER,
};
use crate::error::{
    parse_error_from_body, read_body_with_limit, ApiError, Error,
    CONFIG_ERROR_MISSING_SUBSCRIPTION, MAX_ERROR_BODY_BYTES,
};
use crate::models::Operation;

/// Fault code reported when a `202 Accepted` carries no operation id.
pub const MISSING_OPERATION_ID: &str = "MissingOperationId";

/// Status, tracking id and body of a completed management call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub request_id: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub struct ManagementClientBuilder {
    base_url: Url,
    subscription_id: String,
    api_version: String,
    timeout: Option<Duration>,
    identity: Option<Identity>,
    ca_certs: Vec<Certificate>,
    poll: PollOptions,
    cancel: CancellationToken,
}

impl ManagementClientBuilder {
    pub fn new(subscription_id: impl Into<String>) -> Result<Self, Error> {
        let subscription_id = subscription_id.into();
        if subscription_id.trim().is_empty() {
            return Err(Error::Config(CONFIG_ERROR_MISSING_SUBSCRIPTION.to_string()));
        }
        Ok(Self {
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            subscription_id,
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: Some(DEFAULT_TIMEOUT),
            identity: None,
            ca_certs: Vec::new(),
            poll: PollOptions::default(),
            cancel: CancellationToken::new(),
        })
    }

    /// Starts from credentials: subscription id plus management certificate identity.
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, Error> {
        Self::new(credentials.subscription_id())?.management_certificate(credentials.certificate())
    }

    pub fn base_url(mut self, base_url: impl AsRef<str>) -> Result<Self, Error> {
        let url = Url::parse(base_url.as_ref())?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidBaseUrl(url.to_string()));
        }
        self.base_url = url;
        Ok(self)
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    /// Token observed while waiting on asynchronous operations.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn management_certificate(
        mut self,
        certificate: &ManagementCertificate,
    ) -> Result<Self, Error> {
        self.identity = Some(certificate.identity()?);
        Ok(self)
    }

    pub fn mtls_identity_from_pem(mut self, identity_pem: &[u8]) -> Result<Self, Error> {
        self.identity = Some(Identity::from_pem(identity_pem)?);
        Ok(self)
    }

    pub fn mtls_identity_from_parts(
        self,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<Self, Error> {
        self.management_certificate(&ManagementCertificate::from_parts(cert_pem, key_pem))
    }

    pub fn add_ca_cert_pem(mut self, ca_pem: &[u8]) -> Result<Self, Error> {
        self.ca_certs.push(Certificate::from_pem(ca_pem)?);
        Ok(self)
    }

    pub fn build(self) -> Result<ManagementClient, Error> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(identity) = self.identity {
            builder = builder.identity(identity);
        }
        for cert in self.ca_certs {
            builder = builder.add_root_certificate(cert);
        }
        let http = builder.build()?;
        Ok(ManagementClient {
            base_url: self.base_url,
            subscription_id: self.subscription_id,
            api_version: self.api_version,
            http,
            poll: self.poll,
            cancel: self.cancel,
        })
    }
}

/// Authenticated transport to the management endpoint.
///
/// Holds no per-call state, so one instance can be shared by every command a
/// facade issues.
pub struct ManagementClient {
    base_url: Url,
    subscription_id: String,
    api_version: String,
    http: HttpClient,
    poll: PollOptions,
    cancel: CancellationToken,
}

impl ManagementClient {
    pub fn builder(subscription_id: impl Into<String>) -> Result<ManagementClientBuilder, Error> {
        ManagementClientBuilder::new(subscription_id)
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn poll_options(&self) -> &PollOptions {
        &self.poll
    }

    /// Clone of the client-wide token. Cancelling it stops every later call
    /// that does not bring its own token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Sends one request and waits for its asynchronous operation, if any.
    ///
    /// `202 Accepted` responses are tracked through their `x-ms-request-id`
    /// until the operation succeeds, fails, times out or is cancelled.
    pub fn send(
        &self,
        method: Method,
        segments: &[&str],
        query: Option<(&str, &str)>,
        body: Option<String>,
    ) -> Result<RawResponse, Error> {
        self.send_with_cancellation(method, segments, query, body, &self.cancel)
    }

    /// Like [`ManagementClient::send`], observing `cancel` instead of the
    /// client-wide token. Nothing is sent when `cancel` has already fired.
    pub fn send_with_cancellation(
        &self,
        method: Method,
        segments: &[&str],
        query: Option<(&str, &str)>,
        body: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { operation_id: None });
        }
        let response = self.dispatch(method, segments, query, body)?;
        if response.status != StatusCode::ACCEPTED.as_u16() {
            return Ok(response);
        }
        let Some(operation_id) = response.request_id.clone() else {
            warn!("202 Accepted without {REQUEST_ID_HEADER}; outcome unknown");
            return Err(Error::Api(ApiError {
                status: response.status,
                code: MISSING_OPERATION_ID.to_string(),
                message: "request accepted without an operation id".to_string(),
                request_id: None,
            }));
        };
        poll_until_complete(&operation_id, &self.poll, cancel, || {
            self.fetch_operation(&operation_id)
        })?;
        Ok(response)
    }

    /// Blocks until the tracked operation reaches a terminal state.
    pub fn wait_for_operation(&self, operation_id: &str) -> Result<Operation, Error> {
        poll_until_complete(operation_id, &self.poll, &self.cancel, || {
            self.fetch_operation(operation_id)
        })
    }

    /// Single status query for an asynchronous operation.
    pub fn get_operation_status(&self, operation_id: &str) -> Result<Operation, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled {
                operation_id: Some(operation_id.to_string()),
            });
        }
        self.fetch_operation(operation_id)
    }

    /// Sends one request without following asynchronous operations.
    pub fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: Option<(&str, &str)>,
        body: Option<String>,
    ) -> Result<RawResponse, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled { operation_id: None });
        }
        self.dispatch(method, segments, query, body)
    }

    fn fetch_operation(&self, operation_id: &str) -> Result<Operation, Error> {
        let response = self.dispatch(Method::GET, &["operations", operation_id], None, None)?;
        Ok(quick_xml::de::from_str(&response.body_text())?)
    }

    fn dispatch(
        &self,
        method: Method,
        segments: &[&str],
        query: Option<(&str, &str)>,
        body: Option<String>,
    ) -> Result<RawResponse, Error> {
        let url = self.build_url(segments, query)?;
        debug!("{method} {url}");
        let mut req = self
            .http
            .request(method, url)
            .header(API_VERSION_HEADER, &self.api_version);
        if let Some(body) = body {
            req = req
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(body);
        }
        let resp = req.send()?;
        self.expect_success(resp)
    }

    fn build_url(&self, segments: &[&str], query: Option<(&str, &str)>) -> Result<Url, Error> {
        let mut full = Vec::with_capacity(segments.len() + 1);
        full.push(self.subscription_id.as_str());
        full.extend_from_slice(segments);
        let mut url = build_url(&self.base_url, &full, BuildUrlOptions::REQUEST)?;
        if let Some((key, value)) = query {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    fn expect_success(&self, mut resp: Response) -> Result<RawResponse, Error> {
        let status = resp.status();
        let request_id = resp
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if status.is_success() {
            let body = resp.bytes()?.to_vec();
            return Ok(RawResponse {
                status: status.as_u16(),
                request_id,
                body,
            });
        }
        let body = read_body_with_limit(&mut resp, MAX_ERROR_BODY_BYTES)?;
        debug!("management call failed with {status}");
        Err(parse_error_from_body(status.as_u16(), &body, request_id))
    }
}
