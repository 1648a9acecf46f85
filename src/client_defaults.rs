use std::time::Duration;

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_TIMEOUT_SECS);

pub(crate) const DEFAULT_BASE_URL: &str = "https://management.core.windows.net/";
pub(crate) const DEFAULT_API_VERSION: &str = "2012-03-01";
pub(crate) const API_VERSION_HEADER: &str = "x-ms-version";
pub(crate) const REQUEST_ID_HEADER: &str = "x-ms-request-id";

pub(crate) const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub(crate) const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 300;
pub(crate) const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(15 * 60);
/// Granularity at which a sleeping poller notices cancellation.
pub(crate) const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(50);

pub(crate) const DEFAULT_SERVICE_DESCRIPTION: &str = "Fluent Management created cloud service";

pub(crate) const RSA_KEY_BITS: usize = 2048;
pub(crate) const CERTIFICATE_BACKDATE: time::Duration = time::Duration::days(1);
pub(crate) const CERTIFICATE_LIFETIME: time::Duration = time::Duration::days(2 * 365);
/// How long remote desktop accounts stay valid when none is given.
pub(crate) const REMOTE_ACCESS_LIFETIME: time::Duration = time::Duration::days(365);
