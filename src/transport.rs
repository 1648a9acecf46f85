mod client;
mod credentials;
mod poll;

pub use client::{
    ManagementClient, ManagementClientBuilder, RawResponse, MISSING_OPERATION_ID,
};
pub use credentials::{Credentials, ManagementCertificate};
pub use poll::PollOptions;
pub use tokio_util::sync::CancellationToken;
