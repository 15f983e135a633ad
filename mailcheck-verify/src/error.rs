//! Error taxonomy for the verification pipeline: transient/permanent probe
//! errors, recovery failures, and webhook failures are distinct leaf types
//! so a caller can decide retry policy from the type alone.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("transient: {0}")]
    Temporary(String),

    #[error("permanent: {0}")]
    Permanent(String),

    #[error(transparent)]
    Dns(#[from] DnsError),

    #[error(transparent)]
    Smtp(#[from] mailcheck_smtp::SmtpError),
}

#[derive(Debug, Error)]
pub enum DnsError {
    #[error("no mail servers found for domain: {0}")]
    NoMailServers(String),

    #[error("dns lookup failed for {domain}: {source}")]
    LookupFailed {
        domain: String,
        #[source]
        source: hickory_resolver::ResolveError,
    },

    #[error("dns query timed out for domain: {0}")]
    Timeout(String),
}

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("archive entry for {request_id} is missing required field: {field}")]
    InvalidArchiveEntry { request_id: String, field: &'static str },

    #[error(transparent)]
    Store(#[from] mailcheck_store::StoreError),
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("transport error posting to {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("webhook endpoint {url} returned status {status}")]
    NonSuccessStatus { url: String, status: u16 },
}

pub type Result<T> = std::result::Result<T, ProbeError>;
