#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod antigreylist;
pub mod cache;
pub mod classify;
pub mod controller;
pub mod dns;
pub mod error;
pub mod lists;
pub mod recovery;
pub mod webhook;
pub mod worker;

pub use antigreylist::AntiGreylistStore;
pub use cache::WorkerCatchAllCache;
pub use classify::{GroupBy, MxOrg, ProcessingProfile, classify_mx_host, profile_for};
pub use controller::{Controller, ControllerConfig};
pub use dns::{DnsConfig, DnsResolver, HickoryDnsResolver, MockDnsResolver};
pub use error::{DnsError, ProbeError, RecoveryError, WebhookError};
pub use lists::DisposableDomains;
pub use recovery::{RecoveryReport, run_recovery};
pub use worker::{ControllerMessage, Worker, WorkerDeps, WorkerMessage, WorkerReport};
