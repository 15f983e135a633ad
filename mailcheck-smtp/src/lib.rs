#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod classify;
pub mod client;
pub mod error;
pub mod probe;
pub mod response;

pub use client::SmtpClient;
pub use error::{Result, SmtpError};
pub use probe::{CatchAllCache, EmailOutcome, NoCatchAllCache, ProbeConfig, ProbeTarget, check};
pub use response::{Response, ResponseLine};
