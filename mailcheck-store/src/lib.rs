#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

pub mod antigreylist;
pub mod archive;
pub mod assignments;
pub mod catchall;
pub mod error;
pub mod queue;
pub mod results;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::Store;
pub use types::{
    ArchiveEntry, Assignment, AntiGreylistEntry, CatchAllCacheEntry, MxRecord, Reachable, Request,
    RequestStatus, ResultsRow, SmtpFindings, SyntaxInfo, VerificationObj,
};
