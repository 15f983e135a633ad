//! Data model shared by every store table.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use mailcheck_common::Domain;
use serde::{Deserialize, Serialize};

/// A verification request as submitted by the ingress layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    pub request_id: String,
    pub emails: Vec<String>,
    pub response_url: Option<String>,
}

/// Status of a request as tracked in the `results` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Whether a mailbox is believed to be reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reachable {
    Yes,
    No,
    Unknown,
}

/// SMTP-stage findings for a single mailbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SmtpFindings {
    pub host_exists: bool,
    pub full_inbox: bool,
    pub catch_all: bool,
    pub catch_all_blocked: bool,
    pub deliverable: bool,
    pub disabled: bool,
    pub greylisted: bool,
    pub requires_recheck: bool,
}

/// One MX record as resolved for a domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MxRecord {
    pub host: String,
    pub pref: u16,
}

/// Syntactic breakdown of an address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyntaxInfo {
    pub username: String,
    pub domain: String,
    pub valid: bool,
}

/// Per-email verdict, the unit of output for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationObj {
    pub email: String,
    pub syntax: SyntaxInfo,
    pub reachable: Reachable,
    pub smtp: SmtpFindings,
    pub disposable: bool,
    pub role_account: bool,
    pub free: bool,
    pub has_mx_records: bool,
    pub mx: Vec<MxRecord>,
    pub error: bool,
    pub error_msg: Option<String>,
    pub gravatar: Option<String>,
    pub suggestion: Option<String>,
}

impl VerificationObj {
    /// A placeholder verdict for an email that hasn't been probed yet
    /// beyond syntax/MX checks, used as the seed for the pipeline merge.
    #[must_use]
    pub fn unverified(email: &str, syntax: SyntaxInfo) -> Self {
        Self {
            email: email.to_string(),
            syntax,
            reachable: Reachable::Unknown,
            smtp: SmtpFindings::default(),
            disposable: false,
            role_account: false,
            free: false,
            has_mx_records: false,
            mx: Vec::new(),
            error: false,
            error_msg: None,
            gravatar: None,
            suggestion: None,
        }
    }
}

/// A row in the `results` table — the externally-visible status of a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultsRow {
    pub request_id: String,
    pub status: RequestStatus,
    pub verifying: bool,
    pub greylist_found: bool,
    pub blacklist_found: bool,
    pub results: Option<Vec<VerificationObj>>,
    pub total_emails: u32,
    pub completed_emails: u32,
    pub webhook_sent: bool,
    pub webhook_attempts: u32,
    pub response_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An in-flight archive entry: a partial result waiting for the rest of the
/// request's emails to settle (usually because some were greylisted).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveEntry {
    pub request_id: String,
    pub emails: Vec<String>,
    pub response_url: Option<String>,
    pub partial_result: HashMap<String, VerificationObj>,
    pub created_at: DateTime<Utc>,
}

impl ArchiveEntry {
    /// Merge `other`'s verdicts into `self`, `other` taking precedence for
    /// emails it supplies (used when a fresher partial replaces an older one).
    pub fn merge_fresh_wins(&mut self, other: HashMap<String, VerificationObj>) {
        self.partial_result.extend(other);
    }

    /// Merge `other`'s verdicts into `self`, an existing *terminal* verdict
    /// taking precedence over `other` (used on terminal merge). A verdict
    /// still marked greylisted or awaiting an MX recheck is not terminal —
    /// it is only a placeholder recording that the email was deferred — so
    /// `other` overwrites it, the same as for an email not yet present.
    /// This is what lets an anti-greylist retry's fresh "deliverable"
    /// verdict settle a request instead of being shadowed by the stale
    /// "greylisted" placeholder the first pass archived.
    pub fn merge_archive_wins(&mut self, other: HashMap<String, VerificationObj>) {
        for (email, verdict) in other {
            let existing_is_terminal = self
                .partial_result
                .get(&email)
                .is_some_and(|existing| !existing.smtp.greylisted && !existing.smtp.requires_recheck);
            if !existing_is_terminal {
                self.partial_result.insert(email, verdict);
            }
        }
    }
}

/// A deferred request waiting for a greylist retry window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AntiGreylistEntry {
    pub request_id: String,
    pub emails: HashSet<String>,
    pub response_url: Option<String>,
    pub attempts: u32,
    pub next_retry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A memoized catch-all verdict for a domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatchAllCacheEntry {
    pub domain: Domain,
    pub catch_all: bool,
    pub confidence: u8,
    pub test_count: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// One worker-slot assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub worker_index: u32,
    pub request: Request,
    pub created_at: DateTime<Utc>,
}
