//! The merge delta an enrichment module hands back to the worker.

use mailcheck_store::{Reachable, SmtpFindings};

/// Fields an enrichment may populate on a `VerificationObj`. Every field is
/// optional; `None` means "this module has no opinion", not "false".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentDelta {
    pub smtp: Option<SmtpFindings>,
    pub reachable: Option<Reachable>,
    pub gravatar: Option<String>,
    pub suggestion: Option<String>,
    pub disposable: Option<bool>,
    pub error: Option<bool>,
    pub error_msg: Option<String>,
}

impl EnrichmentDelta {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            smtp: None,
            reachable: None,
            gravatar: None,
            suggestion: None,
            disposable: None,
            error: None,
            error_msg: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_delta_has_no_opinions() {
        let delta = EnrichmentDelta::empty();
        assert!(delta.smtp.is_none());
        assert!(delta.reachable.is_none());
    }
}
