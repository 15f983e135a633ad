//! The typed events the core pipeline dispatches.

/// An enrichment event, carrying just enough context for a module to act.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Fired once per controller startup cycle; a module may refresh the
    /// disposable-domain snapshot consulted during quick verification.
    DisposableRefresh,

    /// Fired per email during quick verification.
    GravatarLookup { email: String },

    /// Fired for an email whose lowest-pref MX classifies as a Microsoft
    /// domain, in place of the standard SMTP probe.
    MicrosoftLoginProbe { email: String },

    /// Fired for an email whose lowest-pref MX classifies as a Yahoo
    /// domain, in place of the standard SMTP probe.
    YahooProbe { email: String },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DisposableRefresh => "disposable_refresh",
            Self::GravatarLookup { .. } => "gravatar_lookup",
            Self::MicrosoftLoginProbe { .. } => "microsoft_login_probe",
            Self::YahooProbe { .. } => "yahoo_probe",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name() {
        assert_eq!(Event::DisposableRefresh.name(), "disposable_refresh");
        assert_eq!(
            Event::GravatarLookup { email: "a@b.com".into() }.name(),
            "gravatar_lookup"
        );
    }
}
