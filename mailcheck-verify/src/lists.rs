//! Static membership lists consulted during quick verification: role
//! accounts, free-mail domains, and disposable-mail domains.
//!
//! Disposable-domain list *refresh* is out of scope for this engine (an
//! external enrichment job, see `mailcheck-enrich`); this module only
//! consults whatever snapshot that job has most recently installed.

use std::collections::HashSet;
use std::sync::RwLock;

const ROLE_ACCOUNTS: &[&str] = &[
    "admin", "administrator", "webmaster", "hostmaster", "postmaster", "root", "support",
    "info", "sales", "contact", "billing", "abuse", "noc", "security", "help", "marketing",
    "noreply", "no-reply", "newsletter", "office", "team",
];

const FREE_DOMAINS: &[&str] = &[
    "gmail.com", "yahoo.com", "hotmail.com", "outlook.com", "aol.com", "icloud.com",
    "protonmail.com", "proton.me", "gmx.com", "mail.com", "zoho.com", "yandex.com", "live.com",
];

const SEED_DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com", "10minutemail.com", "guerrillamail.com", "tempmail.com", "trashmail.com",
    "yopmail.com", "sharklasers.com", "getnada.com", "dispostable.com", "throwawaymail.com",
];

#[must_use]
pub fn is_role_account(username: &str) -> bool {
    ROLE_ACCOUNTS.contains(&username.to_ascii_lowercase().as_str())
}

#[must_use]
pub fn is_free_domain(domain: &str) -> bool {
    FREE_DOMAINS.contains(&domain.to_ascii_lowercase().as_str())
}

/// Holds the currently-active disposable-domain snapshot. The
/// `mailcheck-enrich` `DisposableRefresh` enrichment installs new snapshots
/// via [`DisposableDomains::replace`]; this crate only reads it.
pub struct DisposableDomains {
    domains: RwLock<HashSet<String>>,
}

impl Default for DisposableDomains {
    fn default() -> Self {
        Self {
            domains: RwLock::new(SEED_DISPOSABLE_DOMAINS.iter().map(|s| (*s).to_string()).collect()),
        }
    }
}

impl DisposableDomains {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, domain: &str) -> bool {
        self.domains
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(&domain.to_ascii_lowercase())
    }

    /// Install a freshly-fetched snapshot, replacing the prior one wholesale.
    pub fn replace(&self, domains: HashSet<String>) {
        *self.domains.write().unwrap_or_else(std::sync::PoisonError::into_inner) = domains;
    }
}
