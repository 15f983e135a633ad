//! Policy-level wrapper around `mailcheck-store`'s anti-greylist table,
//! exposing the operation names from the deferred-email design: `add`,
//! `exists`, `check_greylist`, `try_greylisted`, `clear_for_request`.

use std::collections::HashSet;
use std::sync::Arc;

use mailcheck_store::{Request, Store};

use crate::error::RecoveryError;

pub struct AntiGreylistStore {
    store: Arc<Store>,
}

impl AntiGreylistStore {
    #[must_use]
    pub const fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Upserts a deferred entry: union of emails with any already deferred,
    /// `next_retry_at` reset per the backoff schedule for the new attempt.
    pub async fn add(
        &self,
        request_id: &str,
        emails: &HashSet<String>,
        response_url: Option<String>,
    ) -> Result<(), RecoveryError> {
        self.store.antigreylist_add(request_id, emails, response_url).await.map_err(RecoveryError::from)
    }

    pub async fn exists(&self, request_id: &str) -> Result<bool, RecoveryError> {
        self.store.antigreylist_exists(request_id).await.map_err(RecoveryError::from)
    }

    /// Whether a greylist record is currently active for `request_id`.
    pub async fn check_greylist(&self, request_id: &str) -> Result<bool, RecoveryError> {
        self.exists(request_id).await
    }

    /// Requests whose retry window has arrived. Bumps `attempts`; entries
    /// past the max attempt count are dropped by the store and excluded.
    pub async fn try_greylisted(&self) -> Result<Vec<Request>, RecoveryError> {
        self.store.antigreylist_try_ready().await.map_err(RecoveryError::from)
    }

    pub async fn clear_for_request(&self, request_id: &str) -> Result<(), RecoveryError> {
        self.store.antigreylist_clear(request_id).await.map_err(RecoveryError::from)
    }
}
