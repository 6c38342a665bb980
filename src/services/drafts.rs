//! Keyed snapshot store for buyer-entered checkout drafts.
//!
//! Mirrors the browser-local draft the checkout page keeps per product
//! slug: written on every field change, read once when a session opens,
//! cleared on successful purchase.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CheckoutDraft {
    pub slug: String,
    pub customer_name: String,
    pub customer_email: String,
    pub whatsapp_number: String,
    pub country_code: String,
}

#[derive(Debug, Default)]
pub struct DraftStore {
    entries: DashMap<String, CheckoutDraft>,
}

impl DraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, draft: CheckoutDraft) {
        self.entries.insert(draft.slug.clone(), draft);
    }

    /// Loads the draft stored for `slug`. A draft whose own slug disagrees
    /// with its key is stale and gets discarded instead of returned.
    pub fn load(&self, slug: &str) -> Option<CheckoutDraft> {
        let draft = self.entries.get(slug).map(|entry| entry.clone())?;
        if draft.slug != slug {
            self.entries.remove(slug);
            return None;
        }
        Some(draft)
    }

    pub fn clear(&self, slug: &str) {
        self.entries.remove(slug);
    }
}
