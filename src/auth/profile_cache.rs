//! Bounded-TTL cache for per-merchant settings lookups.
//!
//! The clock is injected so expiry is testable without sleeping.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::entities::merchant_settings;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CacheEntry {
    stored_at: Instant,
    settings: merchant_settings::Model,
}

/// In-memory settings cache keyed by owner id.
pub struct SettingsCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<Uuid, CacheEntry>>,
}

impl SettingsCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, owner_id: Uuid) -> Option<merchant_settings::Model> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().unwrap();
            match entries.get(&owner_id) {
                Some(entry) if now.duration_since(entry.stored_at) < self.ttl => {
                    return Some(entry.settings.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        // Expired entry; drop it so the map stays bounded by active owners.
        self.entries.write().unwrap().remove(&owner_id);
        None
    }

    pub fn insert(&self, settings: merchant_settings::Model) {
        let entry = CacheEntry {
            stored_at: self.clock.now(),
            settings: settings.clone(),
        };
        self.entries.write().unwrap().insert(settings.owner_id, entry);
    }

    pub fn invalidate(&self, owner_id: Uuid) {
        self.entries.write().unwrap().remove(&owner_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    fn settings(owner_id: Uuid) -> merchant_settings::Model {
        merchant_settings::Model {
            id: Uuid::new_v4(),
            owner_id,
            commission_percent: dec!(0.05),
            fixed_fee_cents: 100,
            tracking_webhook_url: None,
            tracking_webhook_token: None,
            tracking_enabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn returns_fresh_entries() {
        let clock = Arc::new(ManualClock::new());
        let cache = SettingsCache::with_clock(Duration::from_secs(300), clock.clone());
        let owner_id = Uuid::new_v4();
        cache.insert(settings(owner_id));

        clock.advance(Duration::from_secs(299));
        assert!(cache.get(owner_id).is_some());
    }

    #[test]
    fn expires_entries_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = SettingsCache::with_clock(Duration::from_secs(300), clock.clone());
        let owner_id = Uuid::new_v4();
        cache.insert(settings(owner_id));

        clock.advance(Duration::from_secs(301));
        assert!(cache.get(owner_id).is_none());
        // Expired entry is gone for good until re-inserted.
        assert!(cache.get(owner_id).is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = SettingsCache::new(Duration::from_secs(300));
        let owner_id = Uuid::new_v4();
        cache.insert(settings(owner_id));
        cache.invalidate(owner_id);
        assert!(cache.get(owner_id).is_none());
    }
}
