pub mod carts;
pub mod checkout;
pub mod health;
pub mod orders;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PixGateway;
use crate::services::abandoned_carts::AbandonedCartService;
use crate::services::checkout::CheckoutService;
use crate::services::drafts::DraftStore;
use crate::services::merchants::MerchantSettingsService;
use crate::services::sales::SalesService;
use crate::services::tracking::TrackingService;
use crate::services::upsell::UpsellService;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub upsell: Arc<UpsellService>,
    pub sales: Arc<SalesService>,
    pub carts: Arc<AbandonedCartService>,
    pub merchants: Arc<MerchantSettingsService>,
    pub drafts: Arc<DraftStore>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        gateway: Arc<dyn PixGateway>,
        config: &AppConfig,
    ) -> Self {
        let drafts = Arc::new(DraftStore::new());
        let tracking = TrackingService::new();
        let sales = Arc::new(SalesService::new(
            db.clone(),
            event_sender.clone(),
            tracking,
        ));
        let carts = Arc::new(AbandonedCartService::new(db.clone(), event_sender.clone()));
        let settings_cache = Arc::new(crate::auth::SettingsCache::new(
            config.settings_cache_ttl(),
        ));
        let merchants = Arc::new(MerchantSettingsService::new(
            db.clone(),
            settings_cache,
            config.commission.clone(),
        ));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            gateway.clone(),
            sales.clone(),
            carts.clone(),
            drafts.clone(),
            merchants.clone(),
            event_sender.clone(),
            config.checkout.clone(),
        ));
        let upsell = Arc::new(UpsellService::new(
            db,
            gateway,
            sales.clone(),
            event_sender,
            config.checkout.clone(),
        ));

        Self {
            checkout,
            upsell,
            sales,
            carts,
            merchants,
            drafts,
        }
    }
}
