use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::entities::abandoned_cart::CartStatus;
use crate::errors::ErrorResponse;
use crate::gateway::{ChargeHandle, PaymentStatus};
use crate::services::checkout::{
    BumpOfferView, BuyerFields, ChargeView, CheckoutPageView, SessionView,
};
use crate::services::drafts::CheckoutDraft;
use crate::services::pricing::{Quote, QuoteLineItem};
use crate::services::upsell::{UpsellCycleView, UpsellOffer};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PixCheckout API",
        description = "Checkout, PIX payment orchestration and order management"
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::checkout::checkout_page,
        crate::handlers::checkout::open_session,
        crate::handlers::checkout::session_state,
        crate::handlers::checkout::update_buyer,
        crate::handlers::checkout::apply_coupon,
        crate::handlers::checkout::remove_coupon,
        crate::handlers::checkout::set_bump,
        crate::handlers::checkout::submit,
        crate::handlers::checkout::teardown_session,
        crate::handlers::orders::confirmation,
        crate::handlers::orders::accept_upsell,
        crate::handlers::orders::decline_upsell,
        crate::handlers::orders::upsell_state,
        crate::handlers::orders::teardown_upsell,
        crate::handlers::carts::list_carts,
        crate::handlers::carts::update_cart_status,
    ),
    components(schemas(
        ErrorResponse,
        PaymentStatus,
        ChargeHandle,
        ChargeView,
        Quote,
        QuoteLineItem,
        BuyerFields,
        BumpOfferView,
        SessionView,
        CheckoutPageView,
        CheckoutDraft,
        UpsellOffer,
        UpsellCycleView,
        CartStatus,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "checkout", description = "Buyer-facing checkout flow"),
        (name = "orders", description = "Confirmation and post-purchase upsell"),
        (name = "abandoned-carts", description = "Merchant follow-up on abandoned carts"),
        (name = "health", description = "Service probes")
    )
)]
pub struct ApiDoc;
