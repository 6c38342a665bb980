//! Pure pricing resolution for a checkout attempt.
//!
//! Combines the product's base price, an optional order-bump and an
//! optional coupon into the final charge amount plus a line-item
//! breakdown. No side effects; callers re-resolve whenever the product,
//! coupon or bump inclusion changes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{coupon, coupon::CouponKind, product};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteLineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    /// Price after discount, clamped at zero.
    pub unit_price_cents: i64,
    pub original_price_cents: i64,
    pub is_order_bump: bool,
    pub delivery_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Quote {
    pub final_price_cents: i64,
    pub original_price_cents: i64,
    pub discount_cents: i64,
    pub line_items: Vec<QuoteLineItem>,
}

/// Discount for a single coupon against the main line item's base price.
///
/// Percentage coupons round half away from zero at integer cents and must
/// carry a value in (0, 100]. Fixed coupons apply verbatim but never push
/// the line item below zero.
fn coupon_discount(base_cents: i64, coupon: &coupon::Model) -> Result<i64, ServiceError> {
    match coupon.kind {
        CouponKind::Percentage => {
            if coupon.value < 1 || coupon.value > 100 {
                return Err(ServiceError::ValidationError(format!(
                    "percentage coupon '{}' must be between 1 and 100",
                    coupon.code
                )));
            }
            Ok((base_cents * coupon.value + 50) / 100)
        }
        CouponKind::Fixed => {
            if coupon.value < 0 {
                return Err(ServiceError::ValidationError(format!(
                    "fixed coupon '{}' cannot be negative",
                    coupon.code
                )));
            }
            Ok(coupon.value.min(base_cents))
        }
    }
}

/// Resolves the quote for a checkout attempt.
///
/// `bump_product` is the product the main product's bump offer points at;
/// it is only consulted when `include_bump` is set and the offer carries no
/// override price. The bump is never discounted by the main coupon.
pub fn resolve_quote(
    product: &product::Model,
    bump_product: Option<&product::Model>,
    coupon: Option<&coupon::Model>,
    include_bump: bool,
) -> Result<Quote, ServiceError> {
    let base_cents = product.price_cents;

    let discount_cents = match coupon {
        Some(coupon) if coupon.active => coupon_discount(base_cents, coupon)?,
        _ => 0,
    };

    let mut line_items = vec![QuoteLineItem {
        product_id: product.id,
        name: product.name.clone(),
        quantity: 1,
        unit_price_cents: (base_cents - discount_cents).max(0),
        original_price_cents: base_cents,
        is_order_bump: false,
        delivery_url: product.delivery_url.clone(),
    }];

    let mut original_price_cents = base_cents;

    if include_bump {
        if let Some(bump_id) = product.bump_product_id {
            let bump_price = product
                .bump_price_cents
                .or_else(|| bump_product.map(|p| p.price_cents))
                .ok_or_else(|| {
                    ServiceError::InvalidOperation(
                        "order bump has no price and its product was not loaded".into(),
                    )
                })?;
            line_items.push(QuoteLineItem {
                product_id: bump_id,
                name: bump_product
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "Order bump".to_string()),
                quantity: 1,
                unit_price_cents: bump_price,
                original_price_cents: bump_price,
                is_order_bump: true,
                delivery_url: bump_product.and_then(|p| p.delivery_url.clone()),
            });
            original_price_cents += bump_price;
        }
    }

    let final_price_cents = (original_price_cents - discount_cents).max(0);

    Ok(Quote {
        final_price_cents,
        original_price_cents,
        discount_cents,
        line_items,
    })
}
