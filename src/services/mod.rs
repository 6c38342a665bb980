pub mod abandoned_carts;
pub mod checkout;
pub mod drafts;
pub mod merchants;
pub mod payment_cycle;
pub mod pricing;
pub mod sales;
pub mod tracking;
pub mod upsell;
