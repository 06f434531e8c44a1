pub mod inventory;
pub mod lifecycle;
pub mod pricing;

pub use pricing::PricingRules;
