//! Payment-provider boundary (Stripe).

pub mod stripe;

pub use stripe::StripeClient;
