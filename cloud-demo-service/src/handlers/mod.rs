pub mod examples;
pub mod health;

pub use examples::{firestore_example, hello, storage_example};
pub use health::{health_check, metrics_endpoint, not_found};
