//! HTTP request handlers.

pub mod filter;
pub mod health;
pub mod zone;

pub use filter::filter_handler;
pub use health::{health_handler, metrics_handler, ready_handler};
pub use zone::{country_zone_handler, weight_schema_handler, zone_handler};
