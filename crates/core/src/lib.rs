pub mod config;
pub mod error;
pub mod event_bus;
pub mod loyalty;
pub mod store;
pub mod types;

pub use config::{AppConfig, LoyaltyConfig};
pub use error::{ErrorCategory, LoyaltyError, LoyaltyResult};
pub use event_bus::EventSink;
pub use store::RecordStore;
pub use types::Money;
