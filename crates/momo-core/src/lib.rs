//! # MoMo Core
//!
//! Shared vocabulary for the MoMo notification bot: scope selectors,
//! subscriptions, dataset rows, the messaging seam, configuration and errors.

pub mod config;
pub mod error;
pub mod messages;
pub mod scope;
pub mod traits;
pub mod types;

pub use config::MomoConfig;
pub use error::{MomoError, Result};
pub use scope::{ScopeLevel, ScopeSelector};
pub use traits::{DeliveryOutcome, Messenger};
pub use types::{DatasetRecord, Metric, NotifyTime, UserId, UserSubscription};
