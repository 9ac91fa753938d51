//! Billing domain types.
//!
//! These types represent validated domain objects separate from database row
//! types.

pub mod store;
pub mod subscription;

pub use store::Store;
pub use subscription::{NewSubscription, StatusChange, Subscription};
