//! Store domain type.

use chrono::{DateTime, Utc};
use serde::Serialize;

use clementine_core::{StoreId, UserId};

/// A tenant store (domain type).
///
/// Only the billing-relevant slice of the store is modelled here; catalog
/// and dashboard concerns live elsewhere.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    /// Unique store ID.
    pub id: StoreId,
    /// User who owns this store.
    pub owner_user_id: UserId,
    /// Display name.
    pub name: String,
    /// Projection of "this store has a subscription in status `Paid`".
    ///
    /// Written only by subscription lifecycle operations, never by
    /// store-editing flows.
    pub is_paid: bool,
    /// When the store was created.
    pub created_at: DateTime<Utc>,
    /// When the store was last updated.
    pub updated_at: DateTime<Utc>,
}
