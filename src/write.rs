//! Write requests for modifying entities in DynamoDB tables.
//!
//! This module provides the requests the mapper writes with:
//! - Putting new items, along with the shadow items of unique attributes
//! - Updating items, or moving them when the primary key changes
//! - Deleting items and their shadow items
//! - Putting and deleting items in unconditional batches

/// Batch write item request for putting and deleting many entities.
pub mod batch_write_item;

/// Common utilities and types for write requests.
pub mod common;

/// Delete item request for removing entities.
pub mod delete_item;

/// Put item request for creating entities.
pub mod put_item;

/// Update item request for modifying entities.
pub mod update_item;
