//! Read requests for retrieving entities from DynamoDB tables.
//!
//! This module provides the requests the mapper reads with:
//! - Getting individual items by primary key, alone or in batches
//! - Querying the items of a partition, on the table or an index
//! - Scanning every item of an entity, optionally in parallel segments

/// Batch get item request for retrieving many entities by primary key.
pub mod batch_get_item;

/// Common utilities and types for read requests.
pub mod common;

/// Get item request for retrieving a single item by primary key.
pub mod get_item;

/// Query request for retrieving the items of a partition.
pub mod query;

/// Scan request for retrieving every item of an entity.
pub mod scan;
