#![deny(missing_docs)]
#![deny(warnings)]

//! # DynamoDB ODM
//!
//! An object to document mapper for Amazon DynamoDB single table designs.
//!
//! ## Overview
//!
//! Entities are declared once, with key templates such as `USER#{{id}}`, and
//! every operation on them is compiled into native DynamoDB requests:
//! - Primary key and secondary index attributes are derived from the entity
//! - Conditions, filters, projections and updates are structured values,
//!   compiled into placeholder based expressions
//! - Unique attributes and primary key changes, which DynamoDB cannot enforce
//!   on its own, are emulated with transactions planned from the stored item
//! - Queries and scans are paginated up to a limit and can resume from a cursor
//! - Batch reads and writes are split to the per request limits of DynamoDB
//!
//! ## Quick Example
//!
//! ```no_run
//! use dynamodb_odm::{
//!     connection::{Connection, ConnectionOptions},
//!     expression::update::{SetValue, UpdateBody, UpdateValue},
//!     schema::{
//!         attribute::{AttributeDeclaration, ScalarType, UniqueConstraint},
//!         entity::{Entity, EntityDeclaration, IndexDeclaration, PrimaryKeyDeclaration},
//!         table::{IndexDefinition, Table},
//!     },
//!     write::{put_item::CreateOptions, update_item::UpdateOptions},
//! };
//! use serde::{Deserialize, Serialize};
//! use serde_json::{Value, json};
//!
//! #[derive(Deserialize, Serialize)]
//! struct User {
//!     id: String,
//!     email: String,
//!     status: String,
//! }
//!
//! impl Entity for User {
//!     const NAME: &'static str = "user";
//!
//!     fn declaration() -> EntityDeclaration {
//!         EntityDeclaration::new(
//!             Self::NAME,
//!             PrimaryKeyDeclaration::composite("USER#{{id}}", "USER#{{id}}"),
//!         )
//!         .attribute(AttributeDeclaration::new("id", ScalarType::String))
//!         .attribute(
//!             AttributeDeclaration::new("email", ScalarType::String)
//!                 .unique(UniqueConstraint::Generated),
//!         )
//!         .attribute(AttributeDeclaration::new("status", ScalarType::String))
//!         .index(
//!             "GSI1",
//!             IndexDeclaration::global("USER#STATUS#{{status}}", "USER#{{id}}"),
//!         )
//!     }
//! }
//!
//! # async fn example() -> dynamodb_odm::error::Result<()> {
//! # let client = aws_sdk_dynamodb::Client::from_conf(aws_sdk_dynamodb::config::Config::builder().build());
//! let table = Table::new("users", "PK")
//!     .with_sort_key("SK")
//!     .with_index("GSI1", IndexDefinition::global("GSI1PK", "GSI1SK"));
//! let connection = Connection::builder(ConnectionOptions::new(table))
//!     .entity::<User>()
//!     .build(client)?;
//!
//! // main item and the shadow item of the email, in one transaction
//! let user = User {
//!     id: "1".to_string(),
//!     email: "me@example.com".to_string(),
//!     status: "active".to_string(),
//! };
//! connection.create(&user, CreateOptions::<Value>::default()).await?;
//!
//! // "SET #UE_status = :UE_status, #UE_GSI1PK = :UE_GSI1PK, #UE_GSI1SK = :UE_GSI1SK"
//! let user: Option<User> = connection
//!     .update(
//!         &json!({"id": "1"}),
//!         UpdateBody::from([(
//!             "status".to_string(),
//!             UpdateValue::Set(SetValue::Assign(json!("inactive"))),
//!         )]),
//!         UpdateOptions::<Value>::default(),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`mod@schema`] - Tables, entity declarations and key templates
//! - [`mod@expression`] - Placeholder based expression compiler
//! - [`mod@common`] - Shared item, key, condition and selection types
//! - [`mod@read`] - Read requests (GetItem, BatchGetItem, Query, Scan)
//! - [`mod@write`] - Write requests (PutItem, UpdateItem, DeleteItem, BatchWriteItem)
//! - [`mod@transaction`] - Write and read transactions
//! - [`mod@batch`] - Unconditional write batches
//! - [`mod@connection`] - Entity operations on a table

/// Emit a `tracing` event when the `tracing` feature is enabled.
macro_rules! log {
    ($level:ident, $($arg:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::$level!($($arg)+);
    };
}

pub(crate) use log;

/// Unconditional write batches.
pub mod batch;

/// Seam every request goes through.
pub mod client;

/// Common types for items, keys, conditions, and attribute selection.
pub mod common;

/// Registered entities and the operations on them.
pub mod connection;

/// Error type and result alias.
pub mod error;

/// Expression compiler shared by conditions, filters, projections, and updates.
pub mod expression;

/// Read requests for retrieving entities from DynamoDB tables.
///
/// This module provides requests for:
/// - Getting entities by primary key, one at a time or in batches
/// - Querying the entities of a partition
/// - Scanning every entity of a kind
pub mod read;

/// Entity schemas, built from declarations.
pub mod schema;

/// Write and read transactions.
pub mod transaction;

/// Planning of entity operations into requests.
pub mod transformer;

/// Write requests for modifying entities in DynamoDB tables.
///
/// This module provides requests for:
/// - Creating entities, with their unique attribute shadow items
/// - Updating entities, moving them when their primary key changes
/// - Deleting entities, with their unique attribute shadow items
/// - Putting and deleting entities in batches
pub mod write;
