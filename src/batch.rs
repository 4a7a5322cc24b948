//! Unconditional batch writes.
//!
//! A write batch collects puts and deletes of any registered entity and sends
//! them in requests of at most
//! [`MAX_BATCH_WRITE_ITEMS`](crate::write::batch_write_item::MAX_BATCH_WRITE_ITEMS)
//! writes. Unlike a transaction, each request applies on its own and carries
//! no condition, so entities with unique attributes are rejected.

use crate::{
    connection::Connection,
    error::Result,
    schema::entity::Entity,
    write::batch_write_item::{self, BatchWriteRequest},
};

use serde::Serialize;

/// Write batch under construction.
///
/// ```rust,no_run
/// use dynamodb_odm::connection::Connection;
/// # use dynamodb_odm::schema::entity::{Entity, EntityDeclaration, PrimaryKeyDeclaration};
/// # #[derive(serde::Serialize, serde::Deserialize)]
/// # struct User { id: String }
/// # impl Entity for User {
/// #     const NAME: &'static str = "user";
/// #     fn declaration() -> EntityDeclaration {
/// #         EntityDeclaration::new(Self::NAME, PrimaryKeyDeclaration::simple("USER#{{id}}"))
/// #     }
/// # }
/// use serde_json::json;
///
/// # async fn example(connection: &Connection) -> dynamodb_odm::error::Result<()> {
/// connection
///     .write_batch()
///     .put(&User { id: "1".to_string() })?
///     .delete::<User, _>(&json!({"id": "2"}))?
///     .send()
///     .await
/// # }
/// ```
#[derive(Debug)]
pub struct WriteBatch<'c> {
    connection: &'c Connection,
    requests: Vec<BatchWriteRequest>,
}

impl<'c> WriteBatch<'c> {
    pub(crate) fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
            requests: Vec::new(),
        }
    }

    /// Add the put of `entity`, replacing any stored item with the same key.
    pub fn put<E: Entity>(mut self, entity: &E) -> Result<Self> {
        let request = self
            .connection
            .transformer::<E>()?
            .to_batch_put_request(entity)?;
        self.requests.push(request);
        Ok(self)
    }

    /// Add the deletion of the entity identified by `primary_key_attributes`.
    pub fn delete<E: Entity, K: Serialize>(mut self, primary_key_attributes: &K) -> Result<Self> {
        let request = self
            .connection
            .transformer::<E>()?
            .to_batch_delete_request(primary_key_attributes)?;
        self.requests.push(request);
        Ok(self)
    }

    /// Number of writes added so far.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether no write was added.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Send every write, resubmitting the ones DynamoDB leaves unprocessed.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.write_batch", skip_all, fields(requests = self.requests.len()), err)
    )]
    pub async fn send(self) -> Result<()> {
        let inputs =
            batch_write_item::to_batch_write_items(&self.connection.table().name, self.requests);
        batch_write_item::write(self.connection.client(), inputs).await
    }
}
