//! Write and read transactions.
//!
//! A write transaction collects planned writes. Writes that depend on the
//! stored item are resolved concurrently right before submission, then every
//! item is flattened in call order and sent in one `TransactWriteItems`
//! request.

use crate::{
    client::DocumentClient,
    common::Item,
    connection::Connection,
    error::{Error, Result},
    expression::update::UpdateBody,
    read::get_item::{FindOneOptions, GetItemInput},
    schema::entity::Entity,
    write::{
        common::{LazyTransactWriteItemListLoader, TransactWriteItem, WritePlan},
        delete_item::{DeleteItemInput, DeleteOptions},
        put_item::{CreateOptions, PutItemInput, PutPlan},
        update_item::{UpdateItemInput, UpdateOptions},
    },
};

use futures::future;
use serde::Serialize;

/// Maximum number of items of a write transaction.
pub const MAX_WRITE_TRANSACTION_ITEMS: usize = 100;

/// Maximum number of items of a read transaction.
pub const MAX_READ_TRANSACTION_ITEMS: usize = 100;

/// Entry of a write transaction.
#[derive(Debug)]
pub enum WriteTransactionItem {
    /// Writes known up front.
    Items(Vec<TransactWriteItem>),
    /// Writes planned from the stored item.
    Lazy(LazyTransactWriteItemListLoader),
}

impl WriteTransactionItem {
    /// Fewest transaction items the entry resolves to.
    fn minimum_len(&self) -> usize {
        match self {
            Self::Items(items) => items.len(),
            Self::Lazy(_) => 1,
        }
    }
}

impl From<PutItemInput> for TransactWriteItem {
    fn from(input: PutItemInput) -> Self {
        Self::Put(input)
    }
}

impl From<UpdateItemInput> for TransactWriteItem {
    fn from(input: UpdateItemInput) -> Self {
        Self::Update(input)
    }
}

impl From<DeleteItemInput> for TransactWriteItem {
    fn from(input: DeleteItemInput) -> Self {
        Self::Delete(input)
    }
}

impl From<PutPlan> for WriteTransactionItem {
    fn from(plan: PutPlan) -> Self {
        match plan {
            PutPlan::Item(input) => Self::Items(vec![input.into()]),
            PutPlan::Transaction(items) => Self::Items(items),
        }
    }
}

impl<T: Into<TransactWriteItem>> From<WritePlan<T>> for WriteTransactionItem {
    fn from(plan: WritePlan<T>) -> Self {
        match plan {
            WritePlan::Item(input) => Self::Items(vec![input.into()]),
            WritePlan::Lazy(loader) => Self::Lazy(loader),
        }
    }
}

fn check_write_limit(count: usize) -> Result<()> {
    if count > MAX_WRITE_TRANSACTION_ITEMS {
        return Err(Error::WriteTransactionItemLimitExceeded {
            count,
            limit: MAX_WRITE_TRANSACTION_ITEMS,
        });
    }
    Ok(())
}

fn check_read_limit(count: usize) -> Result<()> {
    if count > MAX_READ_TRANSACTION_ITEMS {
        return Err(Error::ReadTransactionItemLimitExceeded {
            count,
            limit: MAX_READ_TRANSACTION_ITEMS,
        });
    }
    Ok(())
}

async fn resolve(
    client: &dyn DocumentClient,
    item: WriteTransactionItem,
) -> Result<Vec<TransactWriteItem>> {
    match item {
        WriteTransactionItem::Items(items) => Ok(items),
        WriteTransactionItem::Lazy(loader) => {
            let previous = client.get_item(loader.previous.clone()).await?;
            crate::log!(
                trace,
                entity = %loader.entity,
                found = previous.is_some(),
                "stored item loaded"
            );
            loader.load(previous.as_ref())
        }
    }
}

/// Resolve, flatten and submit `items` as one write transaction.
pub(crate) async fn write(
    client: &dyn DocumentClient,
    items: Vec<WriteTransactionItem>,
) -> Result<()> {
    check_write_limit(items.iter().map(WriteTransactionItem::minimum_len).sum())?;
    let resolved =
        future::try_join_all(items.into_iter().map(|item| resolve(client, item))).await?;
    let items: Vec<_> = resolved.into_iter().flatten().collect();
    check_write_limit(items.len())?;
    if items.is_empty() {
        return Ok(());
    }
    crate::log!(debug, items = items.len(), "submitting write transaction");
    client.transact_write_items(items).await
}

/// Write transaction under construction.
///
/// ```rust,no_run
/// use dynamodb_odm::{
///     connection::Connection,
///     expression::update::{SetValue, UpdateBody, UpdateValue},
///     write::{delete_item::DeleteOptions, update_item::UpdateOptions},
/// };
/// # use dynamodb_odm::schema::entity::{Entity, EntityDeclaration, PrimaryKeyDeclaration};
/// # #[derive(serde::Serialize, serde::Deserialize)]
/// # struct User { id: String }
/// # impl Entity for User {
/// #     const NAME: &'static str = "user";
/// #     fn declaration() -> EntityDeclaration {
/// #         EntityDeclaration::new(Self::NAME, PrimaryKeyDeclaration::simple("USER#{{id}}"))
/// #     }
/// # }
/// use serde_json::{Value, json};
///
/// # async fn example(connection: &Connection) -> dynamodb_odm::error::Result<()> {
/// connection
///     .write_transaction()
///     .update::<User, _, _, Value>(
///         &json!({"id": "1"}),
///         UpdateBody::from([("name".to_string(), UpdateValue::Set(SetValue::Assign(json!("Me"))))]),
///         UpdateOptions::default(),
///     )?
///     .delete::<User, _, Value>(&json!({"id": "2"}), DeleteOptions::default())?
///     .send()
///     .await
/// # }
/// ```
#[derive(Debug)]
pub struct WriteTransaction<'c> {
    connection: &'c Connection,
    items: Vec<WriteTransactionItem>,
}

impl<'c> WriteTransaction<'c> {
    pub(crate) fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
            items: Vec::new(),
        }
    }

    /// Add the creation of `entity`.
    pub fn create<E: Entity, T: Serialize>(
        mut self,
        entity: &E,
        options: CreateOptions<T>,
    ) -> Result<Self> {
        let plan = self
            .connection
            .transformer::<E>()?
            .to_put_item(entity, options)?;
        self.items.push(plan.into());
        Ok(self)
    }

    /// Add the update of the entity identified by `primary_key_attributes`.
    pub fn update<E: Entity, K: Serialize, B: Serialize, T: Serialize>(
        mut self,
        primary_key_attributes: &K,
        body: UpdateBody<B>,
        options: UpdateOptions<T>,
    ) -> Result<Self> {
        let plan = self
            .connection
            .transformer::<E>()?
            .to_update_item(primary_key_attributes, body, options)?;
        self.items.push(plan.into());
        Ok(self)
    }

    /// Add the deletion of the entity identified by `primary_key_attributes`.
    pub fn delete<E: Entity, K: Serialize, T: Serialize>(
        mut self,
        primary_key_attributes: &K,
        options: DeleteOptions<T>,
    ) -> Result<Self> {
        let plan = self
            .connection
            .transformer::<E>()?
            .to_delete_item(primary_key_attributes, options)?;
        self.items.push(plan.into());
        Ok(self)
    }

    /// Add an already planned entry.
    pub fn push(mut self, item: impl Into<WriteTransactionItem>) -> Self {
        self.items.push(item.into());
        self
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no entry was added.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Resolve and submit the transaction.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.write_transaction", skip_all, err)
    )]
    pub async fn send(self) -> Result<()> {
        write(self.connection.client(), self.items).await
    }
}

/// Read transaction under construction.
///
/// ```rust,no_run
/// use dynamodb_odm::{connection::Connection, read::get_item::FindOneOptions};
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
/// let output = connection
///     .read_transaction()
///     .get::<User, _>(&json!({"id": "1"}), FindOneOptions::default())?
///     .get::<User, _>(&json!({"id": "2"}), FindOneOptions::default())?
///     .send()
///     .await?;
/// let first: Option<User> = output.get(0)?;
/// let found: Vec<User> = output.entities()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ReadTransaction<'c> {
    connection: &'c Connection,
    items: Vec<(&'static str, GetItemInput)>,
}

impl<'c> ReadTransaction<'c> {
    pub(crate) fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
            items: Vec::new(),
        }
    }

    /// Add the read of the entity identified by `primary_key_attributes`.
    pub fn get<E: Entity, K: Serialize>(
        mut self,
        primary_key_attributes: &K,
        options: FindOneOptions,
    ) -> Result<Self> {
        let input = self
            .connection
            .transformer::<E>()?
            .to_get_item(primary_key_attributes, options)?;
        self.items.push((E::NAME, input));
        Ok(self)
    }

    /// Number of reads added so far.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no read was added.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Read every entity atomically.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.read_transaction", skip_all, err)
    )]
    pub async fn send(self) -> Result<ReadTransactionOutput> {
        check_read_limit(self.items.len())?;
        if self.items.is_empty() {
            return Ok(ReadTransactionOutput::default());
        }
        let (entities, inputs): (Vec<_>, Vec<_>) = self.items.into_iter().unzip();
        let items = self.connection.client().transact_get_items(inputs).await?;
        let mut output = ReadTransactionOutput {
            items: Vec::with_capacity(items.len()),
        };
        for (entity, item) in entities.into_iter().zip(items) {
            let transformer = self.connection.transformer_by_name(entity)?;
            output
                .items
                .push((entity, item.map(|item| transformer.from_dynamo_item(item))));
        }
        Ok(output)
    }
}

/// Entities read by a [`ReadTransaction`], in call order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadTransactionOutput {
    items: Vec<(&'static str, Option<Item>)>,
}

impl ReadTransactionOutput {
    /// Number of reads.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the transaction read nothing.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entity of the `index`th read, `None` when it is not stored.
    ///
    /// Fails when the `index`th read does not exist or targets another
    /// entity than `E`.
    pub fn get<E: Entity>(&self, index: usize) -> Result<Option<E>> {
        match self.items.get(index) {
            Some((entity, item)) if *entity == E::NAME => Ok(item
                .clone()
                .map(serde_dynamo::from_item)
                .transpose()?),
            found => Err(Error::ReadTransactionItemMismatch {
                index,
                expected: E::NAME.to_string(),
                found: found.map(|(entity, _)| entity.to_string()),
            }),
        }
    }

    /// Every stored `E` entity, in call order.
    pub fn entities<E: Entity>(&self) -> Result<Vec<E>> {
        self.items
            .iter()
            .filter(|(entity, _)| *entity == E::NAME)
            .filter_map(|(_, item)| item.clone())
            .map(|item| serde_dynamo::from_item(item).map_err(Error::from))
            .collect()
    }

    /// Entity name and attributes of every read, in call order.
    pub fn into_items(self) -> Vec<(&'static str, Option<Item>)> {
        self.items
    }
}
