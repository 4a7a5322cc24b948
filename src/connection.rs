//! Connection to one table and the entities stored in it.
//!
//! A [`Connection`] owns the validated schema of every registered entity and
//! the [`DocumentClient`] requests are sent through. It is immutable once
//! built and can be shared behind an [`Arc`].

use crate::{
    batch::WriteBatch,
    client::DocumentClient,
    common::{Item, key::PartitionKey, selection::SelectionMap},
    error::{Error, Result},
    expression::update::UpdateBody,
    read::{
        self, batch_get_item,
        get_item::{FindOneOptions, GetItemInput},
        query::QueryOptions,
        scan::ScanOptions,
    },
    schema::{
        entity::{Entity, EntityDeclaration, EntitySchema},
        table::Table,
    },
    transaction::{self, ReadTransaction, WriteTransaction, WriteTransactionItem},
    transformer::RequestTransformer,
    write::{
        common::WritePlan,
        delete_item::DeleteOptions,
        put_item::{CreateOptions, PutPlan},
        update_item::UpdateOptions,
    },
};

use indexmap::IndexMap;
use serde::Serialize;
use std::{fmt, sync::Arc};

/// Items a [`Connection::find`] or [`Connection::scan`] call reads when no
/// limit is given.
pub const DEFAULT_QUERY_ITEMS_IMPLICIT_LIMIT: usize = 3000;

/// Settings of a connection.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionOptions {
    /// Connection name, used in logs.
    pub name: String,
    /// Table every entity is stored in.
    pub table: Table,
    /// Items a query or scan reads when the caller gives no limit.
    pub query_items_implicit_limit: usize,
}

impl ConnectionOptions {
    /// Options named `default` for `table`.
    pub fn new(table: Table) -> Self {
        Self {
            name: "default".to_string(),
            table,
            query_items_implicit_limit: DEFAULT_QUERY_ITEMS_IMPLICIT_LIMIT,
        }
    }

    /// Rename the connection.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Change the implicit query limit.
    pub fn with_query_items_implicit_limit(mut self, limit: usize) -> Self {
        self.query_items_implicit_limit = limit;
        self
    }
}

/// Entities registered before the connection is built.
#[derive(Debug)]
pub struct ConnectionBuilder {
    options: ConnectionOptions,
    declarations: Vec<EntityDeclaration>,
}

impl ConnectionBuilder {
    /// Register the entity `E`.
    pub fn entity<E: Entity>(self) -> Self {
        self.declaration(E::declaration())
    }

    /// Register a raw declaration.
    pub fn declaration(mut self, declaration: EntityDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    /// Validate every declaration and build the connection.
    pub fn build(self, client: impl DocumentClient + 'static) -> Result<Connection> {
        let mut schemas = IndexMap::with_capacity(self.declarations.len());
        for declaration in self.declarations {
            if schemas.contains_key(&declaration.name) {
                return Err(Error::DuplicateEntityName(declaration.name));
            }
            let schema = EntitySchema::build(&self.options.table, declaration)?;
            schemas.insert(schema.name.clone(), schema);
        }
        crate::log!(
            debug,
            connection = %self.options.name,
            table = %self.options.table.name,
            entities = schemas.len(),
            "connection built"
        );
        Ok(Connection {
            options: self.options,
            schemas,
            client: Arc::new(client),
        })
    }
}

/// Result of [`Connection::find`] and [`Connection::scan`].
#[derive(Clone, Debug, PartialEq)]
pub struct FindResult<E> {
    /// Entities read, in key order for queries.
    pub items: Vec<E>,
    /// Key to resume from, when the read was not exhausted.
    pub cursor: Option<Item>,
}

/// Entry point of every entity operation.
///
/// ```rust,no_run
/// use dynamodb_odm::{
///     connection::{Connection, ConnectionOptions},
///     schema::{
///         attribute::{AttributeDeclaration, ScalarType},
///         entity::{Entity, EntityDeclaration, PrimaryKeyDeclaration},
///         table::Table,
///     },
///     write::put_item::CreateOptions,
/// };
/// use serde::{Deserialize, Serialize};
/// use serde_json::Value;
///
/// #[derive(Deserialize, Serialize)]
/// struct User {
///     id: String,
///     name: String,
/// }
///
/// impl Entity for User {
///     const NAME: &'static str = "user";
///
///     fn declaration() -> EntityDeclaration {
///         EntityDeclaration::new(
///             Self::NAME,
///             PrimaryKeyDeclaration::composite("USER#{{id}}", "USER#{{id}}"),
///         )
///         .attribute(AttributeDeclaration::new("id", ScalarType::String))
///         .attribute(AttributeDeclaration::new("name", ScalarType::String))
///     }
/// }
///
/// # async fn example() -> dynamodb_odm::error::Result<()> {
/// # let client = aws_sdk_dynamodb::Client::from_conf(aws_sdk_dynamodb::config::Config::builder().build());
/// let connection = Connection::builder(ConnectionOptions::new(
///     Table::new("users", "PK").with_sort_key("SK"),
/// ))
/// .entity::<User>()
/// .build(client)?;
/// let user = User {
///     id: "1".to_string(),
///     name: "Me".to_string(),
/// };
/// connection.create(&user, CreateOptions::<Value>::default()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Connection {
    options: ConnectionOptions,
    schemas: IndexMap<String, EntitySchema>,
    client: Arc<dyn DocumentClient>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("options", &self.options)
            .field("entities", &self.schemas.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn to_entity<E: Entity>(transformer: &RequestTransformer<'_>, item: Item) -> Result<E> {
    Ok(serde_dynamo::from_item(transformer.from_dynamo_item(item))?)
}

impl Connection {
    /// Start registering entities.
    pub fn builder(options: ConnectionOptions) -> ConnectionBuilder {
        ConnectionBuilder {
            options,
            declarations: Vec::new(),
        }
    }

    /// Connection settings.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Table of the connection.
    pub fn table(&self) -> &Table {
        &self.options.table
    }

    pub(crate) fn client(&self) -> &dyn DocumentClient {
        self.client.as_ref()
    }

    /// Schema of the entity named `name`.
    pub fn schema(&self, name: &str) -> Result<&EntitySchema> {
        self.schemas
            .get(name)
            .ok_or_else(|| Error::NoSuchEntity(name.to_string()))
    }

    /// Request planner of the entity `E`.
    pub fn transformer<E: Entity>(&self) -> Result<RequestTransformer<'_>> {
        self.transformer_by_name(E::NAME)
    }

    /// Request planner of the entity named `name`.
    pub fn transformer_by_name(&self, name: &str) -> Result<RequestTransformer<'_>> {
        Ok(RequestTransformer::new(&self.options.table, self.schema(name)?))
    }

    /// Store `entity`, failing when an item with the same key, or the same
    /// unique value, already exists.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.create", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn create<E: Entity, T: Serialize>(
        &self,
        entity: &E,
        options: CreateOptions<T>,
    ) -> Result<E> {
        let transformer = self.transformer::<E>()?;
        let plan = transformer.to_put_item(entity, options)?;
        let item = plan
            .item()
            .cloned()
            .ok_or_else(|| Error::invalid_input("the planned creation holds no item"))?;
        match plan {
            PutPlan::Item(input) => self.client.put_item(input).await?,
            plan @ PutPlan::Transaction(_) => {
                transaction::write(self.client(), vec![plan.into()]).await?
            }
        }
        to_entity(&transformer, item)
    }

    /// Read the entity identified by `primary_key_attributes`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.find_one", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn find_one<E: Entity, K: Serialize>(
        &self,
        primary_key_attributes: &K,
        options: FindOneOptions,
    ) -> Result<Option<E>> {
        let transformer = self.transformer::<E>()?;
        let input = transformer.to_get_item(primary_key_attributes, options)?;
        self.client
            .get_item(input)
            .await?
            .map(|item| to_entity(&transformer, item))
            .transpose()
    }

    /// Whether the entity identified by `primary_key_attributes` is stored.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.exists", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn exists<E: Entity, K: Serialize>(&self, primary_key_attributes: &K) -> Result<bool> {
        let options = FindOneOptions {
            selection: Some(SelectionMap::Leaves(vec![
                self.options.table.partition_key.clone(),
            ])),
            ..Default::default()
        };
        let input = self
            .transformer::<E>()?
            .to_get_item(primary_key_attributes, options)?;
        Ok(self.client.get_item(input).await?.is_some())
    }

    /// Update the entity identified by `primary_key_attributes` and return
    /// its new state.
    ///
    /// When the update moves the entity to a new primary key, the returned
    /// state is read from the new key.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.update", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn update<E: Entity, K: Serialize, B: Serialize, T: Serialize>(
        &self,
        primary_key_attributes: &K,
        body: UpdateBody<B>,
        options: UpdateOptions<T>,
    ) -> Result<Option<E>> {
        let transformer = self.transformer::<E>()?;
        let item = match transformer.to_update_item(primary_key_attributes, body, options)? {
            WritePlan::Item(input) => self.client.update_item(input).await?,
            WritePlan::Lazy(loader) => {
                let updated = GetItemInput::consistent(&self.options.table.name, loader.updated_key.clone());
                transaction::write(self.client(), vec![WriteTransactionItem::Lazy(loader)]).await?;
                crate::log!(trace, key = ?updated.key, "reading updated item");
                self.client.get_item(updated).await?
            }
        };
        item.map(|item| to_entity(&transformer, item)).transpose()
    }

    /// Delete the entity identified by `primary_key_attributes`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.delete", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn delete<E: Entity, K: Serialize, T: Serialize>(
        &self,
        primary_key_attributes: &K,
        options: DeleteOptions<T>,
    ) -> Result<()> {
        match self
            .transformer::<E>()?
            .to_delete_item(primary_key_attributes, options)?
        {
            WritePlan::Item(input) => self.client.delete_item(input).await,
            plan @ WritePlan::Lazy(_) => transaction::write(self.client(), vec![plan.into()]).await,
        }
    }

    /// Read the entities of a partition, up to the limit of `options` or the
    /// implicit limit of the connection.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.find", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn find<E: Entity, K: Serialize, T: Serialize>(
        &self,
        partition_key: PartitionKey<K>,
        options: QueryOptions<T>,
    ) -> Result<FindResult<E>> {
        let limit = options
            .limit
            .unwrap_or(self.options.query_items_implicit_limit);
        let transformer = self.transformer::<E>()?;
        let input = transformer.to_query_item(
            partition_key,
            QueryOptions {
                only_count: false,
                ..options
            },
        )?;
        let (items, cursor) = read::common::paginate(self.client(), input, limit).await?;
        let items = items
            .into_iter()
            .map(|item| to_entity(&transformer, item))
            .collect::<Result<_>>()?;
        Ok(FindResult { items, cursor })
    }

    /// Count the entities of a partition matching `options`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.count", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn count<E: Entity, K: Serialize, T: Serialize>(
        &self,
        partition_key: PartitionKey<K>,
        options: QueryOptions<T>,
    ) -> Result<usize> {
        let input = self.transformer::<E>()?.to_query_item(
            partition_key,
            QueryOptions {
                only_count: true,
                limit: None,
                ..options
            },
        )?;
        read::common::count(self.client(), input).await
    }

    /// Read every stored entity identified in `primary_key_attributes`, in
    /// no particular order. Missing entities are skipped.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.batch_get", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn batch_get<E: Entity, K: Serialize>(
        &self,
        primary_key_attributes: &[K],
        options: FindOneOptions,
    ) -> Result<Vec<E>> {
        let transformer = self.transformer::<E>()?;
        let inputs = transformer.to_batch_get_item(primary_key_attributes, options)?;
        batch_get_item::get(self.client(), inputs)
            .await?
            .into_iter()
            .map(|item| to_entity(&transformer, item))
            .collect()
    }

    /// Read the entities stored in the table, or in one segment of it, up to
    /// the limit of `options` or the implicit limit of the connection.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.scan", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn scan<E: Entity, T: Serialize>(&self, options: ScanOptions<T>) -> Result<FindResult<E>> {
        let limit = options
            .limit
            .unwrap_or(self.options.query_items_implicit_limit);
        let transformer = self.transformer::<E>()?;
        let input = transformer.to_scan_item(ScanOptions {
            only_count: false,
            ..options
        })?;
        let (items, cursor) = read::common::paginate(self.client(), input, limit).await?;
        let items = items
            .into_iter()
            .map(|item| to_entity(&transformer, item))
            .collect::<Result<_>>()?;
        Ok(FindResult { items, cursor })
    }

    /// Count the stored entities matching `options`, reading the whole table
    /// or segment.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.scan_count", skip_all, fields(entity = E::NAME), err)
    )]
    pub async fn scan_count<E: Entity, T: Serialize>(&self, options: ScanOptions<T>) -> Result<usize> {
        let input = self.transformer::<E>()?.to_scan_item(ScanOptions {
            only_count: true,
            limit: None,
            ..options
        })?;
        read::common::count(self.client(), input).await
    }

    /// Start a write batch.
    pub fn write_batch(&self) -> WriteBatch<'_> {
        WriteBatch::new(self)
    }

    /// Start a write transaction.
    pub fn write_transaction(&self) -> WriteTransaction<'_> {
        WriteTransaction::new(self)
    }

    /// Start a read transaction.
    pub fn read_transaction(&self) -> ReadTransaction<'_> {
        ReadTransaction::new(self)
    }
}
