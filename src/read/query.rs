use crate::{
    client::DocumentClient,
    common::{
        Item,
        condition::{Condition, ConditionMap, KeyCondition},
        key::PartitionKey,
        selection::SelectionMap,
    },
    error::{Error, Result},
    expression::{Expression, ExpressionKind, MergeStrategy},
    read,
    schema::table::IndexDefinition,
    transformer::RequestTransformer,
};

use aws_sdk_dynamodb::{Client, types};
use futures::future::BoxFuture;
use serde::Serialize;

/// query operation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryInput {
    /// Compiled key condition.
    pub key_condition_expression: String,
    /// Read parameters (table, index, filter, projection, paging).
    pub multiple_read_operation: read::common::MultipleReadInput,
    /// Whether to read the sort key in ascending order.
    pub scan_index_forward: Option<bool>,
}

/// One page of a query.
pub type QueryOutput = read::common::MultipleReadOutput;

impl QueryInput {
    /// Execute one page of the query operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.query", skip_all, err)
    )]
    pub(crate) async fn send(self, client: &Client) -> Result<QueryOutput> {
        let builder = client
            .query()
            .key_condition_expression(self.key_condition_expression)
            .set_scan_index_forward(self.scan_index_forward);
        let output = crate::apply_multiple_read_operation!(builder, self.multiple_read_operation)
            .send()
            .await
            .map_err(Error::store)?;
        Ok(QueryOutput {
            count: usize::try_from(output.count).unwrap_or_default(),
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key,
        })
    }
}

/// Sort key order of query results.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum QueryOrder {
    /// Ascending sort key order.
    #[default]
    Ascending,
    /// Descending sort key order.
    Descending,
}

/// Options of an entity query.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryOptions<T> {
    /// Index to query, the table when `None`.
    pub index: Option<String>,
    /// Condition on the sort key of the table or index.
    pub sort_key_condition: Option<Condition<T>>,
    /// Filter applied to matching items.
    pub condition: Option<ConditionMap<T>>,
    /// Attributes to retrieve, all when `None`.
    pub selection: Option<SelectionMap>,
    /// Maximum number of items to return.
    pub limit: Option<usize>,
    /// Sort key order.
    pub order: Option<QueryOrder>,
    /// Count matching items instead of returning them.
    pub only_count: bool,
    /// Whether to use strongly consistent reads.
    pub consistent_read: bool,
    /// Key to resume from, as returned by a previous query.
    pub cursor: Option<Item>,
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self {
            index: None,
            sort_key_condition: None,
            condition: None,
            selection: None,
            limit: None,
            order: None,
            only_count: false,
            consistent_read: false,
            cursor: None,
        }
    }
}

impl RequestTransformer<'_> {
    /// Plan the query of the partition `partition_key`.
    pub fn to_query_item<K: Serialize, T: Serialize>(
        &self,
        partition_key: PartitionKey<K>,
        options: QueryOptions<T>,
    ) -> Result<QueryInput> {
        let (partition_key_name, sort_key_name, partition_key_template) = match &options.index {
            None => (
                self.table.partition_key.as_str(),
                self.table.sort_key.as_deref(),
                self.schema.primary_key.attributes.get(&self.table.partition_key),
            ),
            Some(index) => {
                let (definition, schema) = self.index(index)?;
                match definition {
                    IndexDefinition::Global {
                        partition_key,
                        sort_key,
                    } => (
                        partition_key.as_str(),
                        Some(sort_key.as_str()),
                        schema.key.attributes.get(partition_key),
                    ),
                    IndexDefinition::Local { sort_key } => (
                        self.table.partition_key.as_str(),
                        Some(sort_key.as_str()),
                        self.schema.primary_key.attributes.get(&self.table.partition_key),
                    ),
                }
            }
        };

        let partition_key_value = match partition_key {
            PartitionKey::Value(value) => types::AttributeValue::S(value),
            PartitionKey::Attributes(attributes) => {
                let attributes: Item = serde_dynamo::to_item(attributes)?;
                partition_key_template
                    .ok_or_else(|| {
                        Error::invalid_input(format!(
                            "no template resolves \"{partition_key_name}\""
                        ))
                    })?
                    .resolve(&attributes, false)?
            }
        };
        let mut key_condition = Expression::new(ExpressionKind::KeyCondition)
            .equals(partition_key_name, partition_key_value);
        if let Some(condition) = options.sort_key_condition {
            let sort_key_name = sort_key_name.ok_or_else(|| {
                Error::SortKeyNotDefined(options.index.clone().unwrap_or_else(|| self.table.name.clone()))
            })?;
            let sort_key_condition = KeyCondition {
                condition,
                name: sort_key_name.to_string(),
            }
            .into_expression(ExpressionKind::KeyCondition)?;
            key_condition = key_condition.merge(sort_key_condition, MergeStrategy::And);
        }

        let mut multiple_read_operation = read::common::MultipleReadInput {
            consistent_read: options.consistent_read.then_some(true),
            exclusive_start_key: options.cursor,
            index_name: options.index,
            limit: options.limit.map(read::common::to_limit),
            table_name: self.table.name.clone(),
            ..Default::default()
        };
        if let Some(condition) = options.condition {
            let filter = condition.into_expression(ExpressionKind::Filter)?;
            multiple_read_operation.filter_expression =
                Some(multiple_read_operation.merge_expression(filter.into_input()));
        }
        match (options.only_count, options.selection) {
            (true, Some(_)) => return Err(Error::ProjectionWithCount),
            (true, None) => multiple_read_operation.select = Some(types::Select::Count),
            (false, Some(selection)) => {
                let projection = selection.into_expression();
                multiple_read_operation.projection_expression =
                    Some(multiple_read_operation.merge_expression(projection.into_input()));
            }
            (false, None) => {}
        }
        let key_condition_expression =
            multiple_read_operation.merge_expression(key_condition.into_input());
        Ok(QueryInput {
            key_condition_expression,
            multiple_read_operation,
            scan_index_forward: options
                .order
                .map(|order| order == QueryOrder::Ascending),
        })
    }
}

impl read::common::MultipleRead for QueryInput {
    fn multiple_read_operation_mut(&mut self) -> &mut read::common::MultipleReadInput {
        &mut self.multiple_read_operation
    }

    fn read_page<'a>(
        self,
        client: &'a dyn DocumentClient,
    ) -> BoxFuture<'a, Result<QueryOutput>> {
        client.query(self)
    }
}
