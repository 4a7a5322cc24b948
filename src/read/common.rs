use crate::{
    client::DocumentClient,
    common::{self, Item},
    error::Result,
};

use aws_sdk_dynamodb::types;
use futures::future::BoxFuture;
use std::collections;

/// Parameters of single item reads (GetItem).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SingleReadInput {
    /// Whether to use a strongly consistent read.
    pub consistent_read: Option<bool>,
    /// Name placeholders of the projection.
    pub expression_attribute_names: Option<collections::HashMap<String, String>>,
    /// Attributes to retrieve, all when `None`.
    pub projection_expression: Option<String>,
    /// The name of the table to read from.
    pub table_name: String,
}

impl SingleReadInput {
    pub(crate) fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    /// Attach the projection `selection`.
    pub(crate) fn with_selection(mut self, selection: Option<common::selection::SelectionMap>) -> Self {
        if let Some(selection) = selection {
            let operation: common::ExpressionInput = selection.into();
            self.expression_attribute_names = Some(operation.expression_attribute_names);
            self.projection_expression = Some(operation.expression);
        }
        self
    }
}

/// Parameters of multiple item reads (Query).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultipleReadInput {
    /// Whether to use a strongly consistent read.
    pub consistent_read: Option<bool>,
    /// Key to resume from.
    pub exclusive_start_key: Option<Item>,
    /// Name placeholders of every expression of the request.
    pub expression_attribute_names: Option<collections::HashMap<String, String>>,
    /// Value placeholders of every expression of the request.
    pub expression_attribute_values: Option<collections::HashMap<String, types::AttributeValue>>,
    /// Filter applied after the key condition.
    pub filter_expression: Option<String>,
    /// Index to read from, the table when `None`.
    pub index_name: Option<String>,
    /// Maximum number of items evaluated by one request.
    pub limit: Option<i32>,
    /// Attributes to retrieve, all when `None`.
    pub projection_expression: Option<String>,
    /// What the request returns, items or their count.
    pub select: Option<types::Select>,
    /// The name of the table to read from.
    pub table_name: String,
}

impl MultipleReadInput {
    /// Merge an expression operation into this read operation.
    pub(crate) fn merge_expression(&mut self, operation: common::ExpressionInput) -> String {
        operation.merge_into(
            &mut self.expression_attribute_names,
            &mut self.expression_attribute_values,
        )
    }
}

/// One page of a multiple item read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MultipleReadOutput {
    /// Items of the page, empty for count reads.
    pub items: Vec<Item>,
    /// Number of matching items in the page.
    pub count: usize,
    /// Key to resume from, `None` on the last page.
    pub last_evaluated_key: Option<Item>,
}

/// A multiple item read sent one page at a time.
pub(crate) trait MultipleRead: Clone + Send {
    fn multiple_read_operation_mut(&mut self) -> &mut MultipleReadInput;

    fn read_page<'a>(self, client: &'a dyn DocumentClient) -> BoxFuture<'a, Result<MultipleReadOutput>>;
}

pub(crate) fn to_limit(limit: usize) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

/// Read pages until `limit` items were fetched or the read is exhausted,
/// returning the items and the key to resume from.
pub(crate) async fn paginate<R: MultipleRead>(
    client: &dyn DocumentClient,
    mut input: R,
    limit: usize,
) -> Result<(Vec<Item>, Option<Item>)> {
    let mut items = Vec::new();
    if limit == 0 {
        let cursor = input.multiple_read_operation_mut().exclusive_start_key.take();
        return Ok((items, cursor));
    }
    loop {
        input.multiple_read_operation_mut().limit = Some(to_limit(limit - items.len()));
        let output = input.clone().read_page(client).await?;
        items.extend(output.items);
        crate::log!(
            trace,
            fetched = items.len(),
            limit,
            has_more = output.last_evaluated_key.is_some(),
            "page read"
        );
        match output.last_evaluated_key {
            Some(cursor) if items.len() < limit => {
                input.multiple_read_operation_mut().exclusive_start_key = Some(cursor);
            }
            cursor => return Ok((items, cursor)),
        }
    }
}

/// Sum the count of every page.
pub(crate) async fn count<R: MultipleRead>(client: &dyn DocumentClient, mut input: R) -> Result<usize> {
    let mut count = 0;
    loop {
        let output = input.clone().read_page(client).await?;
        count += output.count;
        match output.last_evaluated_key {
            Some(cursor) => input.multiple_read_operation_mut().exclusive_start_key = Some(cursor),
            None => return Ok(count),
        }
    }
}

/// apply common single read operation settings to a builder
#[macro_export]
macro_rules! apply_single_read_operation {
    ($builder:expr, $single_read_operation:expr) => {
        $builder
            .set_consistent_read($single_read_operation.consistent_read)
            .set_expression_attribute_names($single_read_operation.expression_attribute_names)
            .set_projection_expression($single_read_operation.projection_expression)
            .table_name($single_read_operation.table_name)
    };
}

/// apply common multiple read operation settings to a builder
#[macro_export]
macro_rules! apply_multiple_read_operation {
    ($builder:expr, $multiple_read_operation:expr) => {
        $builder
            .set_consistent_read($multiple_read_operation.consistent_read)
            .set_exclusive_start_key($multiple_read_operation.exclusive_start_key)
            .set_expression_attribute_names($multiple_read_operation.expression_attribute_names)
            .set_expression_attribute_values($multiple_read_operation.expression_attribute_values)
            .set_filter_expression($multiple_read_operation.filter_expression)
            .set_index_name($multiple_read_operation.index_name)
            .set_limit($multiple_read_operation.limit)
            .set_projection_expression($multiple_read_operation.projection_expression)
            .set_select($multiple_read_operation.select)
            .table_name($multiple_read_operation.table_name)
    };
}
