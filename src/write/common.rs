use crate::{
    common::{self, Item},
    error::{Error, Result},
    expression::Expression,
    read, write,
};

use aws_sdk_dynamodb::types;
use std::{collections, fmt};

/// Parameters shared by every write request.
///
/// Holds the resolved condition expression and the placeholder maps of every
/// expression attached to the request, ready for a DynamoDB API call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteInput {
    /// Condition expression that must hold for the write to apply.
    pub condition_expression: Option<String>,
    /// Name placeholders of every expression of the request.
    pub expression_attribute_names: Option<collections::HashMap<String, String>>,
    /// Value placeholders of every expression of the request.
    pub expression_attribute_values: Option<collections::HashMap<String, types::AttributeValue>>,
    /// Attributes returned by a single item update.
    pub return_values: Option<types::ReturnValue>,
    /// Target table.
    pub table_name: String,
}

impl WriteInput {
    pub(crate) fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    /// Merge an expression operation into this write operation.
    pub(crate) fn merge_expression(&mut self, operation: common::ExpressionInput) -> String {
        operation.merge_into(
            &mut self.expression_attribute_names,
            &mut self.expression_attribute_values,
        )
    }

    /// Attach `condition`, ignored when empty.
    pub(crate) fn with_condition(mut self, condition: Expression) -> Self {
        if !condition.is_empty() {
            let expression = self.merge_expression(condition.into_input());
            self.condition_expression = Some(expression);
        }
        self
    }
}

/// One write of a transaction.
#[derive(Clone, Debug, PartialEq)]
pub enum TransactWriteItem {
    /// Create or replace an item.
    Put(write::put_item::PutItemInput),
    /// Update an item in place.
    Update(write::update_item::UpdateItemInput),
    /// Delete an item.
    Delete(write::delete_item::DeleteItemInput),
}

impl TransactWriteItem {
    pub(crate) fn into_transact_write_item(self) -> Result<types::TransactWriteItem> {
        let builder = types::TransactWriteItem::builder();
        let builder = match self {
            Self::Put(input) => {
                let put = types::Put::builder().set_item(Some(input.item));
                let put = crate::apply_write_operation!(put, input.write_operation)
                    .build()
                    .map_err(Error::store)?;
                builder.put(put)
            }
            Self::Update(input) => {
                let update = types::Update::builder()
                    .set_key(Some(input.key))
                    .update_expression(input.update_expression);
                let update = crate::apply_write_operation!(update, input.write_operation)
                    .build()
                    .map_err(Error::store)?;
                builder.update(update)
            }
            Self::Delete(input) => {
                let delete = types::Delete::builder().set_key(Some(input.key));
                let delete = crate::apply_write_operation!(delete, input.write_operation)
                    .build()
                    .map_err(Error::store)?;
                builder.delete(delete)
            }
        };
        Ok(builder.build())
    }
}

type Loader = Box<dyn FnOnce(Option<&Item>) -> Result<Vec<TransactWriteItem>> + Send>;

/// Writes that can only be planned once the current stored item is known.
///
/// The transaction reads [`LazyTransactWriteItemListLoader::previous`]
/// first and hands the result, possibly missing, to the loader.
pub struct LazyTransactWriteItemListLoader {
    /// Entity the writes belong to.
    pub entity: String,
    /// Source attributes of the primary key of the target item.
    pub primary_key_attributes: Item,
    /// Read of the current stored item.
    pub previous: read::get_item::GetItemInput,
    /// Key the target item has once the writes are applied.
    pub updated_key: Item,
    loader: Loader,
}

impl LazyTransactWriteItemListLoader {
    pub(crate) fn new<F>(
        entity: impl Into<String>,
        primary_key_attributes: Item,
        previous: read::get_item::GetItemInput,
        updated_key: Item,
        loader: F,
    ) -> Self
    where
        F: FnOnce(Option<&Item>) -> Result<Vec<TransactWriteItem>> + Send + 'static,
    {
        Self {
            entity: entity.into(),
            primary_key_attributes,
            previous,
            updated_key,
            loader: Box::new(loader),
        }
    }

    /// Plan the writes against `previous`.
    pub fn load(self, previous: Option<&Item>) -> Result<Vec<TransactWriteItem>> {
        (self.loader)(previous)
    }
}

impl fmt::Debug for LazyTransactWriteItemListLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyTransactWriteItemListLoader")
            .field("entity", &self.entity)
            .field("primary_key_attributes", &self.primary_key_attributes)
            .field("previous", &self.previous)
            .field("updated_key", &self.updated_key)
            .finish_non_exhaustive()
    }
}

/// Planned write, either ready or waiting for the current stored item.
#[derive(Debug)]
pub enum WritePlan<T> {
    /// Single request, sent as is.
    Item(T),
    /// Transaction planned from the current stored item.
    Lazy(LazyTransactWriteItemListLoader),
}

/// apply common write operation settings to a builder
#[macro_export]
macro_rules! apply_write_operation {
    ($builder:expr, $write_operation:expr) => {
        $builder
            .set_condition_expression($write_operation.condition_expression)
            .set_expression_attribute_names($write_operation.expression_attribute_names)
            .set_expression_attribute_values($write_operation.expression_attribute_values)
            .table_name($write_operation.table_name)
    };
}
