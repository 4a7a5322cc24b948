use crate::{
    common::{Item, selection::SelectionMap},
    error::{Error, Result},
    read,
    transformer::RequestTransformer,
};

use aws_sdk_dynamodb::{Client, types};
use serde::Serialize;

/// get item operation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetItemInput {
    /// Table primary key of the item.
    pub key: Item,
    /// Read parameters (table name, consistency, projection).
    pub single_read_operation: read::common::SingleReadInput,
}

impl GetItemInput {
    /// Strongly consistent read of the whole item under `key`.
    pub(crate) fn consistent(table_name: impl Into<String>, key: Item) -> Self {
        let mut single_read_operation = read::common::SingleReadInput::new(table_name);
        single_read_operation.consistent_read = Some(true);
        Self {
            key,
            single_read_operation,
        }
    }

    /// Execute the get item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.get_item", skip_all, err)
    )]
    pub(crate) async fn send(self, client: &Client) -> Result<Option<Item>> {
        let builder = client.get_item().set_key(Some(self.key));
        let output = crate::apply_single_read_operation!(builder, self.single_read_operation)
            .send()
            .await
            .map_err(Error::store)?;
        Ok(output.item)
    }

    pub(crate) fn into_transact_get_item(self) -> Result<types::TransactGetItem> {
        let get = types::Get::builder()
            .set_key(Some(self.key))
            .set_expression_attribute_names(self.single_read_operation.expression_attribute_names)
            .set_projection_expression(self.single_read_operation.projection_expression)
            .table_name(self.single_read_operation.table_name)
            .build()
            .map_err(Error::store)?;
        Ok(types::TransactGetItem::builder().get(get).build())
    }
}

/// Options of a single entity read.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FindOneOptions {
    /// Whether to use a strongly consistent read.
    pub consistent_read: bool,
    /// Attributes to retrieve, all when `None`.
    pub selection: Option<SelectionMap>,
}

impl RequestTransformer<'_> {
    /// Read of the entity identified by `primary_key_attributes`.
    pub fn to_get_item<K: Serialize>(
        &self,
        primary_key_attributes: &K,
        options: FindOneOptions,
    ) -> Result<GetItemInput> {
        let attributes = self.serialize_primary_key_attributes(primary_key_attributes)?;
        let key = self.primary_key(&attributes)?;
        let mut single_read_operation =
            read::common::SingleReadInput::new(&self.table.name).with_selection(options.selection);
        if options.consistent_read {
            single_read_operation.consistent_read = Some(true);
        }
        Ok(GetItemInput {
            key,
            single_read_operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entity::{
        EntitySchema,
        tests::{table, user_declaration},
    };

    use rstest::rstest;
    use serde_json::{Value, json};
    use std::collections;

    fn s(value: &str) -> types::AttributeValue {
        types::AttributeValue::S(value.to_string())
    }

    #[rstest]
    #[case::default(
        json!({"id": "1"}),
        FindOneOptions::default(),
        GetItemInput {
            key: Item::from([
                ("PK".to_string(), s("USER#1")),
                ("SK".to_string(), s("USER#1")),
            ]),
            single_read_operation: read::common::SingleReadInput {
                table_name: "test-table".to_string(),
                ..Default::default()
            },
        }
    )]
    #[case::consistent_with_selection(
        json!({"id": "1"}),
        FindOneOptions {
            consistent_read: true,
            selection: Some(SelectionMap::Leaves(vec!["name".to_string()])),
        },
        GetItemInput {
            key: Item::from([
                ("PK".to_string(), s("USER#1")),
                ("SK".to_string(), s("USER#1")),
            ]),
            single_read_operation: read::common::SingleReadInput {
                consistent_read: Some(true),
                expression_attribute_names: Some(collections::HashMap::from([(
                    "#PE_name".to_string(),
                    "name".to_string()
                )])),
                projection_expression: Some("#PE_name".to_string()),
                table_name: "test-table".to_string(),
            },
        }
    )]
    fn test_to_get_item(
        #[case] primary_key_attributes: Value,
        #[case] options: FindOneOptions,
        #[case] expected: GetItemInput,
    ) {
        let table = table();
        let schema = EntitySchema::build(&table, user_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        assert_eq!(
            transformer
                .to_get_item(&primary_key_attributes, options)
                .unwrap(),
            expected
        );
    }

    #[test]
    fn test_to_get_item_missing_primary_key_attribute() {
        let table = table();
        let schema = EntitySchema::build(&table, user_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let error = transformer
            .to_get_item(&json!({"name": "Me"}), FindOneOptions::default())
            .unwrap_err();
        assert!(matches!(error, Error::UnresolvedInterpolation { .. }));
    }
}
