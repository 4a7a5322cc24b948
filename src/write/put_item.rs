use crate::{
    common::{Item, condition::ConditionMap},
    error::{Error, Result},
    expression::MergeStrategy,
    transformer::{RequestTransformer, is_missing},
    write,
};

use aws_sdk_dynamodb::Client;
use serde::Serialize;

/// put item operation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutItemInput {
    /// Full stored item.
    pub item: Item,
    /// Write parameters (table name, condition).
    pub write_operation: write::common::WriteInput,
}

impl PutItemInput {
    /// Execute the put item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.put_item", skip_all, err)
    )]
    pub(crate) async fn send(self, client: &Client) -> Result<()> {
        let builder = client.put_item().set_item(Some(self.item));
        crate::apply_write_operation!(builder, self.write_operation)
            .send()
            .await
            .map_err(Error::store)?;
        Ok(())
    }
}

/// Options of an entity creation.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateOptions<T> {
    /// Replace an existing item instead of failing.
    pub overwrite_if_exists: bool,
    /// Extra condition, AND-merged with the uniqueness guard.
    pub condition: Option<ConditionMap<T>>,
}

impl<T> Default for CreateOptions<T> {
    fn default() -> Self {
        Self {
            overwrite_if_exists: false,
            condition: None,
        }
    }
}

/// Planned creation.
#[derive(Clone, Debug, PartialEq)]
pub enum PutPlan {
    /// Single put.
    Item(PutItemInput),
    /// Main put followed by one shadow put per unique attribute.
    Transaction(Vec<write::common::TransactWriteItem>),
}

impl PutPlan {
    /// Full stored item of the entity.
    pub fn item(&self) -> Option<&Item> {
        match self {
            Self::Item(input) => Some(&input.item),
            Self::Transaction(items) => match items.first() {
                Some(write::common::TransactWriteItem::Put(input)) => Some(&input.item),
                _ => None,
            },
        }
    }
}

impl RequestTransformer<'_> {
    /// Plan the creation of `entity`.
    pub fn to_put_item<E: Serialize, T: Serialize>(
        &self,
        entity: &E,
        options: CreateOptions<T>,
    ) -> Result<PutPlan> {
        let item = self.to_dynamo_item(serde_dynamo::to_item(entity)?)?;
        let condition = if options.overwrite_if_exists {
            Self::condition(options.condition)?
        } else {
            self.unique_record_condition()
                .merge(Self::condition(options.condition)?, MergeStrategy::And)
        };

        let mut shadows = Vec::new();
        for (attribute, key) in self.schema.unique_attributes() {
            if is_missing(&item, &attribute.name) {
                return Err(Error::MissingUniqueAttributeValue(attribute.name.clone()));
            }
            let input = PutItemInput {
                item: key.resolve(&item, false)?,
                write_operation: write::common::WriteInput::new(&self.table.name)
                    .with_condition(self.unique_record_condition()),
            };
            shadows.push(write::common::TransactWriteItem::Put(input));
        }

        let input = PutItemInput {
            item,
            write_operation: write::common::WriteInput::new(&self.table.name)
                .with_condition(condition),
        };
        if shadows.is_empty() {
            return Ok(PutPlan::Item(input));
        }
        crate::log!(
            debug,
            entity = %self.schema.name,
            unique_attributes = shadows.len(),
            "creation planned as a transaction"
        );
        let mut items = Vec::with_capacity(shadows.len() + 1);
        items.push(write::common::TransactWriteItem::Put(input));
        items.extend(shadows);
        Ok(PutPlan::Transaction(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::condition::{Condition, KeyCondition},
        schema::entity::{
            EntitySchema,
            tests::{table, user_declaration, user_unique_email_declaration},
        },
    };

    use aws_sdk_dynamodb::types;
    use serde_json::{Value, json};
    use std::collections;

    fn s(value: &str) -> types::AttributeValue {
        types::AttributeValue::S(value.to_string())
    }

    fn unique_record_names() -> Option<collections::HashMap<String, String>> {
        Some(collections::HashMap::from([
            ("#CE_PK".to_string(), "PK".to_string()),
            ("#CE_SK".to_string(), "SK".to_string()),
        ]))
    }

    #[test]
    fn test_to_put_item() {
        let table = table();
        let schema = EntitySchema::build(&table, user_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let plan = transformer
            .to_put_item(
                &json!({"id": "1", "name": "Me", "status": "active"}),
                CreateOptions::<Value>::default(),
            )
            .unwrap();
        assert_eq!(
            plan,
            PutPlan::Item(PutItemInput {
                item: Item::from([
                    ("id".to_string(), s("1")),
                    ("name".to_string(), s("Me")),
                    ("status".to_string(), s("active")),
                    ("__en".to_string(), s("user")),
                    ("PK".to_string(), s("USER#1")),
                    ("SK".to_string(), s("USER#1")),
                    ("GSI1PK".to_string(), s("USER#STATUS#active")),
                    ("GSI1SK".to_string(), s("USER#Me")),
                ]),
                write_operation: write::common::WriteInput {
                    condition_expression: Some(
                        "(attribute_not_exists(#CE_PK)) AND (attribute_not_exists(#CE_SK))"
                            .to_string()
                    ),
                    expression_attribute_names: unique_record_names(),
                    table_name: "test-table".to_string(),
                    ..Default::default()
                },
            })
        );
    }

    #[test]
    fn test_to_put_item_overwrite_with_condition() {
        let table = table();
        let schema = EntitySchema::build(&table, user_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let plan = transformer
            .to_put_item(
                &json!({"id": "1", "name": "Me", "status": "active"}),
                CreateOptions {
                    overwrite_if_exists: true,
                    condition: Some(ConditionMap::Leaves(
                        MergeStrategy::And,
                        vec![KeyCondition {
                            name: "status".to_string(),
                            condition: Condition::NotEqual(json!("banned")),
                        }],
                    )),
                },
            )
            .unwrap();
        let PutPlan::Item(input) = plan else {
            panic!("expected a single put");
        };
        assert_eq!(
            input.write_operation.condition_expression.as_deref(),
            Some("#CE_status <> :CE_status")
        );
    }

    #[test]
    fn test_to_put_item_merges_condition_with_unique_record_guard() {
        let table = table();
        let schema = EntitySchema::build(&table, user_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let plan = transformer
            .to_put_item(
                &json!({"id": "1", "name": "Me", "status": "active"}),
                CreateOptions {
                    overwrite_if_exists: false,
                    condition: Some(ConditionMap::Leaves(
                        MergeStrategy::And,
                        vec![KeyCondition {
                            name: "status".to_string(),
                            condition: Condition::<Value>::AttributeNotExists,
                        }],
                    )),
                },
            )
            .unwrap();
        let PutPlan::Item(input) = plan else {
            panic!("expected a single put");
        };
        assert_eq!(
            input.write_operation.condition_expression.as_deref(),
            Some(
                "((attribute_not_exists(#CE_PK)) AND (attribute_not_exists(#CE_SK))) AND (attribute_not_exists(#CE_status))"
            )
        );
    }

    #[test]
    fn test_to_put_item_with_unique_attribute() {
        let table = table();
        let schema = EntitySchema::build(&table, user_unique_email_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let plan = transformer
            .to_put_item(
                &json!({"id": "1", "name": "Me", "email": "me@example.com"}),
                CreateOptions::<Value>::default(),
            )
            .unwrap();
        let PutPlan::Transaction(items) = plan else {
            panic!("expected a transaction");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1],
            write::common::TransactWriteItem::Put(PutItemInput {
                item: Item::from([
                    (
                        "PK".to_string(),
                        s("DRM_GEN_USER-UNIQUE-EMAIL.EMAIL#me@example.com")
                    ),
                    (
                        "SK".to_string(),
                        s("DRM_GEN_USER-UNIQUE-EMAIL.EMAIL#me@example.com")
                    ),
                ]),
                write_operation: write::common::WriteInput {
                    condition_expression: Some(
                        "(attribute_not_exists(#CE_PK)) AND (attribute_not_exists(#CE_SK))"
                            .to_string()
                    ),
                    expression_attribute_names: unique_record_names(),
                    table_name: "test-table".to_string(),
                    ..Default::default()
                },
            })
        );
        let main = transformer
            .to_put_item(
                &json!({"id": "1", "name": "Me", "email": "me@example.com"}),
                CreateOptions::<Value>::default(),
            )
            .unwrap();
        let item = main.item().unwrap();
        assert_eq!(item["PK"], s("USER#1"));
        assert!(!item.contains_key("GSI1PK"));
    }

    #[test]
    fn test_to_put_item_missing_unique_attribute() {
        let table = table();
        let schema = EntitySchema::build(&table, user_unique_email_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let error = transformer
            .to_put_item(&json!({"id": "1"}), CreateOptions::<Value>::default())
            .unwrap_err();
        assert!(matches!(error, Error::MissingUniqueAttributeValue(name) if name == "email"));
    }
}
