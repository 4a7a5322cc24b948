use crate::{
    common::{Item, condition::ConditionMap},
    error::{Error, Result},
    transformer::{RequestTransformer, is_missing},
    write::{self, common::TransactWriteItem},
};

use aws_sdk_dynamodb::Client;
use serde::Serialize;

/// delete item operation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteItemInput {
    /// Table primary key of the item.
    pub key: Item,
    /// Write parameters (table name, condition).
    pub write_operation: write::common::WriteInput,
}

impl DeleteItemInput {
    /// Execute the delete item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.delete_item", skip_all, err)
    )]
    pub(crate) async fn send(self, client: &Client) -> Result<()> {
        let builder = client.delete_item().set_key(Some(self.key));
        crate::apply_write_operation!(builder, self.write_operation)
            .send()
            .await
            .map_err(Error::store)?;
        Ok(())
    }
}

/// Options of an entity deletion.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteOptions<T> {
    /// Condition the stored item must satisfy.
    pub condition: Option<ConditionMap<T>>,
}

impl<T> Default for DeleteOptions<T> {
    fn default() -> Self {
        Self { condition: None }
    }
}

/// Planned deletion.
pub type DeletePlan = write::common::WritePlan<DeleteItemInput>;

impl RequestTransformer<'_> {
    /// Plan the deletion of the entity identified by `primary_key_attributes`.
    ///
    /// Entities with unique attributes also delete the shadow item of every
    /// unique value found on the stored item.
    pub fn to_delete_item<K: Serialize, T: Serialize>(
        &self,
        primary_key_attributes: &K,
        options: DeleteOptions<T>,
    ) -> Result<DeletePlan> {
        let primary_key_attributes = self.serialize_primary_key_attributes(primary_key_attributes)?;
        let key = self.primary_key(&primary_key_attributes)?;
        let input = DeleteItemInput {
            key: key.clone(),
            write_operation: write::common::WriteInput::new(&self.table.name)
                .with_condition(Self::condition(options.condition)?),
        };
        let unique_keys: Vec<_> = self
            .schema
            .unique_attributes()
            .map(|(attribute, key)| (attribute.name.clone(), key.clone()))
            .collect();
        if unique_keys.is_empty() {
            return Ok(write::common::WritePlan::Item(input));
        }

        let table_name = self.table.name.clone();
        let loader = move |previous: Option<&Item>| -> Result<Vec<TransactWriteItem>> {
            let mut items = vec![TransactWriteItem::Delete(input)];
            let Some(previous) = previous else {
                return Ok(items);
            };
            for (name, unique_key) in unique_keys {
                if is_missing(previous, &name) {
                    continue;
                }
                items.push(TransactWriteItem::Delete(DeleteItemInput {
                    key: unique_key.resolve(previous, false)?,
                    write_operation: write::common::WriteInput::new(&table_name),
                }));
            }
            Ok(items)
        };
        Ok(write::common::WritePlan::Lazy(
            write::common::LazyTransactWriteItemListLoader::new(
                &self.schema.name,
                primary_key_attributes,
                self.previous_item(key.clone()),
                key,
                loader,
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::condition::{Condition, KeyCondition},
        expression::MergeStrategy,
        schema::entity::{
            EntitySchema,
            tests::{table, user_declaration, user_unique_email_declaration},
        },
    };

    use aws_sdk_dynamodb::types;
    use serde_json::{Value, json};

    fn s(value: &str) -> types::AttributeValue {
        types::AttributeValue::S(value.to_string())
    }

    fn user_key() -> Item {
        Item::from([("PK".to_string(), s("USER#1")), ("SK".to_string(), s("USER#1"))])
    }

    #[test]
    fn test_to_delete_item() {
        let table = table();
        let schema = EntitySchema::build(&table, user_declaration()).unwrap();
        let plan = RequestTransformer::new(&table, &schema)
            .to_delete_item(
                &json!({"id": "1"}),
                DeleteOptions {
                    condition: Some(ConditionMap::Leaves(
                        MergeStrategy::And,
                        vec![KeyCondition {
                            name: "status".to_string(),
                            condition: Condition::Equals(json!("inactive")),
                        }],
                    )),
                },
            )
            .unwrap();
        let write::common::WritePlan::Item(input) = plan else {
            panic!("expected a single delete");
        };
        assert_eq!(input.key, user_key());
        assert_eq!(
            input.write_operation.condition_expression.as_deref(),
            Some("#CE_status = :CE_status")
        );
    }

    #[test]
    fn test_to_delete_item_with_unique_attribute() {
        let table = table();
        let schema = EntitySchema::build(&table, user_unique_email_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let plan = transformer
            .to_delete_item(&json!({"id": "1"}), DeleteOptions::<Value>::default())
            .unwrap();
        let write::common::WritePlan::Lazy(loader) = plan else {
            panic!("expected a lazy plan");
        };
        assert_eq!(loader.previous.key, user_key());
        assert_eq!(loader.previous.single_read_operation.consistent_read, Some(true));
        let previous = Item::from([
            ("PK".to_string(), s("USER#1")),
            ("SK".to_string(), s("USER#1")),
            ("email".to_string(), s("me@example.com")),
        ]);
        let items = loader.load(Some(&previous)).unwrap();
        let shadow = s("DRM_GEN_USER-UNIQUE-EMAIL.EMAIL#me@example.com");
        assert_eq!(
            items,
            vec![
                TransactWriteItem::Delete(DeleteItemInput {
                    key: user_key(),
                    write_operation: write::common::WriteInput::new("test-table"),
                }),
                TransactWriteItem::Delete(DeleteItemInput {
                    key: Item::from([
                        ("PK".to_string(), shadow.clone()),
                        ("SK".to_string(), shadow),
                    ]),
                    write_operation: write::common::WriteInput::new("test-table"),
                }),
            ]
        );

        let plan = transformer
            .to_delete_item(&json!({"id": "1"}), DeleteOptions::<Value>::default())
            .unwrap();
        let write::common::WritePlan::Lazy(loader) = plan else {
            panic!("expected a lazy plan");
        };
        assert_eq!(loader.load(None).unwrap().len(), 1);
    }
}
