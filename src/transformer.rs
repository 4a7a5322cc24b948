//! Translation of entity level operations into DynamoDB requests.
//!
//! A [`RequestTransformer`] pairs a table with one entity schema. The
//! per-operation planners live next to the request they produce:
//! [`write::put_item`](crate::write::put_item),
//! [`write::update_item`](crate::write::update_item),
//! [`write::delete_item`](crate::write::delete_item),
//! [`write::batch_write_item`](crate::write::batch_write_item),
//! [`read::get_item`](crate::read::get_item),
//! [`read::batch_get_item`](crate::read::batch_get_item),
//! [`read::query`](crate::read::query) and
//! [`read::scan`](crate::read::scan).

use crate::{
    common::{self, Item},
    error::{Error, Result},
    expression::{Expression, ExpressionKind, MergeStrategy},
    read,
    schema::{
        self,
        entity::EntitySchema,
        table::{IndexDefinition, Table},
    },
};

use aws_sdk_dynamodb::types;
use indexmap::IndexMap;
use serde::Serialize;

/// Plans the requests of one entity stored in one table.
#[derive(Clone, Copy, Debug)]
pub struct RequestTransformer<'a> {
    pub(crate) table: &'a Table,
    pub(crate) schema: &'a EntitySchema,
}

pub(crate) fn is_missing(item: &Item, name: &str) -> bool {
    matches!(item.get(name), None | Some(types::AttributeValue::Null(_)))
}

impl<'a> RequestTransformer<'a> {
    /// Transformer of `schema`, stored in `table`.
    pub fn new(table: &'a Table, schema: &'a EntitySchema) -> Self {
        Self { table, schema }
    }

    /// Table the entity is stored in.
    pub fn table(&self) -> &'a Table {
        self.table
    }

    /// Schema of the entity.
    pub fn schema(&self) -> &'a EntitySchema {
        self.schema
    }

    /// Table primary key of the item described by `attributes`.
    pub fn primary_key(&self, attributes: &Item) -> Result<Item> {
        self.schema.primary_key.resolve(attributes, false)
    }

    pub(crate) fn serialize_primary_key_attributes<K: Serialize>(
        &self,
        primary_key_attributes: &K,
    ) -> Result<Item> {
        Ok(serde_dynamo::to_item(primary_key_attributes)?)
    }

    /// `attribute_not_exists` on every table key attribute.
    pub fn unique_record_condition(&self) -> Expression {
        let partition_key =
            Expression::new(ExpressionKind::Condition).attribute_not_exists(&self.table.partition_key);
        match &self.table.sort_key {
            Some(sort_key) => partition_key.merge(
                Expression::new(ExpressionKind::Condition).attribute_not_exists(sort_key),
                MergeStrategy::And,
            ),
            None => partition_key,
        }
    }

    /// Index key attributes of a full item.
    ///
    /// A sparse index is skipped as a whole when one of its inputs is missing.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub(crate) fn index_attributes(
        &self,
        attributes: &Item,
    ) -> Result<IndexMap<String, types::AttributeValue>> {
        let mut resolved = IndexMap::new();
        for (name, index) in &self.schema.indexes {
            match index.key.resolve(attributes, index.is_sparse) {
                Ok(values) => {
                    for key_attribute in index.key.attributes.keys() {
                        if let Some(value) = values.get(key_attribute) {
                            resolved.insert(key_attribute.clone(), value.clone());
                        }
                    }
                }
                Err(Error::SparseIndexParse { attribute, .. }) => {
                    crate::log!(
                        trace,
                        index = %name,
                        attribute = %attribute,
                        "sparse index skipped"
                    );
                }
                Err(error) => return Err(error),
            }
        }
        Ok(resolved)
    }

    /// Full stored item of a new entity: defaults, generated values,
    /// transforms, internal attributes, keys and indexes.
    pub(crate) fn to_dynamo_item(&self, mut item: Item) -> Result<Item> {
        for attribute in &self.schema.attributes {
            if !is_missing(&item, &attribute.name) {
                continue;
            }
            let value = match (&attribute.default, attribute.auto_generate) {
                (Some(default), _) => default.value(&item),
                (None, Some(strategy)) => strategy.generate(),
                (None, None) => continue,
            };
            item.insert(attribute.name.clone(), value);
        }
        for attribute in &self.schema.attributes {
            if attribute.transform.is_none() || is_missing(&item, &attribute.name) {
                continue;
            }
            if let Some(value) = item.remove(&attribute.name) {
                item.insert(attribute.name.clone(), attribute.transformed(value));
            }
        }
        let primary_key = self.primary_key(&item)?;
        let indexes = self.index_attributes(&item)?;
        item.extend(self.schema.internal_attributes.clone());
        item.extend(primary_key);
        item.extend(indexes);
        Ok(item)
    }

    /// Entity view of a stored item: internal, key and hidden attributes are
    /// dropped.
    pub fn from_dynamo_item(&self, mut item: Item) -> Item {
        for name in schema::RESERVED_ATTRIBUTE_NAMES {
            item.remove(*name);
        }
        for name in self.table.key_attribute_names() {
            item.remove(name);
        }
        for attribute in self.schema.attributes.iter().filter(|attribute| attribute.hidden) {
            item.remove(&attribute.name);
        }
        item
    }

    /// Table definition and entity schema of the index `name`.
    pub(crate) fn index(
        &self,
        name: &str,
    ) -> Result<(&'a IndexDefinition, &'a schema::IndexSchema)> {
        let definition = self
            .table
            .indexes
            .get(name)
            .ok_or_else(|| Error::NoSuchIndexFound {
                table: self.table.name.clone(),
                index: name.to_string(),
            })?;
        let schema = self
            .schema
            .indexes
            .get(name)
            .ok_or_else(|| Error::NoSuchIndexOnEntity {
                entity: self.schema.name.clone(),
                index: name.to_string(),
            })?;
        Ok((definition, schema))
    }

    /// Strongly consistent read of the stored item under `key`.
    pub(crate) fn previous_item(&self, key: Item) -> read::get_item::GetItemInput {
        read::get_item::GetItemInput::consistent(&self.table.name, key)
    }

    pub(crate) fn condition<T: Serialize>(
        condition: Option<common::condition::ConditionMap<T>>,
    ) -> Result<Expression> {
        match condition {
            Some(condition) => condition.into_expression(ExpressionKind::Condition),
            None => Ok(Expression::new(ExpressionKind::Condition)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        attribute::{AttributeDeclaration, AutoGenerateStrategy, DefaultValue, ScalarType, Transform},
        entity::tests::{table, user_declaration, user_unique_email_declaration},
    };

    fn s(value: &str) -> types::AttributeValue {
        types::AttributeValue::S(value.to_string())
    }

    #[test]
    fn test_unique_record_condition() {
        let table = table();
        let schema = EntitySchema::build(&table, user_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        assert_eq!(
            transformer.unique_record_condition().expression(),
            "(attribute_not_exists(#CE_PK)) AND (attribute_not_exists(#CE_SK))"
        );
        let simple = Table::new("simple", "PK");
        let declaration = crate::schema::entity::EntityDeclaration::new(
            "user",
            crate::schema::entity::PrimaryKeyDeclaration::simple("USER#{{id}}"),
        )
        .attribute(AttributeDeclaration::new("id", ScalarType::String));
        let schema = EntitySchema::build(&simple, declaration).unwrap();
        assert_eq!(
            RequestTransformer::new(&simple, &schema)
                .unique_record_condition()
                .expression(),
            "attribute_not_exists(#CE_PK)"
        );
    }

    #[test]
    fn test_to_dynamo_item_applies_defaults_and_keys() {
        let table = table();
        let declaration = user_declaration()
            .attribute(
                AttributeDeclaration::new("role", ScalarType::String)
                    .default_value(DefaultValue::Constant(s("member"))),
            )
            .attribute(
                AttributeDeclaration::new("createdAt", ScalarType::Number)
                    .auto_generate(AutoGenerateStrategy::EpochDate, false),
            )
            .attribute(
                AttributeDeclaration::new("nickname", ScalarType::String).transform(
                    Transform::new(|value| match value {
                        types::AttributeValue::S(text) => {
                            types::AttributeValue::S(text.to_lowercase())
                        }
                        other => other,
                    }),
                ),
            );
        let schema = EntitySchema::build(&table, declaration).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let item = transformer
            .to_dynamo_item(Item::from([
                ("id".to_string(), s("1")),
                ("name".to_string(), s("Me")),
                ("status".to_string(), s("active")),
                ("nickname".to_string(), s("ME")),
            ]))
            .unwrap();
        assert_eq!(item["PK"], s("USER#1"));
        assert_eq!(item["SK"], s("USER#1"));
        assert_eq!(item["GSI1PK"], s("USER#STATUS#active"));
        assert_eq!(item["GSI1SK"], s("USER#Me"));
        assert_eq!(item["__en"], s("user"));
        assert_eq!(item["role"], s("member"));
        assert_eq!(item["nickname"], s("me"));
        assert!(matches!(item["createdAt"], types::AttributeValue::N(_)));
    }

    #[test]
    fn test_to_dynamo_item_skips_sparse_index() {
        let table = table();
        let schema = EntitySchema::build(&table, user_unique_email_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let item = transformer
            .to_dynamo_item(Item::from([
                ("id".to_string(), s("1")),
                ("name".to_string(), s("Me")),
            ]))
            .unwrap();
        assert!(!item.contains_key("GSI1PK"));
        assert!(!item.contains_key("GSI1SK"));
    }

    #[test]
    fn test_to_dynamo_item_fails_on_missing_required_index_input() {
        let table = table();
        let schema = EntitySchema::build(&table, user_declaration()).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let error = transformer
            .to_dynamo_item(Item::from([
                ("id".to_string(), s("1")),
                ("name".to_string(), s("Me")),
            ]))
            .unwrap_err();
        assert!(matches!(error, Error::UnresolvedInterpolation { .. }));
    }

    #[test]
    fn test_from_dynamo_item() {
        let table = table();
        let declaration = user_declaration()
            .attribute(AttributeDeclaration::new("password", ScalarType::String).hidden());
        let schema = EntitySchema::build(&table, declaration).unwrap();
        let transformer = RequestTransformer::new(&table, &schema);
        let item = transformer.from_dynamo_item(Item::from([
            ("PK".to_string(), s("USER#1")),
            ("SK".to_string(), s("USER#1")),
            ("GSI1PK".to_string(), s("USER#STATUS#active")),
            ("GSI1SK".to_string(), s("USER#Me")),
            ("__en".to_string(), s("user")),
            ("password".to_string(), s("secret")),
            ("id".to_string(), s("1")),
            ("name".to_string(), s("Me")),
        ]));
        assert_eq!(
            item,
            Item::from([("id".to_string(), s("1")), ("name".to_string(), s("Me"))])
        );
    }
}
