use crate::{
    common::{Item, condition::ConditionMap, key},
    error::{Error, Result},
    expression::{
        Expression, MergeStrategy,
        update::{
            RemoveValue, SetValue, UpdateBody, UpdateExpression, UpdateKind, UpdateValue,
            serialize_body,
        },
    },
    schema::{KeySchema, table::Table, template::KeyTemplate},
    transformer::{RequestTransformer, is_missing},
    write::{self, common::TransactWriteItem},
};

use aws_sdk_dynamodb::{Client, types};
use indexmap::IndexMap;
use serde::Serialize;

/// update item operation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateItemInput {
    /// Table primary key of the item.
    pub key: Item,
    /// Compiled update expression.
    pub update_expression: String,
    /// Write parameters (table name, condition, return values).
    pub write_operation: write::common::WriteInput,
}

impl UpdateItemInput {
    /// Execute the update item operation, returning the attributes selected
    /// by the return values of the request.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.update_item", skip_all, err)
    )]
    pub(crate) async fn send(self, client: &Client) -> Result<Option<Item>> {
        let builder = client
            .update_item()
            .set_key(Some(self.key))
            .update_expression(self.update_expression)
            .set_return_values(self.write_operation.return_values);
        let output = crate::apply_write_operation!(builder, self.write_operation)
            .send()
            .await
            .map_err(Error::store)?;
        Ok(output.attributes)
    }
}

/// Options of an entity update.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateOptions<T> {
    /// Condition the stored item must satisfy.
    pub condition: Option<ConditionMap<T>>,
}

impl<T> Default for UpdateOptions<T> {
    fn default() -> Self {
        Self { condition: None }
    }
}

/// Planned update.
pub type UpdatePlan = write::common::WritePlan<UpdateItemInput>;

/// Index key attribute whose inputs were not all supplied by the update.
#[derive(Clone, Debug)]
struct DeferredKey {
    name: String,
    template: KeyTemplate,
    is_sparse: bool,
}

impl DeferredKey {
    /// Resolve against `attributes`, `None` when a sparse input is missing.
    fn resolve(&self, attributes: &Item) -> Result<Option<types::AttributeValue>> {
        match self.template.resolve(attributes, self.is_sparse) {
            Ok(value) => Ok(Some(value)),
            Err(Error::SparseIndexParse { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// Top level attribute of `path`.
fn root(path: &str) -> &str {
    path.split(['.', '[']).next().unwrap_or(path)
}

fn to_update_item_input(
    table_name: &str,
    key: Item,
    body: &UpdateBody<types::AttributeValue>,
    index_values: &IndexMap<String, types::AttributeValue>,
    removed_index_attributes: &[String],
    condition: Expression,
) -> Result<UpdateItemInput> {
    let mut expression = UpdateExpression::from_body(body.clone())?;
    for (name, value) in index_values {
        expression = expression.set(name, value.clone());
    }
    for name in removed_index_attributes {
        expression = expression.remove(name);
    }
    let mut write_operation = write::common::WriteInput::new(table_name);
    let update_expression = write_operation.merge_expression(expression.build().into_input());
    Ok(UpdateItemInput {
        key,
        update_expression,
        write_operation: write_operation.with_condition(condition),
    })
}

struct UniqueUpdate {
    name: String,
    key: KeySchema,
}

impl RequestTransformer<'_> {
    fn transform_static_values(&self, body: &mut UpdateBody<types::AttributeValue>) {
        for (path, value) in body.iter_mut() {
            if value.kind(path) == UpdateKind::Dynamic {
                continue;
            }
            let Some(attribute) = self.schema.attribute(path) else {
                continue;
            };
            if let UpdateValue::Set(SetValue::Assign(value) | SetValue::IfNotExists { value, .. }) =
                value
            {
                *value = attribute.transformed(value.clone());
            }
        }
    }

    /// Plan the update of the entity identified by `primary_key_attributes`.
    ///
    /// Returns a single update when nothing depends on the stored item,
    /// otherwise a loader planning a transaction from it: a primary key
    /// change moves the item, unique attributes move their shadow items and
    /// index keys whose inputs are only partially updated are recomputed.
    pub fn to_update_item<K: Serialize, B: Serialize, T: Serialize>(
        &self,
        primary_key_attributes: &K,
        body: UpdateBody<B>,
        options: UpdateOptions<T>,
    ) -> Result<UpdatePlan> {
        let primary_key_attributes = self.serialize_primary_key_attributes(primary_key_attributes)?;
        let key = self.primary_key(&primary_key_attributes)?;
        let mut body = serialize_body(body)?;
        for attribute in &self.schema.attributes {
            if let Some(auto_update) = &attribute.auto_update {
                body.insert(
                    attribute.name.clone(),
                    UpdateValue::Set(SetValue::Assign(auto_update.value())),
                );
            }
        }
        if body.is_empty() {
            return Err(Error::invalid_input("update body is empty"));
        }
        self.transform_static_values(&mut body);

        let static_values: Item = body
            .iter()
            .filter_map(|(path, value)| Some((path.clone(), value.static_value(path)?.clone())))
            .collect();
        let is_updated = |name: &str| body.keys().any(|path| root(path) == name);

        let mut unique_updates = Vec::new();
        for (attribute, unique_key) in self.schema.unique_attributes() {
            if !is_updated(&attribute.name) {
                continue;
            }
            if !static_values.contains_key(&attribute.name) {
                return Err(Error::InvalidDynamicUpdateAttributeValue(
                    attribute.name.clone(),
                ));
            }
            unique_updates.push(UniqueUpdate {
                name: attribute.name.clone(),
                key: unique_key.clone(),
            });
        }

        let mut affected_primary_key_attributes = Vec::new();
        for path in body.keys() {
            let name = root(path);
            if !self.schema.primary_key.uses(name) {
                continue;
            }
            match static_values.get(name) {
                None => return Err(Error::InvalidDynamicUpdateAttributeValue(name.to_string())),
                Some(value) if primary_key_attributes.get(name) != Some(value) => {
                    affected_primary_key_attributes.push(name.to_string());
                }
                Some(_) => {}
            }
        }
        if !affected_primary_key_attributes.is_empty() && !unique_updates.is_empty() {
            return Err(Error::InvalidUniqueAttributeUpdate {
                primary_key_attributes: affected_primary_key_attributes,
                unique_attributes: unique_updates.into_iter().map(|unique| unique.name).collect(),
            });
        }

        let mut attributes = primary_key_attributes.clone();
        attributes.extend(static_values.clone());
        let mut index_values = IndexMap::new();
        let mut deferred = Vec::new();
        for index in self.schema.indexes.values() {
            for (key_attribute, template) in &index.key.attributes {
                let referenced = &index.key.interpolations[key_attribute];
                if !referenced.iter().any(|name| is_updated(name)) {
                    continue;
                }
                if let Some(name) = referenced
                    .iter()
                    .find(|name| is_updated(name) && !static_values.contains_key(name.as_str()))
                {
                    return Err(Error::InvalidDynamicUpdateAttributeValue(name.clone()));
                }
                match template.resolve(&attributes, index.is_sparse) {
                    Ok(value) => {
                        index_values.insert(key_attribute.clone(), value);
                    }
                    Err(Error::UnresolvedInterpolation { .. } | Error::SparseIndexParse { .. }) => {
                        deferred.push(DeferredKey {
                            name: key_attribute.clone(),
                            template: template.clone(),
                            is_sparse: index.is_sparse,
                        });
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        let condition = Self::condition(options.condition)?;
        let table_name = self.table.name.clone();

        if !affected_primary_key_attributes.is_empty() {
            crate::log!(
                debug,
                entity = %self.schema.name,
                attributes = ?affected_primary_key_attributes,
                "update moves the item to a new primary key"
            );
            return self.to_primary_key_move(
                key,
                primary_key_attributes,
                attributes,
                body,
                index_values,
                deferred,
                condition,
            );
        }

        if unique_updates.is_empty() && deferred.is_empty() {
            let mut input = to_update_item_input(
                &table_name,
                key,
                &body,
                &index_values,
                &[],
                condition,
            )?;
            input.write_operation.return_values = Some(types::ReturnValue::AllNew);
            return Ok(write::common::WritePlan::Item(input));
        }

        crate::log!(
            debug,
            entity = %self.schema.name,
            unique_attributes = unique_updates.len(),
            deferred_index_attributes = deferred.len(),
            "update planned against the stored item"
        );
        let unique_record = self.unique_record_condition();
        let previous = self.previous_item(key.clone());
        let updated_key = key.clone();
        let loader = move |previous: Option<&Item>| -> Result<Vec<TransactWriteItem>> {
            let mut index_values = index_values;
            let mut removed_index_attributes = Vec::new();
            if !deferred.is_empty() {
                let mut source = previous.cloned().unwrap_or_default();
                source.extend(attributes);
                for deferred in &deferred {
                    match deferred.resolve(&source)? {
                        Some(value) => {
                            index_values.insert(deferred.name.clone(), value);
                        }
                        None => removed_index_attributes.push(deferred.name.clone()),
                    }
                }
            }
            let mut items = vec![TransactWriteItem::Update(to_update_item_input(
                &table_name,
                key,
                &body,
                &index_values,
                &removed_index_attributes,
                condition,
            )?)];
            for unique in unique_updates {
                let previous_value = previous
                    .filter(|previous| !is_missing(previous, &unique.name))
                    .and_then(|previous| previous.get(&unique.name));
                let value = static_values
                    .get(&unique.name)
                    .filter(|_| !is_missing(&static_values, &unique.name));
                if previous_value == value {
                    continue;
                }
                if value.is_some() {
                    items.push(TransactWriteItem::Put(write::put_item::PutItemInput {
                        item: unique.key.resolve(&static_values, false)?,
                        write_operation: write::common::WriteInput::new(&table_name)
                            .with_condition(unique_record.clone()),
                    }));
                }
                if let Some(previous) = previous.filter(|_| previous_value.is_some()) {
                    items.push(TransactWriteItem::Delete(
                        write::delete_item::DeleteItemInput {
                            key: unique.key.resolve(previous, false)?,
                            write_operation: write::common::WriteInput::new(&table_name),
                        },
                    ));
                }
            }
            Ok(items)
        };
        Ok(write::common::WritePlan::Lazy(
            write::common::LazyTransactWriteItemListLoader::new(
                &self.schema.name,
                primary_key_attributes,
                previous,
                updated_key,
                loader,
            ),
        ))
    }

    /// Put of the merged item under its new key plus delete of the old one.
    #[allow(clippy::too_many_arguments)]
    fn to_primary_key_move(
        &self,
        key: Item,
        primary_key_attributes: Item,
        attributes: Item,
        body: UpdateBody<types::AttributeValue>,
        index_values: IndexMap<String, types::AttributeValue>,
        deferred: Vec<DeferredKey>,
        condition: Expression,
    ) -> Result<UpdatePlan> {
        let mut removed_attributes = Vec::new();
        for (path, value) in &body {
            match value {
                UpdateValue::Remove(RemoveValue::Attribute) if root(path) == path => {
                    removed_attributes.push(path.clone());
                }
                value if value.kind(path) == UpdateKind::Dynamic => {
                    return Err(Error::InvalidDynamicUpdateAttributeValue(path.clone()));
                }
                _ => {}
            }
        }
        let new_key = self.primary_key(&attributes)?;
        let table: Table = self.table.clone();
        let internal_attributes = self.schema.internal_attributes.clone();
        let unique_record = self.unique_record_condition();
        let previous = self.previous_item(key);
        let updated_key = new_key.clone();
        let loader = move |previous: Option<&Item>| -> Result<Vec<TransactWriteItem>> {
            let mut item = previous.cloned().unwrap_or_default();
            item.extend(internal_attributes);
            item.extend(attributes);
            for name in &removed_attributes {
                item.remove(name);
            }
            item.extend(index_values);
            for deferred in &deferred {
                match deferred.resolve(&item)? {
                    Some(value) => {
                        item.insert(deferred.name.clone(), value);
                    }
                    None => {
                        item.remove(&deferred.name);
                    }
                }
            }
            item.extend(new_key);
            let put = |condition: Expression| {
                TransactWriteItem::Put(write::put_item::PutItemInput {
                    item,
                    write_operation: write::common::WriteInput::new(&table.name)
                        .with_condition(condition),
                })
            };
            let items = match previous {
                Some(previous) => vec![
                    put(unique_record),
                    TransactWriteItem::Delete(write::delete_item::DeleteItemInput {
                        key: key::table_key(&table, previous),
                        write_operation: write::common::WriteInput::new(&table.name)
                            .with_condition(condition),
                    }),
                ],
                None => vec![put(unique_record.merge(condition, MergeStrategy::And))],
            };
            Ok(items)
        };
        Ok(write::common::WritePlan::Lazy(
            write::common::LazyTransactWriteItemListLoader::new(
                &self.schema.name,
                primary_key_attributes,
                previous,
                updated_key,
                loader,
            ),
        ))
    }
}
