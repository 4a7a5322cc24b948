use crate::{
    common,
    error::{Error, Result},
    expression::{Expression, ExpressionKind},
};

use aws_sdk_dynamodb::types;
use indexmap::IndexMap;
use serde::Serialize;
use serde_dynamo::to_attribute_value;

/// SET action payloads.
#[derive(Clone, Debug, PartialEq)]
pub enum SetValue<T> {
    /// `path = value`.
    Assign(T),
    /// `path = path + value`.
    IncrementBy(T),
    /// `path = path - value`.
    DecrementBy(T),
    /// `path = if_not_exists(check, value)`, `check` defaults to `path`.
    IfNotExists {
        /// Value written when `check` is missing.
        value: T,
        /// Attribute checked for existence.
        path: Option<String>,
    },
    /// `path = list_append(source, value)`, `source` defaults to `path`.
    ListAppend {
        /// Items appended.
        value: T,
        /// List appended to.
        path: Option<String>,
    },
}

/// REMOVE action payloads.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RemoveValue {
    /// Remove the whole attribute.
    Attribute,
    /// Remove the given list positions.
    AtIndexes(Vec<usize>),
}

/// Update of one attribute.
///
/// ```rust
/// use dynamodb_odm::expression::update::{SetValue, UpdateBody, UpdateValue};
///
/// let body = UpdateBody::from([
///     ("name".to_string(), UpdateValue::Set(SetValue::Assign("Me"))),
///     ("status".to_string(), UpdateValue::Set(SetValue::Assign("active"))),
/// ]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateValue<T> {
    /// SET action.
    Set(SetValue<T>),
    /// ADD action, numbers and sets.
    Add(T),
    /// REMOVE action.
    Remove(RemoveValue),
    /// DELETE action, sets.
    Delete(T),
}

/// Attribute path to its update, in caller order.
pub type UpdateBody<T> = IndexMap<String, UpdateValue<T>>;

/// Whether the final value of an update is known before it reaches the store.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UpdateKind {
    /// Literal value, safe to mirror into keys and indexes.
    Static,
    /// Evaluated by the store.
    Dynamic,
}

fn is_nested(path: &str) -> bool {
    path.contains('.') || path.contains('[')
}

impl<T: Serialize> UpdateValue<T> {
    /// Convert the payload into DynamoDB values.
    pub fn into_attribute_value(self) -> Result<UpdateValue<types::AttributeValue>> {
        let value = match self {
            Self::Set(SetValue::Assign(value)) => {
                UpdateValue::Set(SetValue::Assign(to_attribute_value(value)?))
            }
            Self::Set(SetValue::IncrementBy(value)) => {
                UpdateValue::Set(SetValue::IncrementBy(to_attribute_value(value)?))
            }
            Self::Set(SetValue::DecrementBy(value)) => {
                UpdateValue::Set(SetValue::DecrementBy(to_attribute_value(value)?))
            }
            Self::Set(SetValue::IfNotExists { value, path }) => {
                UpdateValue::Set(SetValue::IfNotExists {
                    value: to_attribute_value(value)?,
                    path,
                })
            }
            Self::Set(SetValue::ListAppend { value, path }) => {
                UpdateValue::Set(SetValue::ListAppend {
                    value: to_attribute_value(value)?,
                    path,
                })
            }
            Self::Add(value) => UpdateValue::Add(to_attribute_value(value)?),
            Self::Remove(remove) => UpdateValue::Remove(remove),
            Self::Delete(value) => UpdateValue::Delete(to_attribute_value(value)?),
        };
        Ok(value)
    }
}

impl UpdateValue<types::AttributeValue> {
    /// Classify the update of `path`.
    pub fn kind(&self, path: &str) -> UpdateKind {
        match self {
            Self::Set(SetValue::Assign(_) | SetValue::IfNotExists { .. }) if !is_nested(path) => {
                UpdateKind::Static
            }
            _ => UpdateKind::Dynamic,
        }
    }

    /// Value the attribute will hold, when it is static.
    pub fn static_value(&self, path: &str) -> Option<&types::AttributeValue> {
        match (self.kind(path), self) {
            (
                UpdateKind::Static,
                Self::Set(SetValue::Assign(value) | SetValue::IfNotExists { value, .. }),
            ) => Some(value),
            _ => None,
        }
    }
}

/// Convert a whole body into DynamoDB values.
pub fn serialize_body<T: Serialize>(
    body: UpdateBody<T>,
) -> Result<UpdateBody<types::AttributeValue>> {
    body.into_iter()
        .map(|(path, value)| Ok((path, value.into_attribute_value()?)))
        .collect()
}

fn is_empty_collection(value: &types::AttributeValue) -> bool {
    match value {
        types::AttributeValue::L(items) => items.is_empty(),
        types::AttributeValue::Ss(items) | types::AttributeValue::Ns(items) => items.is_empty(),
        types::AttributeValue::Bs(items) => items.is_empty(),
        _ => false,
    }
}

/// Update expression under construction.
///
/// Actions are grouped as `SET ... ADD ... REMOVE ... DELETE ...`.
#[derive(Clone, Debug)]
pub struct UpdateExpression {
    placeholders: Expression,
    set: Vec<String>,
    add: Vec<String>,
    remove: Vec<String>,
    delete: Vec<String>,
}

impl Default for UpdateExpression {
    fn default() -> Self {
        Self {
            placeholders: Expression::new(ExpressionKind::Update),
            set: Vec::new(),
            add: Vec::new(),
            remove: Vec::new(),
            delete: Vec::new(),
        }
    }
}

impl UpdateExpression {
    /// Empty update expression.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a whole body.
    pub fn from_body(body: UpdateBody<types::AttributeValue>) -> Result<Self> {
        body.into_iter()
            .try_fold(Self::new(), |expression, (path, value)| {
                expression.apply(&path, value)
            })
    }

    /// Whether no action was added.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.add.is_empty() && self.remove.is_empty() && self.delete.is_empty()
    }

    /// Add the update of `path`.
    pub fn apply(self, path: &str, value: UpdateValue<types::AttributeValue>) -> Result<Self> {
        match value {
            UpdateValue::Set(SetValue::Assign(value)) => Ok(self.set(path, value)),
            UpdateValue::Set(SetValue::IncrementBy(value)) => Ok(self.increment_by(path, value)),
            UpdateValue::Set(SetValue::DecrementBy(value)) => Ok(self.decrement_by(path, value)),
            UpdateValue::Set(SetValue::IfNotExists {
                value,
                path: checked,
            }) => Ok(self.if_not_exists(path, checked.as_deref().unwrap_or(path), value)),
            UpdateValue::Set(SetValue::ListAppend {
                value,
                path: source,
            }) => Ok(self.list_append(path, source.as_deref().unwrap_or(path), value)),
            UpdateValue::Add(value) if is_empty_collection(&value) => Err(Error::invalid_input(
                format!("ADD on \"{path}\" needs a non empty value"),
            )),
            UpdateValue::Add(value) => Ok(self.add(path, value)),
            UpdateValue::Remove(RemoveValue::Attribute) => Ok(self.remove(path)),
            UpdateValue::Remove(RemoveValue::AtIndexes(indexes)) if indexes.is_empty() => Err(
                Error::invalid_input(format!("REMOVE on \"{path}\" needs at least one index")),
            ),
            UpdateValue::Remove(RemoveValue::AtIndexes(indexes)) => {
                Ok(self.remove_at(path, &indexes))
            }
            UpdateValue::Delete(value) => Ok(self.delete(path, value)),
        }
    }

    /// `SET path = value`.
    pub fn set(mut self, path: &str, value: types::AttributeValue) -> Self {
        let name = self.placeholders.add_name(path);
        let value = self.placeholders.add_value(path, None, value);
        self.set.push(format!("{name} = {value}"));
        self
    }

    /// `SET path = path + value`.
    pub fn increment_by(mut self, path: &str, value: types::AttributeValue) -> Self {
        let name = self.placeholders.add_name(path);
        let value = self.placeholders.add_value(path, None, value);
        self.set.push(format!("{name} = {name} + {value}"));
        self
    }

    /// `SET path = path - value`.
    pub fn decrement_by(mut self, path: &str, value: types::AttributeValue) -> Self {
        let name = self.placeholders.add_name(path);
        let value = self.placeholders.add_value(path, None, value);
        self.set.push(format!("{name} = {name} - {value}"));
        self
    }

    /// `SET path = if_not_exists(checked, value)`.
    pub fn if_not_exists(mut self, path: &str, checked: &str, value: types::AttributeValue) -> Self {
        let name = self.placeholders.add_name(path);
        let checked = self.placeholders.add_name(checked);
        let value = self.placeholders.add_value(path, None, value);
        self.set
            .push(format!("{name} = if_not_exists({checked}, {value})"));
        self
    }

    /// `SET path = list_append(source, value)`.
    pub fn list_append(mut self, path: &str, source: &str, value: types::AttributeValue) -> Self {
        let name = self.placeholders.add_name(path);
        let source = self.placeholders.add_name(source);
        let value = self.placeholders.add_value(path, None, value);
        self.set
            .push(format!("{name} = list_append({source}, {value})"));
        self
    }

    /// `ADD path value`.
    pub fn add(mut self, path: &str, value: types::AttributeValue) -> Self {
        let name = self.placeholders.add_name(path);
        let value = self.placeholders.add_value(path, None, value);
        self.add.push(format!("{name} {value}"));
        self
    }

    /// `REMOVE path`.
    pub fn remove(mut self, path: &str) -> Self {
        let name = self.placeholders.add_name(path);
        self.remove.push(name);
        self
    }

    /// `REMOVE path[i], path[j]`.
    pub fn remove_at(mut self, path: &str, indexes: &[usize]) -> Self {
        let name = self.placeholders.add_name(path);
        self.remove
            .extend(indexes.iter().map(|index| format!("{name}[{index}]")));
        self
    }

    /// `DELETE path value`.
    pub fn delete(mut self, path: &str, value: types::AttributeValue) -> Self {
        let name = self.placeholders.add_name(path);
        let value = self.placeholders.add_value(path, None, value);
        self.delete.push(format!("{name} {value}"));
        self
    }

    /// Compile the actions.
    pub fn build(self) -> Expression {
        let actions: Vec<_> = [
            ("SET", self.set),
            ("ADD", self.add),
            ("REMOVE", self.remove),
            ("DELETE", self.delete),
        ]
        .into_iter()
        .filter(|(_, fragments)| !fragments.is_empty())
        .map(|(action, fragments)| format!("{action} {}", fragments.join(", ")))
        .collect();
        let mut input = self.placeholders.into_input();
        input.expression = actions.join(" ");
        Expression::from_input(ExpressionKind::Update, input)
    }
}

impl From<UpdateExpression> for common::ExpressionInput {
    fn from(expression: UpdateExpression) -> Self {
        expression.build().into_input()
    }
}
