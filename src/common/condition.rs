use crate::{
    error::{Error, Result},
    expression::{ComparisonOperator, Expression, ExpressionKind, MergeStrategy},
    schema::attribute::ScalarType,
};

use aws_sdk_dynamodb::types;
use serde::Serialize;
use serde_dynamo::to_attribute_value;

/// Condition types for DynamoDB expressions.
///
/// ```rust
/// use dynamodb_odm::common::condition;
///
/// let eq = condition::Condition::Equals("value".to_string());
/// let gt = condition::Condition::GreaterThan(100);
/// let exists: condition::Condition<String> = condition::Condition::AttributeExists;
/// let size = condition::Condition::Size(Box::new(condition::Condition::GreaterThan(2)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Condition<T> {
    /// Checks if an attribute exists.
    AttributeExists,
    /// Checks if an attribute does not exist.
    AttributeNotExists,
    /// Checks the DynamoDB type of an attribute.
    AttributeType(ScalarType),
    /// Checks if an attribute begins with a specified prefix (string types only).
    BeginsWith(String),
    /// Checks if an attribute value is between two values (inclusive).
    Between(T, T),
    /// Checks if an attribute contains a specified value.
    Contains(T),
    /// Checks if an attribute value equals a specified value.
    Equals(T),
    /// Checks if an attribute value is greater than a specified value.
    GreaterThan(T),
    /// Checks if an attribute value is greater than or equal to a specified value.
    GreaterThanOrEqual(T),
    /// Checks if an attribute value is in a list of specified values.
    In(Vec<T>),
    /// Checks if an attribute value is less than a specified value.
    LessThan(T),
    /// Checks if an attribute value is less than or equal to a specified value.
    LessThanOrEqual(T),
    /// Checks if an attribute does not contain a specified value.
    NotContains(T),
    /// Checks if an attribute value does not equal a specified value.
    NotEqual(T),
    /// Applies a scalar comparison to the size of an attribute.
    Size(Box<Condition<T>>),
}

impl<T> Condition<T> {
    fn comparison(&self) -> Option<ComparisonOperator> {
        match self {
            Self::Equals(_) => Some(ComparisonOperator::Equal),
            Self::NotEqual(_) => Some(ComparisonOperator::NotEqual),
            Self::LessThan(_) => Some(ComparisonOperator::LessThan),
            Self::LessThanOrEqual(_) => Some(ComparisonOperator::LessThanOrEqual),
            Self::GreaterThan(_) => Some(ComparisonOperator::GreaterThan),
            Self::GreaterThanOrEqual(_) => Some(ComparisonOperator::GreaterThanOrEqual),
            _ => None,
        }
    }

    fn into_compared_value(self) -> Option<T> {
        match self {
            Self::Equals(value)
            | Self::NotEqual(value)
            | Self::LessThan(value)
            | Self::LessThanOrEqual(value)
            | Self::GreaterThan(value)
            | Self::GreaterThanOrEqual(value) => Some(value),
            _ => None,
        }
    }

    /// Whether DynamoDB accepts the operator in a key condition.
    pub fn is_key_condition(&self) -> bool {
        matches!(
            self,
            Self::Equals(_)
                | Self::LessThan(_)
                | Self::LessThanOrEqual(_)
                | Self::GreaterThan(_)
                | Self::GreaterThanOrEqual(_)
                | Self::Between(_, _)
                | Self::BeginsWith(_)
        )
    }
}

impl<T: Serialize> Condition<T> {
    pub(crate) fn apply(self, expression: Expression, path: &str) -> Result<Expression> {
        let expression = match self {
            Self::AttributeExists => expression.attribute_exists(path),
            Self::AttributeNotExists => expression.attribute_not_exists(path),
            Self::AttributeType(scalar_type) => expression.attribute_type(path, scalar_type),
            Self::BeginsWith(prefix) => {
                expression.begins_with(path, types::AttributeValue::S(prefix))
            }
            Self::Between(start, end) => {
                expression.between(path, to_attribute_value(start)?, to_attribute_value(end)?)
            }
            Self::Contains(value) => expression.contains(path, to_attribute_value(value)?),
            Self::NotContains(value) => expression.not_contains(path, to_attribute_value(value)?),
            Self::In(values) => {
                if values.is_empty() {
                    return Err(Error::invalid_input(format!(
                        "IN on \"{path}\" needs at least one value"
                    )));
                }
                let values = values
                    .into_iter()
                    .map(to_attribute_value)
                    .collect::<Result<Vec<types::AttributeValue>, _>>()?;
                expression.is_in(path, values)
            }
            Self::Size(condition) => {
                let operator = condition.comparison().ok_or_else(|| {
                    Error::invalid_input(format!(
                        "SIZE on \"{path}\" only wraps scalar comparisons"
                    ))
                })?;
                let value = (*condition).into_compared_value().ok_or_else(|| {
                    Error::invalid_input(format!("SIZE on \"{path}\" has no value"))
                })?;
                expression.compare_size(path, operator, to_attribute_value(value)?)
            }
            condition => {
                let operator = condition.comparison().ok_or_else(|| {
                    Error::invalid_input(format!("unsupported operator on \"{path}\""))
                })?;
                let value = condition.into_compared_value().ok_or_else(|| {
                    Error::invalid_input(format!("comparison on \"{path}\" has no value"))
                })?;
                expression.compare(path, operator, to_attribute_value(value)?)
            }
        };
        Ok(expression)
    }
}

/// Condition applied to an attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyCondition<T> {
    /// The condition to apply to the attribute.
    pub condition: Condition<T>,
    /// The attribute path, dots for nested attributes and `[n]` for list items.
    pub name: String,
}

impl<T: Serialize> KeyCondition<T> {
    /// Compile into an expression of `kind`.
    pub fn into_expression(self, kind: ExpressionKind) -> Result<Expression> {
        if kind == ExpressionKind::KeyCondition && !self.condition.is_key_condition() {
            return Err(Error::invalid_input(format!(
                "operator on \"{}\" is not supported in key conditions",
                self.name
            )));
        }
        self.condition.apply(Expression::new(kind), &self.name)
    }
}

/// Map of conditions with logical operators.
///
/// ```rust
/// use dynamodb_odm::{common::condition, expression::MergeStrategy};
///
/// let map = condition::ConditionMap::Leaves(
///     MergeStrategy::And,
///     vec![
///         condition::KeyCondition {
///             name: "status".to_string(),
///             condition: condition::Condition::Equals("active".to_string()),
///         },
///     ],
/// );
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum ConditionMap<T> {
    /// Attribute conditions combined with the strategy.
    Leaves(MergeStrategy, Vec<KeyCondition<T>>),
    /// Nested groups combined with the strategy.
    Node(MergeStrategy, Vec<ConditionMap<T>>),
    /// Negated group.
    Not(Box<ConditionMap<T>>),
}

impl<T: Serialize> ConditionMap<T> {
    /// Compile into an expression of `kind`; each member of a group with more
    /// than one member is wrapped in parens.
    pub fn into_expression(self, kind: ExpressionKind) -> Result<Expression> {
        match self {
            Self::Leaves(strategy, leaves) => {
                let expressions = leaves
                    .into_iter()
                    .map(|leaf| leaf.into_expression(kind))
                    .collect::<Result<Vec<_>>>()?;
                Self::merge(kind, strategy, expressions)
            }
            Self::Node(strategy, children) => {
                let expressions = children
                    .into_iter()
                    .map(|child| child.into_expression(kind))
                    .collect::<Result<Vec<_>>>()?;
                Self::merge(kind, strategy, expressions)
            }
            Self::Not(child) => Ok(child.into_expression(kind)?.not()),
        }
    }

    fn merge(
        kind: ExpressionKind,
        strategy: MergeStrategy,
        expressions: Vec<Expression>,
    ) -> Result<Expression> {
        let mut expressions = expressions.into_iter();
        let first = expressions
            .next()
            .ok_or_else(|| Error::invalid_input("empty condition group"))?;
        debug_assert_eq!(first.kind(), kind);
        Ok(first.merge_many(expressions.collect(), strategy))
    }
}
