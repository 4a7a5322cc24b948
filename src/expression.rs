//! Expression compiler.
//!
//! Every expression kind shares the same builder: each operator call appends a
//! name placeholder, optionally a value placeholder, and a fragment to the
//! expression string. Placeholders carry a per kind prefix so that several
//! kinds can be merged into one request without collisions:
//!
//! | kind          | names        | values       |
//! |---------------|--------------|--------------|
//! | condition     | `#CE_attr`   | `:CE_attr`   |
//! | filter        | `#FE_attr`   | `:FE_attr`   |
//! | key condition | `#KY_CE_attr`| `:KY_CE_attr`|
//! | update        | `#UE_attr`   | `:UE_attr`   |
//! | projection    | `#PE_attr`   |              |

/// Update expressions.
pub mod update;

use crate::{common, schema};

use aws_sdk_dynamodb::types;
use std::ops;

/// Kind of an expression, which fixes its placeholder prefix.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExpressionKind {
    /// `ConditionExpression` of writes.
    Condition,
    /// `FilterExpression` of queries.
    Filter,
    /// `KeyConditionExpression` of queries.
    KeyCondition,
    /// `UpdateExpression` of updates.
    Update,
    /// `ProjectionExpression` of reads.
    Projection,
}

impl ExpressionKind {
    /// Placeholder prefix of the kind.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Condition => "CE",
            Self::Filter => "FE",
            Self::KeyCondition => "KY_CE",
            Self::Update => "UE",
            Self::Projection => "PE",
        }
    }
}

/// Strategy used to merge two expressions.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MergeStrategy {
    /// Both must hold.
    #[default]
    And,
    /// Either holds.
    Or,
}

impl ops::Deref for MergeStrategy {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// Scalar comparison operators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ComparisonOperator {
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
}

impl ops::Deref for ComparisonOperator {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
        }
    }
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .filter(|c| *c != ']')
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Incrementally built expression of one kind.
///
/// ```rust
/// use dynamodb_odm::expression::{Expression, ExpressionKind};
///
/// let expression = Expression::new(ExpressionKind::Condition)
///     .attribute_not_exists("PK")
///     .merge(
///         Expression::new(ExpressionKind::Condition).attribute_not_exists("SK"),
///         Default::default(),
///     );
/// assert_eq!(
///     expression.expression(),
///     "(attribute_not_exists(#CE_PK)) AND (attribute_not_exists(#CE_SK))"
/// );
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Expression {
    kind: ExpressionKind,
    input: common::ExpressionInput,
}

impl Expression {
    /// Start an empty expression of `kind`.
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            kind,
            input: common::ExpressionInput::default(),
        }
    }

    /// Kind of the expression.
    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    /// The compiled expression string.
    pub fn expression(&self) -> &str {
        &self.input.expression
    }

    /// Whether nothing was appended yet.
    pub fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    /// Compiled parts of the expression.
    pub fn into_input(self) -> common::ExpressionInput {
        self.input
    }

    /// Register the name placeholders of `path` and return its placeholder
    /// path. Dots separate nested attributes, `[n]` list indexes stay literal.
    /// Names sharing a sanitized form get numbered placeholders.
    pub(crate) fn add_name(&mut self, path: &str) -> String {
        let prefix = self.kind.prefix();
        path.split('.')
            .map(|segment| {
                let (name, index) = match segment.find('[') {
                    Some(position) => segment.split_at(position),
                    None => (segment, ""),
                };
                let mut placeholder = format!("#{prefix}_{}", sanitize(name));
                let names = &mut self.input.expression_attribute_names;
                if names
                    .get(&placeholder)
                    .is_some_and(|existing| existing != name)
                {
                    let mut counter = 1;
                    while names
                        .get(&format!("{placeholder}_{counter}"))
                        .is_some_and(|existing| existing != name)
                    {
                        counter += 1;
                    }
                    placeholder = format!("{placeholder}_{counter}");
                }
                names.insert(placeholder.clone(), name.to_string());
                format!("{placeholder}{index}")
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Register `value` under the value placeholder of `path` and return it.
    pub(crate) fn add_value(
        &mut self,
        path: &str,
        suffix: Option<&str>,
        value: types::AttributeValue,
    ) -> String {
        let mut placeholder = format!(":{}_{}", self.kind.prefix(), sanitize(path));
        if let Some(suffix) = suffix {
            placeholder.push('_');
            placeholder.push_str(suffix);
        }
        let values = &mut self.input.expression_attribute_values;
        if values
            .get(&placeholder)
            .is_some_and(|existing| *existing != value)
        {
            let mut counter = 1;
            while values
                .get(&format!("{placeholder}_{counter}"))
                .is_some_and(|existing| *existing != value)
            {
                counter += 1;
            }
            placeholder = format!("{placeholder}_{counter}");
        }
        values.insert(placeholder.clone(), value);
        placeholder
    }

    /// Append a fragment, joined with AND to what is already there.
    pub(crate) fn append(mut self, fragment: String) -> Self {
        self.input.expression = if self.input.expression.is_empty() {
            fragment
        } else {
            format!("{}{}{fragment}", self.input.expression, &*MergeStrategy::And)
        };
        self
    }

    /// `path <operator> value`.
    pub fn compare(
        mut self,
        path: &str,
        operator: ComparisonOperator,
        value: types::AttributeValue,
    ) -> Self {
        let name = self.add_name(path);
        let value = self.add_value(path, None, value);
        self.append(format!("{name} {} {value}", &*operator))
    }

    /// `size(path) <operator> value`.
    pub fn compare_size(
        mut self,
        path: &str,
        operator: ComparisonOperator,
        value: types::AttributeValue,
    ) -> Self {
        let name = self.add_name(path);
        let value = self.add_value(path, None, value);
        self.append(format!("size({name}) {} {value}", &*operator))
    }

    /// `path = value`.
    pub fn equals(self, path: &str, value: types::AttributeValue) -> Self {
        self.compare(path, ComparisonOperator::Equal, value)
    }

    /// `path <> value`.
    pub fn not_equals(self, path: &str, value: types::AttributeValue) -> Self {
        self.compare(path, ComparisonOperator::NotEqual, value)
    }

    /// `path < value`.
    pub fn less_than(self, path: &str, value: types::AttributeValue) -> Self {
        self.compare(path, ComparisonOperator::LessThan, value)
    }

    /// `path <= value`.
    pub fn less_than_and_equal_to(self, path: &str, value: types::AttributeValue) -> Self {
        self.compare(path, ComparisonOperator::LessThanOrEqual, value)
    }

    /// `path > value`.
    pub fn greater_than(self, path: &str, value: types::AttributeValue) -> Self {
        self.compare(path, ComparisonOperator::GreaterThan, value)
    }

    /// `path >= value`.
    pub fn greater_than_and_equal_to(self, path: &str, value: types::AttributeValue) -> Self {
        self.compare(path, ComparisonOperator::GreaterThanOrEqual, value)
    }

    /// `path BETWEEN start AND end`.
    pub fn between(
        mut self,
        path: &str,
        start: types::AttributeValue,
        end: types::AttributeValue,
    ) -> Self {
        let name = self.add_name(path);
        let start = self.add_value(path, Some("start"), start);
        let end = self.add_value(path, Some("end"), end);
        self.append(format!("{name} BETWEEN {start} AND {end}"))
    }

    /// `path IN (values...)`.
    pub fn is_in(mut self, path: &str, values: Vec<types::AttributeValue>) -> Self {
        let name = self.add_name(path);
        let placeholders: Vec<_> = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| self.add_value(path, Some(&index.to_string()), value))
            .collect();
        self.append(format!("{name} IN ({})", placeholders.join(", ")))
    }

    /// `begins_with(path, prefix)`.
    pub fn begins_with(mut self, path: &str, prefix: types::AttributeValue) -> Self {
        let name = self.add_name(path);
        let value = self.add_value(path, None, prefix);
        self.append(format!("begins_with({name}, {value})"))
    }

    /// `contains(path, value)`.
    pub fn contains(mut self, path: &str, value: types::AttributeValue) -> Self {
        let name = self.add_name(path);
        let value = self.add_value(path, None, value);
        self.append(format!("contains({name}, {value})"))
    }

    /// `NOT contains(path, value)`.
    pub fn not_contains(mut self, path: &str, value: types::AttributeValue) -> Self {
        let name = self.add_name(path);
        let value = self.add_value(path, None, value);
        self.append(format!("NOT contains({name}, {value})"))
    }

    /// `attribute_type(path, type)`.
    pub fn attribute_type(mut self, path: &str, scalar_type: schema::attribute::ScalarType) -> Self {
        let name = self.add_name(path);
        let value = self.add_value(
            path,
            None,
            types::AttributeValue::S(scalar_type.descriptor().to_string()),
        );
        self.append(format!("attribute_type({name}, {value})"))
    }

    /// `attribute_exists(path)`.
    pub fn attribute_exists(mut self, path: &str) -> Self {
        let name = self.add_name(path);
        self.append(format!("attribute_exists({name})"))
    }

    /// `attribute_not_exists(path)`.
    pub fn attribute_not_exists(mut self, path: &str) -> Self {
        let name = self.add_name(path);
        self.append(format!("attribute_not_exists({name})"))
    }

    /// Wrap the expression in `NOT (...)`.
    pub fn not(mut self) -> Self {
        if !self.input.expression.is_empty() {
            self.input.expression = format!("NOT ({})", self.input.expression);
        }
        self
    }

    /// `(self) <strategy> (other)`, an empty side yields the other one.
    pub fn merge(self, other: Self, strategy: MergeStrategy) -> Self {
        self.merge_many(vec![other], strategy)
    }

    /// `(self) <strategy> (a) <strategy> (b) ...`.
    pub fn merge_many(self, others: Vec<Self>, strategy: MergeStrategy) -> Self {
        let kind = self.kind;
        let mut inputs = Vec::with_capacity(others.len() + 1);
        inputs.push(self.input);
        inputs.extend(others.into_iter().map(|other| other.input));
        Self {
            kind,
            input: common::ExpressionInput::merge(&strategy, inputs),
        }
    }

    pub(crate) fn from_input(kind: ExpressionKind, input: common::ExpressionInput) -> Self {
        Self { kind, input }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use std::collections;

    fn s(value: &str) -> types::AttributeValue {
        types::AttributeValue::S(value.to_string())
    }

    fn n(value: &str) -> types::AttributeValue {
        types::AttributeValue::N(value.to_string())
    }

    #[rstest]
    #[case::equals(
        Expression::new(ExpressionKind::Condition).equals("id", s("1")),
        "#CE_id = :CE_id"
    )]
    #[case::not_equals(
        Expression::new(ExpressionKind::Condition).not_equals("status", s("active")),
        "#CE_status <> :CE_status"
    )]
    #[case::between(
        Expression::new(ExpressionKind::Condition).between("age", n("1"), n("9")),
        "#CE_age BETWEEN :CE_age_start AND :CE_age_end"
    )]
    #[case::is_in(
        Expression::new(ExpressionKind::Filter).is_in("status", vec![s("a"), s("b")]),
        "#FE_status IN (:FE_status_0, :FE_status_1)"
    )]
    #[case::begins_with(
        Expression::new(ExpressionKind::KeyCondition).begins_with("SK", s("USER#")),
        "begins_with(#KY_CE_SK, :KY_CE_SK)"
    )]
    #[case::attribute_exists(
        Expression::new(ExpressionKind::Filter).attribute_exists("status"),
        "attribute_exists(#FE_status)"
    )]
    #[case::size(
        Expression::new(ExpressionKind::Filter).compare_size(
            "tags",
            ComparisonOperator::GreaterThan,
            n("2")
        ),
        "size(#FE_tags) > :FE_tags"
    )]
    #[case::attribute_type(
        Expression::new(ExpressionKind::Filter).attribute_type(
            "tags",
            schema::attribute::ScalarType::StringSet
        ),
        "attribute_type(#FE_tags, :FE_tags)"
    )]
    #[case::nested_path(
        Expression::new(ExpressionKind::Filter).equals("profile.addresses[0].city", s("x")),
        "#FE_profile.#FE_addresses[0].#FE_city = :FE_profile_addresses_0_city"
    )]
    #[case::not(
        Expression::new(ExpressionKind::Condition).equals("id", s("1")).not(),
        "NOT (#CE_id = :CE_id)"
    )]
    #[case::merge(
        Expression::new(ExpressionKind::KeyCondition)
            .equals("PK", s("USER#1"))
            .merge(
                Expression::new(ExpressionKind::KeyCondition).begins_with("SK", s("USER#")),
                MergeStrategy::And
            ),
        "(#KY_CE_PK = :KY_CE_PK) AND (begins_with(#KY_CE_SK, :KY_CE_SK))"
    )]
    #[case::merge_many_or(
        Expression::new(ExpressionKind::Filter).equals("a", s("1")).merge_many(
            vec![
                Expression::new(ExpressionKind::Filter).equals("b", s("2")),
                Expression::new(ExpressionKind::Filter).equals("c", s("3")),
            ],
            MergeStrategy::Or
        ),
        "(#FE_a = :FE_a) OR (#FE_b = :FE_b) OR (#FE_c = :FE_c)"
    )]
    #[case::merge_with_empty(
        Expression::new(ExpressionKind::Condition)
            .merge(Expression::new(ExpressionKind::Condition).equals("id", s("1")), MergeStrategy::And),
        "#CE_id = :CE_id"
    )]
    fn test_expression(#[case] expression: Expression, #[case] expected: &str) {
        assert_eq!(expression.expression(), expected);
    }

    #[test]
    fn test_same_attribute_twice_keeps_both_values() {
        let expression = Expression::new(ExpressionKind::Filter)
            .greater_than("age", n("1"))
            .less_than("age", n("9"));
        assert_eq!(expression.expression(), "#FE_age > :FE_age AND #FE_age < :FE_age_1");
        let input = expression.into_input();
        assert_eq!(
            input.expression_attribute_values,
            collections::HashMap::from([
                (":FE_age".to_string(), n("1")),
                (":FE_age_1".to_string(), n("9")),
            ])
        );
        assert_eq!(
            input.expression_attribute_names,
            collections::HashMap::from([("#FE_age".to_string(), "age".to_string())])
        );
    }

    #[rstest]
    #[case::dash_and_underscore(
        Expression::new(ExpressionKind::Filter)
            .equals("user-id", s("a"))
            .equals("user_id", s("b")),
        "#FE_user_id = :FE_user_id AND #FE_user_id_1 = :FE_user_id_1",
        &[("#FE_user_id", "user-id"), ("#FE_user_id_1", "user_id")]
    )]
    #[case::repeated_names_share_placeholders(
        Expression::new(ExpressionKind::Filter)
            .equals("user-id", s("a"))
            .equals("user_id", s("a"))
            .attribute_exists("user-id")
            .attribute_exists("user_id"),
        "#FE_user_id = :FE_user_id AND #FE_user_id_1 = :FE_user_id AND attribute_exists(#FE_user_id) AND attribute_exists(#FE_user_id_1)",
        &[("#FE_user_id", "user-id"), ("#FE_user_id_1", "user_id")]
    )]
    #[case::nested_segment(
        Expression::new(ExpressionKind::Condition)
            .attribute_exists("a_b")
            .attribute_exists("a-b.c"),
        "attribute_exists(#CE_a_b) AND attribute_exists(#CE_a_b_1.#CE_c)",
        &[("#CE_a_b", "a_b"), ("#CE_a_b_1", "a-b"), ("#CE_c", "c")]
    )]
    fn test_names_with_same_sanitized_form(
        #[case] expression: Expression,
        #[case] expected: &str,
        #[case] names: &[(&str, &str)],
    ) {
        assert_eq!(expression.expression(), expected);
        assert_eq!(
            expression.into_input().expression_attribute_names,
            names
                .iter()
                .map(|(placeholder, name)| (placeholder.to_string(), name.to_string()))
                .collect::<collections::HashMap<_, _>>()
        );
    }
}
