//! Common utilities shared by read and write requests.
//!
//! This module provides the item representation, the compiled form of every
//! expression and the structured inputs (keys, conditions, projections) that
//! compile into it.

/// Condition and filter inputs.
pub mod condition;

/// Primary keys of stored items.
pub mod key;

/// Attribute selection for projection expressions.
pub mod selection;

use aws_sdk_dynamodb::types;
use std::collections;

/// A stored DynamoDB item, attribute name to value.
pub type Item = collections::HashMap<String, types::AttributeValue>;

fn get_expression(left: String, operator: &str, right: String) -> String {
    if left.is_empty() {
        right
    } else if right.is_empty() {
        left
    } else {
        format!("{left}{operator}{right}")
    }
}

fn is_placeholder_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrite every `#name` or `:value` token found in `renames`, in one pass.
fn rename_placeholders(
    expression: &str,
    renames: &collections::HashMap<String, String>,
) -> String {
    if renames.is_empty() {
        return expression.to_string();
    }
    let mut renamed = String::with_capacity(expression.len());
    let mut chars = expression.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '#' && c != ':' {
            renamed.push(c);
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(position, next)) = chars.peek() {
            if !is_placeholder_char(next) {
                break;
            }
            end = position + next.len_utf8();
            chars.next();
        }
        let token = &expression[start..end];
        renamed.push_str(renames.get(token).map_or(token, String::as_str));
    }
    renamed
}

/// Pick a new placeholder for every `incoming` placeholder bound to another
/// value in `target`. New placeholders never shadow one of `incoming`.
fn collect_renames<V: PartialEq>(
    target: &collections::HashMap<String, V>,
    incoming: &collections::HashMap<String, V>,
    renames: &mut collections::HashMap<String, String>,
) {
    let mut placeholders: Vec<_> = incoming.keys().collect();
    placeholders.sort();
    let mut taken = collections::HashSet::new();
    for placeholder in placeholders {
        let value = &incoming[placeholder];
        if target.get(placeholder).is_none_or(|existing| existing == value) {
            continue;
        }
        let mut suffix = 1;
        let renamed = loop {
            let candidate = format!("{placeholder}_{suffix}");
            if !incoming.contains_key(&candidate)
                && !taken.contains(&candidate)
                && target.get(&candidate).is_none_or(|existing| existing == value)
            {
                break candidate;
            }
            suffix += 1;
        };
        taken.insert(renamed.clone());
        renames.insert(placeholder.clone(), renamed);
    }
}

/// Compiled expression: expression string plus its placeholder maps.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExpressionInput {
    pub(crate) expression: String,
    pub(crate) expression_attribute_names: collections::HashMap<String, String>,
    pub(crate) expression_attribute_values: collections::HashMap<String, types::AttributeValue>,
}

impl ExpressionInput {
    /// The expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Name placeholders.
    pub fn expression_attribute_names(&self) -> &collections::HashMap<String, String> {
        &self.expression_attribute_names
    }

    /// Value placeholders.
    pub fn expression_attribute_values(
        &self,
    ) -> &collections::HashMap<String, types::AttributeValue> {
        &self.expression_attribute_values
    }

    /// Whether nothing was compiled.
    pub fn is_empty(&self) -> bool {
        self.expression.is_empty()
    }

    /// Move the placeholders of `other` into `self` and return the expression
    /// of `other`, rewritten where one of its placeholders was already bound
    /// to something else.
    pub(crate) fn absorb(&mut self, other: Self) -> String {
        let mut renames = collections::HashMap::new();
        collect_renames(
            &self.expression_attribute_names,
            &other.expression_attribute_names,
            &mut renames,
        );
        collect_renames(
            &self.expression_attribute_values,
            &other.expression_attribute_values,
            &mut renames,
        );
        let expression = rename_placeholders(&other.expression, &renames);
        for (placeholder, name) in other.expression_attribute_names {
            let placeholder = renames.get(&placeholder).cloned().unwrap_or(placeholder);
            self.expression_attribute_names.insert(placeholder, name);
        }
        for (placeholder, value) in other.expression_attribute_values {
            let placeholder = renames.get(&placeholder).cloned().unwrap_or(placeholder);
            self.expression_attribute_values.insert(placeholder, value);
        }
        expression
    }

    /// Join non empty items with `operator`, wrapping each one in parens when
    /// more than one remains.
    pub(crate) fn merge(operator: &str, items: Vec<Self>) -> Self {
        let items: Vec<_> = items.into_iter().filter(|item| !item.is_empty()).collect();
        let wrap = items.len() > 1;
        let mut operation = Self::default();
        for item in items {
            let expression = operation.absorb(item);
            let expression = if wrap {
                format!("({expression})")
            } else {
                expression
            };
            operation.expression = get_expression(operation.expression, operator, expression);
        }
        operation
    }

    /// Join items with `separator` without wrapping, as update actions and
    /// projections are.
    #[allow(dead_code)]
    pub(crate) fn join(separator: &str, items: Vec<Self>) -> Self {
        let mut operation = Self::default();
        for item in items {
            let expression = operation.absorb(item);
            operation.expression = get_expression(operation.expression, separator, expression);
        }
        operation
    }

    pub(crate) fn merge_into(
        self,
        names: &mut Option<collections::HashMap<String, String>>,
        values: &mut Option<collections::HashMap<String, types::AttributeValue>>,
    ) -> String {
        let mut existing = Self {
            expression: String::new(),
            expression_attribute_names: names.take().unwrap_or_default(),
            expression_attribute_values: values.take().unwrap_or_default(),
        };
        let expression = existing.absorb(self);
        if !existing.expression_attribute_names.is_empty() {
            *names = Some(existing.expression_attribute_names);
        }
        if !existing.expression_attribute_values.is_empty() {
            *values = Some(existing.expression_attribute_values);
        }
        expression
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn input(expression: &str, names: &[(&str, &str)], values: &[(&str, &str)]) -> ExpressionInput {
        ExpressionInput {
            expression: expression.to_string(),
            expression_attribute_names: names
                .iter()
                .map(|(placeholder, name)| (placeholder.to_string(), name.to_string()))
                .collect(),
            expression_attribute_values: values
                .iter()
                .map(|(placeholder, value)| {
                    (
                        placeholder.to_string(),
                        types::AttributeValue::S(value.to_string()),
                    )
                })
                .collect(),
        }
    }

    #[rstest]
    #[case::single_is_not_wrapped(
        vec![
            input("#FE_a = :FE_a", &[("#FE_a", "a")], &[(":FE_a", "1")]),
        ],
        input("#FE_a = :FE_a", &[("#FE_a", "a")], &[(":FE_a", "1")])
    )]
    #[case::empty_items_are_skipped(
        vec![
            ExpressionInput::default(),
            input("#FE_a = :FE_a", &[("#FE_a", "a")], &[(":FE_a", "1")]),
        ],
        input("#FE_a = :FE_a", &[("#FE_a", "a")], &[(":FE_a", "1")])
    )]
    #[case::colliding_values_are_renamed(
        vec![
            input("#FE_a > :FE_a", &[("#FE_a", "a")], &[(":FE_a", "1")]),
            input("#FE_a < :FE_a", &[("#FE_a", "a")], &[(":FE_a", "9")]),
        ],
        input(
            "(#FE_a > :FE_a) AND (#FE_a < :FE_a_1)",
            &[("#FE_a", "a")],
            &[(":FE_a", "1"), (":FE_a_1", "9")]
        )
    )]
    #[case::rename_respects_longer_placeholders(
        vec![
            input("#FE_a = :FE_a", &[("#FE_a", "a")], &[(":FE_a", "1")]),
            input(
                "#FE_a BETWEEN :FE_a_start AND :FE_a_end OR #FE_a = :FE_a",
                &[("#FE_a", "a")],
                &[(":FE_a_start", "2"), (":FE_a_end", "3"), (":FE_a", "4")]
            ),
        ],
        input(
            "(#FE_a = :FE_a) AND (#FE_a BETWEEN :FE_a_start AND :FE_a_end OR #FE_a = :FE_a_1)",
            &[("#FE_a", "a")],
            &[(":FE_a", "1"), (":FE_a_start", "2"), (":FE_a_end", "3"), (":FE_a_1", "4")]
        )
    )]
    #[case::renamed_value_skips_incoming_suffixes(
        vec![
            input("#CE_age = :CE_age", &[("#CE_age", "age")], &[(":CE_age", "1")]),
            input(
                "(#CE_age > :CE_age) AND (#CE_age < :CE_age_1)",
                &[("#CE_age", "age")],
                &[(":CE_age", "2"), (":CE_age_1", "3")]
            ),
        ],
        input(
            "(#CE_age = :CE_age) AND ((#CE_age > :CE_age_2) AND (#CE_age < :CE_age_1))",
            &[("#CE_age", "age")],
            &[(":CE_age", "1"), (":CE_age_2", "2"), (":CE_age_1", "3")]
        )
    )]
    #[case::colliding_names_are_renamed(
        vec![
            input("#FE_user_id = :FE_user_id", &[("#FE_user_id", "user-id")], &[(":FE_user_id", "a")]),
            input("#FE_user_id = :FE_user_id", &[("#FE_user_id", "user_id")], &[(":FE_user_id", "b")]),
        ],
        input(
            "(#FE_user_id = :FE_user_id) AND (#FE_user_id_1 = :FE_user_id_1)",
            &[("#FE_user_id", "user-id"), ("#FE_user_id_1", "user_id")],
            &[(":FE_user_id", "a"), (":FE_user_id_1", "b")]
        )
    )]
    #[case::equal_bindings_are_shared(
        vec![
            input("#FE_a = :FE_a", &[("#FE_a", "a")], &[(":FE_a", "1")]),
            input("#FE_a <> :FE_a_1", &[("#FE_a", "a")], &[(":FE_a_1", "1")]),
        ],
        input(
            "(#FE_a = :FE_a) AND (#FE_a <> :FE_a_1)",
            &[("#FE_a", "a")],
            &[(":FE_a", "1"), (":FE_a_1", "1")]
        )
    )]
    fn test_merge(#[case] items: Vec<ExpressionInput>, #[case] expected: ExpressionInput) {
        for _ in 0..50 {
            assert_eq!(ExpressionInput::merge(" AND ", items.clone()), expected);
        }
    }

    #[test]
    fn test_rename_placeholders_in_one_pass() {
        let renames = collections::HashMap::from([
            (":FE_a".to_string(), ":FE_a_1".to_string()),
            (":FE_a_1".to_string(), ":FE_a_2".to_string()),
        ]);
        assert_eq!(
            rename_placeholders("#FE_a BETWEEN :FE_a AND :FE_a_1 OR size(#FE_a) > :FE_a_start", &renames),
            "#FE_a BETWEEN :FE_a_1 AND :FE_a_2 OR size(#FE_a) > :FE_a_start"
        );
    }

    #[test]
    fn test_merge_into_keeps_missing_maps_empty() {
        let mut names = None;
        let mut values = None;
        let expression = input("#PE_a", &[("#PE_a", "a")], &[]).merge_into(&mut names, &mut values);
        assert_eq!(expression, "#PE_a");
        assert_eq!(
            names,
            Some(collections::HashMap::from([(
                "#PE_a".to_string(),
                "a".to_string()
            )]))
        );
        assert_eq!(values, None);
    }
}
