use crate::{common::Item, schema::table::Table};

/// Partition targeted by a query.
///
/// ```rust
/// use dynamodb_odm::common::key;
/// use serde_json::json;
///
/// // resolved through the entity key template
/// let by_attributes = key::PartitionKey::Attributes(json!({"id": "1"}));
/// // used as is
/// let by_value: key::PartitionKey<()> = key::PartitionKey::Value("USER#1".to_string());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum PartitionKey<T> {
    /// Source attributes of the partition key template.
    Attributes(T),
    /// Final partition key value.
    Value(String),
}

/// Table primary key attributes of `item`.
pub(crate) fn table_key(table: &Table, item: &Item) -> Item {
    std::iter::once(&table.partition_key)
        .chain(table.sort_key.as_ref())
        .filter_map(|name| Some((name.clone(), item.get(name)?.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use aws_sdk_dynamodb::types;
    use rstest::rstest;

    fn s(value: &str) -> types::AttributeValue {
        types::AttributeValue::S(value.to_string())
    }

    #[rstest]
    #[case::simple(
        Table::new("a", "PK"),
        Item::from([
            ("PK".to_string(), s("USER#1")),
            ("name".to_string(), s("me")),
        ]),
        Item::from([("PK".to_string(), s("USER#1"))])
    )]
    #[case::composite(
        Table::new("a", "PK").with_sort_key("SK"),
        Item::from([
            ("PK".to_string(), s("USER#1")),
            ("SK".to_string(), s("USER#1")),
            ("GSI1PK".to_string(), s("x")),
        ]),
        Item::from([
            ("PK".to_string(), s("USER#1")),
            ("SK".to_string(), s("USER#1")),
        ])
    )]
    fn test_table_key(#[case] table: Table, #[case] item: Item, #[case] expected: Item) {
        assert_eq!(table_key(&table, &item), expected);
    }
}
