use indexmap::IndexMap;
use std::fmt;

/// Secondary index type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IndexType {
    /// Global secondary index, with its own partition and sort key.
    Global,
    /// Local secondary index, sharing the table partition key.
    Local,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("GLOBAL"),
            Self::Local => f.write_str("LOCAL"),
        }
    }
}

/// Secondary index defined on a table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IndexDefinition {
    /// Global secondary index.
    Global {
        /// Partition key attribute name.
        partition_key: String,
        /// Sort key attribute name.
        sort_key: String,
    },
    /// Local secondary index.
    Local {
        /// Sort key attribute name.
        sort_key: String,
    },
}

impl IndexDefinition {
    /// Global index keyed by `partition_key` and `sort_key`.
    pub fn global(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self::Global {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// Local index sorted by `sort_key`.
    pub fn local(sort_key: impl Into<String>) -> Self {
        Self::Local {
            sort_key: sort_key.into(),
        }
    }

    /// Type of the index.
    pub fn index_type(&self) -> IndexType {
        match self {
            Self::Global { .. } => IndexType::Global,
            Self::Local { .. } => IndexType::Local,
        }
    }

    /// Sort key attribute name.
    pub fn sort_key(&self) -> &str {
        match self {
            Self::Global { sort_key, .. } | Self::Local { sort_key } => sort_key,
        }
    }
}

/// DynamoDB table layout.
///
/// ```rust
/// use dynamodb_odm::schema::table::{IndexDefinition, Table};
///
/// let table = Table::new("test-table", "PK")
///     .with_sort_key("SK")
///     .with_index("GSI1", IndexDefinition::global("GSI1PK", "GSI1SK"))
///     .with_index("LSI1", IndexDefinition::local("LSI1SK"));
/// assert!(table.uses_composite_key());
/// assert_eq!(table.index_partition_key("LSI1"), Some("PK"));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Partition key attribute name.
    pub partition_key: String,
    /// Sort key attribute name, for composite keys.
    pub sort_key: Option<String>,
    /// Secondary indexes by name.
    pub indexes: IndexMap<String, IndexDefinition>,
}

impl Table {
    /// Table with a simple primary key.
    pub fn new(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: None,
            indexes: IndexMap::new(),
        }
    }

    /// Make the primary key composite.
    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    /// Add a secondary index.
    pub fn with_index(mut self, name: impl Into<String>, index: IndexDefinition) -> Self {
        self.indexes.insert(name.into(), index);
        self
    }

    /// Whether the primary key has a sort key.
    pub fn uses_composite_key(&self) -> bool {
        self.sort_key.is_some()
    }

    /// Partition key attribute name of `index`, the table's own for local indexes.
    pub fn index_partition_key(&self, index: &str) -> Option<&str> {
        match self.indexes.get(index)? {
            IndexDefinition::Global { partition_key, .. } => Some(partition_key),
            IndexDefinition::Local { .. } => Some(&self.partition_key),
        }
    }

    /// Every attribute name used by the table or one of its indexes as a key.
    pub fn key_attribute_names(&self) -> Vec<&str> {
        let mut names = vec![self.partition_key.as_str()];
        names.extend(self.sort_key.as_deref());
        for index in self.indexes.values() {
            if let IndexDefinition::Global { partition_key, .. } = index {
                names.push(partition_key);
            }
            names.push(index.sort_key());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    fn table() -> Table {
        Table::new("test-table", "PK")
            .with_sort_key("SK")
            .with_index("GSI1", IndexDefinition::global("GSI1PK", "GSI1SK"))
            .with_index("LSI1", IndexDefinition::local("LSI1SK"))
    }

    #[rstest]
    #[case::global("GSI1", Some("GSI1PK"))]
    #[case::local_shares_table_key("LSI1", Some("PK"))]
    #[case::missing("GSI9", None)]
    fn test_index_partition_key(#[case] index: &str, #[case] expected: Option<&str>) {
        assert_eq!(table().index_partition_key(index), expected);
    }

    #[test]
    fn test_key_attribute_names() {
        assert_eq!(
            table().key_attribute_names(),
            vec!["PK", "SK", "GSI1PK", "GSI1SK", "LSI1SK"]
        );
    }
}
