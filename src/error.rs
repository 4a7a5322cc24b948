//! Error types returned by the mapper.

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reason reported by DynamoDB for one item of a cancelled transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CancellationReason {
    /// Cancellation code, e.g. `ConditionalCheckFailed` or `None`.
    pub code: Option<String>,
    /// Human readable message attached to the code.
    pub message: Option<String>,
}

/// Every failure the mapper can surface.
///
/// Apart from the resubmission of unprocessed batch items, nothing is
/// retried internally: each variant reaches the caller as is.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // schema build errors
    /// Two entities registered on one connection share a physical name.
    #[error("entity name \"{0}\" is registered more than once on the connection")]
    DuplicateEntityName(String),
    /// A key template and the table disagree on simple vs composite keys.
    #[error("primary key of entity \"{entity}\" does not match table \"{table}\": {reason}")]
    PrimaryKeyMismatch {
        /// Entity physical name.
        entity: String,
        /// Table name.
        table: String,
        /// What does not match.
        reason: String,
    },
    /// An entity declares an index the table does not define.
    #[error("table \"{table}\" has no index named \"{index}\"")]
    NoSuchIndex {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },
    /// An index is declared with a type other than the one of the table.
    #[error("index \"{index}\" is declared as {declared} but the table defines it as {defined}")]
    IndexTypeMismatch {
        /// Index name.
        index: String,
        /// Type found in the entity declaration.
        declared: String,
        /// Type found on the table.
        defined: String,
    },
    /// A template references an attribute the entity does not declare.
    #[error("attribute \"{attribute}\" is referenced by entity \"{entity}\" but never declared")]
    NoSuchAttribute {
        /// Entity physical name.
        entity: String,
        /// Attribute name.
        attribute: String,
    },
    /// An attribute uses a name reserved for internal attributes.
    #[error("attribute name \"{0}\" is reserved for internal use")]
    ReservedAttributeName(String),
    /// An auto updating attribute feeds the primary key.
    #[error("attribute \"{0}\" is used in the primary key and cannot be auto updated")]
    AutoUpdatePrimaryKeyAttribute(String),

    // resolution errors
    /// A template placeholder has no value.
    #[error("\"{attribute}\" was referenced in {template} but its value could not be resolved")]
    UnresolvedInterpolation {
        /// Template being resolved.
        template: String,
        /// Missing attribute.
        attribute: String,
    },
    /// A sparse index placeholder has no value, the index attribute must be dropped.
    #[error("\"{attribute}\" was referenced in sparse index template {template} but has no value")]
    SparseIndexParse {
        /// Template being resolved.
        template: String,
        /// Missing attribute.
        attribute: String,
    },
    /// A placeholder resolved to a value that cannot be written into a string key.
    #[error("\"{attribute}\" cannot be interpolated into a key: only strings, numbers and booleans are supported")]
    InvalidInterpolationValue {
        /// Offending attribute.
        attribute: String,
    },
    /// An entity with unique attributes is written in a batch, which cannot
    /// carry the conditions of its shadow items.
    #[error("entity \"{0}\" has unique attributes and cannot be written in a batch")]
    BatchWriteWithUniqueAttributes(String),
    /// A unique attribute has no value on create.
    #[error("unique attribute \"{0}\" must have a value")]
    MissingUniqueAttributeValue(String),
    /// An entity type was never registered on the connection.
    #[error("no entity named \"{0}\" is registered on the connection")]
    NoSuchEntity(String),

    // planner conflict errors
    /// An attribute whose value must be known statically is updated with an expression.
    #[error("attribute \"{0}\" feeds a key or a unique constraint and cannot be updated with a dynamic value")]
    InvalidDynamicUpdateAttributeValue(String),
    /// An update touches both the primary key and unique attributes.
    #[error(
        "primary key attributes {primary_key_attributes:?} and unique attributes {unique_attributes:?} cannot be updated together"
    )]
    InvalidUniqueAttributeUpdate {
        /// Primary key attributes changed by the update.
        primary_key_attributes: Vec<String>,
        /// Unique attributes changed by the update.
        unique_attributes: Vec<String>,
    },

    // query errors
    /// Query against an index missing from the table.
    #[error("no index named \"{index}\" was found on table \"{table}\"")]
    NoSuchIndexFound {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
    },
    /// Query against an index the entity does not populate.
    #[error("entity \"{entity}\" does not declare index \"{index}\"")]
    NoSuchIndexOnEntity {
        /// Entity physical name.
        entity: String,
        /// Index name.
        index: String,
    },
    /// Sort key condition against a key without sort key.
    #[error("a sort key condition was given but \"{0}\" has no sort key")]
    SortKeyNotDefined(String),
    /// Projection requested together with count.
    #[error("a projection cannot be combined with a count query")]
    ProjectionWithCount,

    // expression input errors
    /// Malformed condition, filter or update input.
    #[error("invalid expression input: {0}")]
    InvalidExpressionInput(String),

    // limit errors
    /// A write transaction holds more items than DynamoDB accepts.
    #[error("write transaction holds {count} items, the limit is {limit}")]
    WriteTransactionItemLimitExceeded {
        /// Flattened item count.
        count: usize,
        /// Ceiling.
        limit: usize,
    },
    /// A read transaction holds more items than DynamoDB accepts.
    #[error("read transaction holds {count} items, the limit is {limit}")]
    ReadTransactionItemLimitExceeded {
        /// Item count.
        count: usize,
        /// Ceiling.
        limit: usize,
    },

    /// Batch items DynamoDB left unprocessed on every attempt.
    #[error("{count} batch items were still unprocessed after {attempts} attempts")]
    UnprocessedBatchItems {
        /// Items left unprocessed by the last attempt.
        count: usize,
        /// Requests sent for the chunk.
        attempts: usize,
    },

    /// A read transaction result is taken as another entity than the one read.
    #[error("read {index} of the transaction does not hold a \"{expected}\" entity (found {found:?})")]
    ReadTransactionItemMismatch {
        /// Position of the read.
        index: usize,
        /// Entity requested by the caller.
        expected: String,
        /// Entity read at `index`, `None` past the last read.
        found: Option<String>,
    },

    // store errors
    /// DynamoDB cancelled a transaction.
    #[error("transaction cancelled: {reasons:?}")]
    TransactionCancelled {
        /// One reason per transaction item, in submission order.
        reasons: Vec<CancellationReason>,
    },
    /// Any other failure of the document client.
    #[error(transparent)]
    Store(Box<dyn std::error::Error + Send + Sync>),
    /// Conversion between Rust values and DynamoDB items failed.
    #[error(transparent)]
    Serialization(#[from] serde_dynamo::Error),
}

impl Error {
    pub(crate) fn store<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Store(Box::new(error))
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidExpressionInput(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case::unresolved(
        Error::UnresolvedInterpolation {
            template: "USER#{{id}}".to_string(),
            attribute: "id".to_string(),
        },
        "\"id\" was referenced in USER#{{id}} but its value could not be resolved"
    )]
    #[case::limit(
        Error::WriteTransactionItemLimitExceeded {
            count: 101,
            limit: 100,
        },
        "write transaction holds 101 items, the limit is 100"
    )]
    #[case::unique_update(
        Error::InvalidUniqueAttributeUpdate {
            primary_key_attributes: vec!["id".to_string()],
            unique_attributes: vec!["email".to_string()],
        },
        "primary key attributes [\"id\"] and unique attributes [\"email\"] cannot be updated together"
    )]
    #[case::unprocessed(
        Error::UnprocessedBatchItems {
            count: 3,
            attempts: 5,
        },
        "3 batch items were still unprocessed after 5 attempts"
    )]
    fn test_error_display(#[case] error: Error, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }
}
