use crate::{
    common::Item,
    error::{Error, Result},
    schema::{self, attribute, table, template::KeyTemplate},
};

use aws_sdk_dynamodb::types;
use indexmap::IndexMap;
use serde::{Serialize, de::DeserializeOwned};

/// Rust type stored as an entity.
///
/// ```rust
/// use dynamodb_odm::schema::{
///     attribute::{AttributeDeclaration, ScalarType},
///     entity::{Entity, EntityDeclaration, PrimaryKeyDeclaration},
/// };
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize, Serialize)]
/// struct User {
///     id: String,
/// }
///
/// impl Entity for User {
///     const NAME: &'static str = "user";
///
///     fn declaration() -> EntityDeclaration {
///         EntityDeclaration::new(
///             Self::NAME,
///             PrimaryKeyDeclaration::composite("USER#{{id}}", "USER#{{id}}"),
///         )
///         .attribute(AttributeDeclaration::new("id", ScalarType::String))
///     }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Physical name, unique within a connection.
    const NAME: &'static str;

    /// Declaration of the entity, named [`Entity::NAME`].
    fn declaration() -> EntityDeclaration;
}

/// Templates of a primary key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrimaryKeyDeclaration {
    /// Partition key template.
    pub partition_key: KeyTemplate,
    /// Sort key template, for composite keys.
    pub sort_key: Option<KeyTemplate>,
}

impl PrimaryKeyDeclaration {
    /// Simple primary key.
    pub fn simple(partition_key: impl Into<KeyTemplate>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    /// Composite primary key.
    pub fn composite(
        partition_key: impl Into<KeyTemplate>,
        sort_key: impl Into<KeyTemplate>,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }
}

/// Templates of a secondary index.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexDeclaration {
    /// Index type, must match the table.
    pub index_type: table::IndexType,
    /// Partition key template, global indexes only.
    pub partition_key: Option<KeyTemplate>,
    /// Sort key template.
    pub sort_key: KeyTemplate,
    /// Whether missing inputs drop the index attributes instead of failing.
    pub is_sparse: bool,
}

impl IndexDeclaration {
    /// Sparse global index.
    pub fn global(partition_key: impl Into<KeyTemplate>, sort_key: impl Into<KeyTemplate>) -> Self {
        Self {
            index_type: table::IndexType::Global,
            partition_key: Some(partition_key.into()),
            sort_key: sort_key.into(),
            is_sparse: true,
        }
    }

    /// Sparse local index.
    pub fn local(sort_key: impl Into<KeyTemplate>) -> Self {
        Self {
            index_type: table::IndexType::Local,
            partition_key: None,
            sort_key: sort_key.into(),
            is_sparse: true,
        }
    }

    /// Fail instead of dropping the index when inputs are missing.
    pub fn not_sparse(mut self) -> Self {
        self.is_sparse = false;
        self
    }
}

/// Declaration of an entity, consumed by [`EntitySchema::build`].
#[derive(Clone, Debug)]
pub struct EntityDeclaration {
    /// Physical name.
    pub name: String,
    /// Primary key templates.
    pub primary_key: PrimaryKeyDeclaration,
    /// Secondary index templates by index name.
    pub indexes: IndexMap<String, IndexDeclaration>,
    /// Attributes in declaration order.
    pub attributes: Vec<attribute::AttributeDeclaration>,
    /// Attribute holding the schema version.
    pub schema_version_attribute: Option<String>,
}

impl EntityDeclaration {
    /// Entity without indexes nor attributes.
    pub fn new(name: impl Into<String>, primary_key: PrimaryKeyDeclaration) -> Self {
        Self {
            name: name.into(),
            primary_key,
            indexes: IndexMap::new(),
            attributes: Vec::new(),
            schema_version_attribute: None,
        }
    }

    /// Add an attribute.
    pub fn attribute(mut self, attribute: attribute::AttributeDeclaration) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Populate the table index `name`.
    pub fn index(mut self, name: impl Into<String>, index: IndexDeclaration) -> Self {
        self.indexes.insert(name.into(), index);
        self
    }

    /// Name the schema version attribute.
    pub fn schema_version_attribute(mut self, name: impl Into<String>) -> Self {
        self.schema_version_attribute = Some(name.into());
        self
    }
}

/// Immutable, validated schema of an entity.
#[derive(Clone, Debug)]
pub struct EntitySchema {
    /// Physical name.
    pub name: String,
    /// Primary key resolution.
    pub primary_key: schema::KeySchema,
    /// Index resolution by index name.
    pub indexes: IndexMap<String, schema::IndexSchema>,
    /// Attributes in declaration order.
    pub attributes: Vec<attribute::AttributeMetadata>,
    /// Attributes written on every item of the entity.
    pub internal_attributes: Item,
    /// Attribute holding the schema version.
    pub schema_version_attribute: Option<String>,
}

fn primary_key_attributes(
    entity: &str,
    table: &table::Table,
    primary_key: PrimaryKeyDeclaration,
) -> Result<Vec<(String, KeyTemplate)>> {
    let mismatch = |reason: &str| Error::PrimaryKeyMismatch {
        entity: entity.to_string(),
        table: table.name.clone(),
        reason: reason.to_string(),
    };
    match (&table.sort_key, primary_key.sort_key) {
        (Some(sort_key), Some(sort_key_template)) => Ok(vec![
            (table.partition_key.clone(), primary_key.partition_key),
            (sort_key.clone(), sort_key_template),
        ]),
        (None, None) => Ok(vec![(table.partition_key.clone(), primary_key.partition_key)]),
        (Some(_), None) => Err(mismatch(
            "the table uses a composite key but a simple key was declared",
        )),
        (None, Some(_)) => Err(mismatch(
            "a composite key was declared but the table has no sort key",
        )),
    }
}

fn check_references(
    entity: &str,
    key: &schema::KeySchema,
    declared: &[&str],
) -> Result<()> {
    for attribute in key.interpolations.values().flatten() {
        if !declared.contains(&attribute.as_str()) {
            return Err(Error::NoSuchAttribute {
                entity: entity.to_string(),
                attribute: attribute.clone(),
            });
        }
    }
    Ok(())
}

fn index_schema(
    entity: &str,
    table: &table::Table,
    name: &str,
    declaration: IndexDeclaration,
) -> Result<schema::IndexSchema> {
    let definition = table.indexes.get(name).ok_or_else(|| Error::NoSuchIndex {
        table: table.name.clone(),
        index: name.to_string(),
    })?;
    if definition.index_type() != declaration.index_type {
        return Err(Error::IndexTypeMismatch {
            index: name.to_string(),
            declared: declaration.index_type.to_string(),
            defined: definition.index_type().to_string(),
        });
    }
    let attributes = match (definition, declaration.partition_key) {
        (
            table::IndexDefinition::Global {
                partition_key,
                sort_key,
            },
            Some(partition_key_template),
        ) => vec![
            (partition_key.clone(), partition_key_template),
            (sort_key.clone(), declaration.sort_key),
        ],
        (table::IndexDefinition::Global { .. }, None) => {
            return Err(Error::IndexTypeMismatch {
                index: format!("{name} of {entity}"),
                declared: "an index without partition key".to_string(),
                defined: table::IndexType::Global.to_string(),
            });
        }
        (table::IndexDefinition::Local { sort_key }, _) => {
            vec![(sort_key.clone(), declaration.sort_key)]
        }
    };
    Ok(schema::IndexSchema {
        index_type: declaration.index_type,
        is_sparse: declaration.is_sparse,
        key: schema::KeySchema::new(attributes),
    })
}

fn unique_key_schema(
    entity: &str,
    table: &table::Table,
    attribute: &str,
    unique: attribute::UniqueConstraint,
) -> Result<schema::KeySchema> {
    let declaration = match unique {
        attribute::UniqueConstraint::Generated => {
            let template = format!(
                "DRM_GEN_{}.{}#{{{{{attribute}}}}}",
                entity.to_uppercase(),
                attribute.to_uppercase()
            );
            PrimaryKeyDeclaration {
                partition_key: KeyTemplate::from(template.as_str()),
                sort_key: table
                    .sort_key
                    .as_ref()
                    .map(|_| KeyTemplate::from(template.as_str())),
            }
        }
        attribute::UniqueConstraint::Key(declaration) => declaration,
    };
    let key = schema::KeySchema::new(primary_key_attributes(entity, table, declaration)?);
    check_references(entity, &key, &[attribute])?;
    Ok(key)
}

impl EntitySchema {
    /// Validate `declaration` against `table` and build its schema.
    pub fn build(table: &table::Table, declaration: EntityDeclaration) -> Result<Self> {
        let entity = declaration.name.as_str();
        for attribute in &declaration.attributes {
            if schema::RESERVED_ATTRIBUTE_NAMES.contains(&attribute.name.as_str()) {
                return Err(Error::ReservedAttributeName(attribute.name.clone()));
            }
        }
        let declared: Vec<&str> = declaration
            .attributes
            .iter()
            .map(|attribute| attribute.name.as_str())
            .collect();

        let primary_key = schema::KeySchema::new(primary_key_attributes(
            entity,
            table,
            declaration.primary_key.clone(),
        )?);
        check_references(entity, &primary_key, &declared)?;

        let mut indexes = IndexMap::with_capacity(declaration.indexes.len());
        for (name, index) in declaration.indexes.clone() {
            let index = index_schema(entity, table, &name, index)?;
            check_references(entity, &index.key, &declared)?;
            indexes.insert(name, index);
        }

        let mut attributes = Vec::with_capacity(declaration.attributes.len());
        for attribute in declaration.attributes.iter().cloned() {
            let is_primary_key_attribute = primary_key.uses(&attribute.name);
            if is_primary_key_attribute && attribute.auto_update.is_some() {
                return Err(Error::AutoUpdatePrimaryKeyAttribute(attribute.name));
            }
            let unique = match attribute.unique {
                Some(unique) if !is_primary_key_attribute => Some(unique_key_schema(
                    entity,
                    table,
                    &attribute.name,
                    unique,
                )?),
                _ => None,
            };
            attributes.push(attribute::AttributeMetadata {
                name: attribute.name,
                scalar_type: attribute.scalar_type,
                default: attribute.default,
                auto_generate: attribute.auto_generate,
                auto_update: attribute.auto_update,
                unique,
                transform: attribute.transform,
                hidden: attribute.hidden,
            });
        }

        let internal_attributes = Item::from([(
            schema::INTERNAL_ENTITY_ATTRIBUTE.to_string(),
            types::AttributeValue::S(declaration.name.clone()),
        )]);
        Ok(Self {
            name: declaration.name,
            primary_key,
            indexes,
            attributes,
            internal_attributes,
            schema_version_attribute: declaration.schema_version_attribute,
        })
    }

    /// Metadata of `name`.
    pub fn attribute(&self, name: &str) -> Option<&attribute::AttributeMetadata> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name == name)
    }

    /// Attributes carrying a uniqueness constraint, with their shadow key.
    pub fn unique_attributes(
        &self,
    ) -> impl Iterator<Item = (&attribute::AttributeMetadata, &schema::KeySchema)> {
        self.attributes
            .iter()
            .filter_map(|attribute| Some((attribute, attribute.unique.as_ref()?)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::attribute::{AttributeDeclaration, ScalarType, UniqueConstraint};

    use rstest::rstest;

    pub(crate) fn table() -> table::Table {
        table::Table::new("test-table", "PK")
            .with_sort_key("SK")
            .with_index("GSI1", table::IndexDefinition::global("GSI1PK", "GSI1SK"))
            .with_index("LSI1", table::IndexDefinition::local("LSI1SK"))
    }

    pub(crate) fn user_declaration() -> EntityDeclaration {
        EntityDeclaration::new(
            "user",
            PrimaryKeyDeclaration::composite("USER#{{id}}", "USER#{{id}}"),
        )
        .attribute(AttributeDeclaration::new("id", ScalarType::String))
        .attribute(AttributeDeclaration::new("name", ScalarType::String))
        .attribute(AttributeDeclaration::new("status", ScalarType::String))
        .attribute(AttributeDeclaration::new("age", ScalarType::Number))
        .attribute(AttributeDeclaration::new("addresses", ScalarType::List))
        .index(
            "GSI1",
            IndexDeclaration::global("USER#STATUS#{{status}}", "USER#{{name}}").not_sparse(),
        )
    }

    pub(crate) fn user_unique_email_declaration() -> EntityDeclaration {
        EntityDeclaration::new(
            "user-unique-email",
            PrimaryKeyDeclaration::composite("USER#{{id}}", "USER#{{id}}"),
        )
        .attribute(AttributeDeclaration::new("id", ScalarType::String))
        .attribute(AttributeDeclaration::new("name", ScalarType::String))
        .attribute(AttributeDeclaration::new("status", ScalarType::String))
        .attribute(
            AttributeDeclaration::new("email", ScalarType::String)
                .unique(UniqueConstraint::Generated),
        )
        .index(
            "GSI1",
            IndexDeclaration::global("USER#STATUS#{{status}}", "USER#{{name}}"),
        )
    }

    #[test]
    fn test_build_user() {
        let schema = EntitySchema::build(&table(), user_declaration()).unwrap();
        assert_eq!(
            schema.primary_key.interpolations,
            IndexMap::from([
                ("PK".to_string(), vec!["id".to_string()]),
                ("SK".to_string(), vec!["id".to_string()]),
            ])
        );
        let index = &schema.indexes["GSI1"];
        assert!(!index.is_sparse);
        assert_eq!(
            index.key.interpolations,
            IndexMap::from([
                ("GSI1PK".to_string(), vec!["status".to_string()]),
                ("GSI1SK".to_string(), vec!["name".to_string()]),
            ])
        );
        assert_eq!(
            schema.internal_attributes,
            Item::from([(
                "__en".to_string(),
                types::AttributeValue::S("user".to_string())
            )])
        );
    }

    #[test]
    fn test_build_generated_unique_key() {
        let schema = EntitySchema::build(&table(), user_unique_email_declaration()).unwrap();
        let unique: Vec<_> = schema.unique_attributes().collect();
        assert_eq!(unique.len(), 1);
        let (attribute, key) = unique[0];
        assert_eq!(attribute.name, "email");
        let template = KeyTemplate::from("DRM_GEN_USER-UNIQUE-EMAIL.EMAIL#{{email}}");
        assert_eq!(
            key.attributes,
            IndexMap::from([
                ("PK".to_string(), template.clone()),
                ("SK".to_string(), template),
            ])
        );
        assert!(schema.indexes["GSI1"].is_sparse);
    }

    #[test]
    fn test_build_local_index_only_gets_sort_key() {
        let declaration =
            user_declaration().index("LSI1", IndexDeclaration::local("USER#AGE#{{age}}"));
        let schema = EntitySchema::build(&table(), declaration).unwrap();
        assert_eq!(
            schema.indexes["LSI1"].key.attributes.keys().collect::<Vec<_>>(),
            vec!["LSI1SK"]
        );
    }

    #[test]
    fn test_build_ignores_unique_primary_key_attribute() {
        let declaration = EntityDeclaration::new(
            "user",
            PrimaryKeyDeclaration::composite("USER#{{id}}", "USER#{{id}}"),
        )
        .attribute(
            AttributeDeclaration::new("id", ScalarType::String).unique(UniqueConstraint::Generated),
        );
        let schema = EntitySchema::build(&table(), declaration).unwrap();
        assert_eq!(schema.unique_attributes().count(), 0);
    }

    #[rstest]
    #[case::simple_key_on_composite_table(
        EntityDeclaration::new("user", PrimaryKeyDeclaration::simple("USER#{{id}}"))
            .attribute(AttributeDeclaration::new("id", ScalarType::String)),
        "PrimaryKeyMismatch"
    )]
    #[case::missing_attribute(
        EntityDeclaration::new(
            "user",
            PrimaryKeyDeclaration::composite("USER#{{id}}", "USER#{{name}}")
        )
        .attribute(AttributeDeclaration::new("id", ScalarType::String)),
        "NoSuchAttribute"
    )]
    #[case::unknown_index(
        user_declaration().index("GSI9", IndexDeclaration::global("A", "B")),
        "NoSuchIndex"
    )]
    #[case::index_type_mismatch(
        user_declaration().index("LSI1", IndexDeclaration::global("A", "B")),
        "IndexTypeMismatch"
    )]
    #[case::reserved_name(
        user_declaration().attribute(AttributeDeclaration::new("__en", ScalarType::String)),
        "ReservedAttributeName"
    )]
    #[case::auto_update_primary_key(
        EntityDeclaration::new(
            "user",
            PrimaryKeyDeclaration::composite("USER#{{id}}", "USER#{{id}}")
        )
        .attribute(
            AttributeDeclaration::new("id", ScalarType::String).auto_generate(
                attribute::AutoGenerateStrategy::Uuid4,
                true
            )
        ),
        "AutoUpdatePrimaryKeyAttribute"
    )]
    #[case::unique_key_referencing_other_attribute(
        user_declaration().attribute(
            AttributeDeclaration::new("email", ScalarType::String).unique(
                UniqueConstraint::Key(PrimaryKeyDeclaration::composite("EMAIL#{{email}}", "{{name}}"))
            )
        ),
        "NoSuchAttribute"
    )]
    fn test_build_errors(#[case] declaration: EntityDeclaration, #[case] expected: &str) {
        let error = EntitySchema::build(&table(), declaration).unwrap_err();
        assert!(
            format!("{error:?}").starts_with(expected),
            "unexpected error {error:?}"
        );
    }
}
