//! Entity schemas and the key templates they are built from.
//!
//! Schemas are built once per connection from plain declarations and are
//! immutable afterwards.

/// Attribute declarations and metadata.
pub mod attribute;

/// Entity declarations and the schema builder.
pub mod entity;

/// Table layout.
pub mod table;

/// Key template parsing and resolution.
pub mod template;

use crate::{common::Item, error::Result};

use indexmap::IndexMap;

/// Attribute holding the entity physical name on every stored item.
pub const INTERNAL_ENTITY_ATTRIBUTE: &str = "__en";

/// Attribute names reserved for internal use.
pub const RESERVED_ATTRIBUTE_NAMES: &[&str] = &[INTERNAL_ENTITY_ATTRIBUTE];

/// How the attributes of one key are resolved.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeySchema {
    /// Table attribute name to the template producing it.
    pub attributes: IndexMap<String, template::KeyTemplate>,
    /// Table attribute name to the source attributes its template references.
    pub interpolations: IndexMap<String, Vec<String>>,
}

impl KeySchema {
    pub(crate) fn new(attributes: Vec<(String, template::KeyTemplate)>) -> Self {
        let interpolations = attributes
            .iter()
            .map(|(name, template)| (name.clone(), template.referenced_attribute_names()))
            .collect();
        Self {
            attributes: attributes.into_iter().collect(),
            interpolations,
        }
    }

    /// Resolve every key attribute from `attributes`.
    pub fn resolve(&self, attributes: &Item, is_sparse: bool) -> Result<Item> {
        self.attributes
            .iter()
            .map(|(name, template)| Ok((name.clone(), template.resolve(attributes, is_sparse)?)))
            .collect()
    }

    /// Whether the template of `key_attribute` references `attribute`.
    pub fn references(&self, key_attribute: &str, attribute: &str) -> bool {
        self.interpolations
            .get(key_attribute)
            .is_some_and(|names| names.iter().any(|name| name == attribute))
    }

    /// Whether any template references `attribute`.
    pub fn uses(&self, attribute: &str) -> bool {
        self.interpolations
            .values()
            .flatten()
            .any(|name| name == attribute)
    }
}

/// How the attributes of one secondary index are resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexSchema {
    /// Index type, matching the table.
    pub index_type: table::IndexType,
    /// Whether missing inputs drop the index attribute instead of failing.
    pub is_sparse: bool,
    /// Key attributes of the index.
    pub key: KeySchema,
}
