use crate::{common::Item, schema};

use aws_sdk_dynamodb::types;
use std::{fmt, sync::Arc};

/// Scalar type tag of an attribute, as DynamoDB names it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ScalarType {
    /// `S`
    String,
    /// `N`
    Number,
    /// `BOOL`
    Boolean,
    /// `B`
    Binary,
    /// `L`
    List,
    /// `M`
    Map,
    /// `SS`
    StringSet,
    /// `NS`
    NumberSet,
    /// `BS`
    BinarySet,
    /// `NULL`
    Null,
}

impl ScalarType {
    /// DynamoDB type descriptor, as used by `attribute_type`.
    pub fn descriptor(self) -> &'static str {
        match self {
            Self::String => "S",
            Self::Number => "N",
            Self::Boolean => "BOOL",
            Self::Binary => "B",
            Self::List => "L",
            Self::Map => "M",
            Self::StringSet => "SS",
            Self::NumberSet => "NS",
            Self::BinarySet => "BS",
            Self::Null => "NULL",
        }
    }
}

/// Default value of an attribute missing on create.
#[derive(Clone)]
pub enum DefaultValue {
    /// Always the same value.
    Constant(types::AttributeValue),
    /// Computed from the entity item being created.
    Provider(Arc<dyn Fn(&Item) -> types::AttributeValue + Send + Sync>),
}

impl DefaultValue {
    /// Default computed by `provider`.
    pub fn provider<F>(provider: F) -> Self
    where
        F: Fn(&Item) -> types::AttributeValue + Send + Sync + 'static,
    {
        Self::Provider(Arc::new(provider))
    }

    pub(crate) fn value(&self, item: &Item) -> types::AttributeValue {
        match self {
            Self::Constant(value) => value.clone(),
            Self::Provider(provider) => provider(item),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Provider(_) => f.write_str("Provider"),
        }
    }
}

/// Strategy generating a value for an attribute.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AutoGenerateStrategy {
    /// Random v4 UUID string.
    Uuid4,
    /// Seconds since the unix epoch, as a number.
    EpochDate,
    /// RFC 3339 timestamp string.
    IsoDate,
}

impl AutoGenerateStrategy {
    /// Produce a fresh value.
    pub fn generate(self) -> types::AttributeValue {
        match self {
            Self::Uuid4 => types::AttributeValue::S(uuid::Uuid::new_v4().to_string()),
            Self::EpochDate => types::AttributeValue::N(chrono::Utc::now().timestamp().to_string()),
            Self::IsoDate => types::AttributeValue::S(chrono::Utc::now().to_rfc3339()),
        }
    }
}

/// Value written on every update.
#[derive(Clone)]
pub struct AutoUpdate(Arc<dyn Fn() -> types::AttributeValue + Send + Sync>);

impl AutoUpdate {
    /// Auto update computed by `provider`.
    pub fn new<F>(provider: F) -> Self
    where
        F: Fn() -> types::AttributeValue + Send + Sync + 'static,
    {
        Self(Arc::new(provider))
    }

    pub(crate) fn value(&self) -> types::AttributeValue {
        (self.0)()
    }
}

impl fmt::Debug for AutoUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AutoUpdate")
    }
}

/// Transformation applied to static values before they are written.
#[derive(Clone)]
pub struct Transform(Arc<dyn Fn(types::AttributeValue) -> types::AttributeValue + Send + Sync>);

impl Transform {
    /// Transform applying `transform`.
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(types::AttributeValue) -> types::AttributeValue + Send + Sync + 'static,
    {
        Self(Arc::new(transform))
    }

    pub(crate) fn apply(&self, value: types::AttributeValue) -> types::AttributeValue {
        (self.0)(value)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform")
    }
}

/// Uniqueness constraint of an attribute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UniqueConstraint {
    /// Shadow item keyed by `DRM_GEN_<ENTITY>.<ATTR>#{{attr}}`.
    Generated,
    /// Shadow item keyed by a caller supplied key, which may only reference
    /// the attribute itself.
    Key(schema::entity::PrimaryKeyDeclaration),
}

/// Declaration of one entity attribute.
///
/// ```rust
/// use dynamodb_odm::schema::attribute::{AttributeDeclaration, ScalarType, UniqueConstraint};
///
/// let email = AttributeDeclaration::new("email", ScalarType::String)
///     .unique(UniqueConstraint::Generated);
/// ```
#[derive(Clone, Debug)]
pub struct AttributeDeclaration {
    /// Attribute name.
    pub name: String,
    /// Scalar type tag.
    pub scalar_type: ScalarType,
    /// Value used when the attribute is missing on create.
    pub default: Option<DefaultValue>,
    /// Strategy generating the value when missing on create.
    pub auto_generate: Option<AutoGenerateStrategy>,
    /// Value written on every update.
    pub auto_update: Option<AutoUpdate>,
    /// Uniqueness constraint.
    pub unique: Option<UniqueConstraint>,
    /// Transformation of static values.
    pub transform: Option<Transform>,
    /// Whether the attribute is dropped from returned entities.
    pub hidden: bool,
}

impl AttributeDeclaration {
    /// Plain attribute.
    pub fn new(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar_type,
            default: None,
            auto_generate: None,
            auto_update: None,
            unique: None,
            transform: None,
            hidden: false,
        }
    }

    /// Set the default value.
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Generate the value with `strategy` on create, and on every update
    /// when `auto_update` holds.
    pub fn auto_generate(mut self, strategy: AutoGenerateStrategy, auto_update: bool) -> Self {
        self.auto_generate = Some(strategy);
        if auto_update {
            self.auto_update = Some(AutoUpdate::new(move || strategy.generate()));
        }
        self
    }

    /// Write `auto_update` on every update.
    pub fn auto_update(mut self, auto_update: AutoUpdate) -> Self {
        self.auto_update = Some(auto_update);
        self
    }

    /// Constrain the value to be unique across the table.
    pub fn unique(mut self, unique: UniqueConstraint) -> Self {
        self.unique = Some(unique);
        self
    }

    /// Transform static values before they are written.
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Drop the attribute from returned entities.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Built attribute metadata.
#[derive(Clone, Debug)]
pub struct AttributeMetadata {
    /// Attribute name.
    pub name: String,
    /// Scalar type tag.
    pub scalar_type: ScalarType,
    /// Value used when the attribute is missing on create.
    pub default: Option<DefaultValue>,
    /// Strategy generating the value when missing on create.
    pub auto_generate: Option<AutoGenerateStrategy>,
    /// Value written on every update.
    pub auto_update: Option<AutoUpdate>,
    /// Key schema of the shadow item enforcing uniqueness.
    pub unique: Option<schema::KeySchema>,
    /// Transformation of static values.
    pub transform: Option<Transform>,
    /// Whether the attribute is dropped from returned entities.
    pub hidden: bool,
}

impl AttributeMetadata {
    /// Apply the transform, if any.
    pub(crate) fn transformed(&self, value: types::AttributeValue) -> types::AttributeValue {
        match &self.transform {
            Some(transform) => transform.apply(value),
            None => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    #[rstest]
    #[case::string(ScalarType::String, "S")]
    #[case::boolean(ScalarType::Boolean, "BOOL")]
    #[case::number_set(ScalarType::NumberSet, "NS")]
    fn test_descriptor(#[case] scalar_type: ScalarType, #[case] expected: &str) {
        assert_eq!(scalar_type.descriptor(), expected);
    }

    #[test]
    fn test_auto_generate_values() {
        assert!(matches!(
            AutoGenerateStrategy::Uuid4.generate(),
            types::AttributeValue::S(value) if value.len() == 36
        ));
        assert!(matches!(
            AutoGenerateStrategy::EpochDate.generate(),
            types::AttributeValue::N(value) if value.parse::<i64>().is_ok()
        ));
        let declaration = AttributeDeclaration::new("updatedAt", ScalarType::Number)
            .auto_generate(AutoGenerateStrategy::EpochDate, true);
        assert!(declaration.auto_update.is_some());
    }

    #[test]
    fn test_default_provider_reads_item() {
        let default = DefaultValue::provider(|item| match item.get("name") {
            Some(types::AttributeValue::S(name)) => types::AttributeValue::S(name.to_uppercase()),
            _ => types::AttributeValue::Null(true),
        });
        let item = Item::from([(
            "name".to_string(),
            types::AttributeValue::S("me".to_string()),
        )]);
        assert_eq!(
            default.value(&item),
            types::AttributeValue::S("ME".to_string())
        );
    }
}
