use crate::{
    common::Item,
    error::{Error, Result},
};

use aws_sdk_dynamodb::types;
use std::fmt;

const OPENING: &str = "{{";
const CLOSING: &str = "}}";

/// Template producing the value of one key attribute.
///
/// ```rust
/// use aws_sdk_dynamodb::types::AttributeValue;
/// use dynamodb_odm::schema::template::KeyTemplate;
/// use std::collections::HashMap;
///
/// let template = KeyTemplate::from("USER#{{id}}");
/// let attributes = HashMap::from([("id".to_string(), AttributeValue::S("1".to_string()))]);
/// assert_eq!(
///     template.resolve(&attributes, false).unwrap(),
///     AttributeValue::S("USER#1".to_string())
/// );
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum KeyTemplate {
    /// Literal text with zero or more `{{attr}}` placeholders, always a string.
    Interpolated(String),
    /// The value of exactly one attribute, with its type preserved.
    Alias(String),
}

impl From<&str> for KeyTemplate {
    fn from(template: &str) -> Self {
        Self::Interpolated(template.to_string())
    }
}

impl From<String> for KeyTemplate {
    fn from(template: String) -> Self {
        Self::Interpolated(template)
    }
}

impl fmt::Display for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interpolated(template) => f.write_str(template),
            Self::Alias(attribute) => write!(f, "{OPENING}{attribute}{CLOSING}"),
        }
    }
}

/// Split an interpolated template into literal text and placeholder names.
fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find(OPENING) {
        let after_opening = &rest[start + OPENING.len()..];
        let Some(end) = after_opening.find(CLOSING) else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        segments.push(Segment::Placeholder(after_opening[..end].trim()));
        rest = &after_opening[end + CLOSING.len()..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn missing(template: &KeyTemplate, attribute: &str, is_sparse: bool) -> Error {
    let template = template.to_string();
    let attribute = attribute.to_string();
    if is_sparse {
        Error::SparseIndexParse {
            template,
            attribute,
        }
    } else {
        Error::UnresolvedInterpolation {
            template,
            attribute,
        }
    }
}

impl KeyTemplate {
    /// Template aliasing `attribute`.
    pub fn alias(attribute: impl Into<String>) -> Self {
        Self::Alias(attribute.into())
    }

    /// Attributes referenced by the template, in order of first appearance.
    pub fn referenced_attribute_names(&self) -> Vec<String> {
        match self {
            Self::Alias(attribute) => vec![attribute.clone()],
            Self::Interpolated(template) => {
                let mut names: Vec<String> = Vec::new();
                for segment in segments(template) {
                    if let Segment::Placeholder(name) = segment {
                        if !names.iter().any(|existing| existing == name) {
                            names.push(name.to_string());
                        }
                    }
                }
                names
            }
        }
    }

    /// Resolve the template against `attributes`.
    ///
    /// A missing attribute fails with [`Error::SparseIndexParse`] when
    /// `is_sparse` holds, [`Error::UnresolvedInterpolation`] otherwise.
    pub fn resolve(&self, attributes: &Item, is_sparse: bool) -> Result<types::AttributeValue> {
        match self {
            Self::Alias(attribute) => match attributes.get(attribute) {
                None | Some(types::AttributeValue::Null(_)) => {
                    Err(missing(self, attribute, is_sparse))
                }
                Some(value) => Ok(value.clone()),
            },
            Self::Interpolated(template) => {
                let mut resolved = String::with_capacity(template.len());
                for segment in segments(template) {
                    match segment {
                        Segment::Literal(text) => resolved.push_str(text),
                        Segment::Placeholder(name) => {
                            let text = match attributes.get(name) {
                                None | Some(types::AttributeValue::Null(_)) => {
                                    return Err(missing(self, name, is_sparse));
                                }
                                Some(types::AttributeValue::S(text)) => text.clone(),
                                Some(types::AttributeValue::N(number)) => number.clone(),
                                Some(types::AttributeValue::Bool(flag)) => flag.to_string(),
                                Some(_) => {
                                    return Err(Error::InvalidInterpolationValue {
                                        attribute: name.to_string(),
                                    });
                                }
                            };
                            resolved.push_str(&text);
                        }
                    }
                }
                Ok(types::AttributeValue::S(resolved))
            }
        }
    }
}
