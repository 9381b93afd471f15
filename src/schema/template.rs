//! Key templates: `{{name}}` interpolation over literal text, or an alias that copies
//! an attribute verbatim.

use aws_sdk_dynamodb::types::AttributeValue;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

use crate::Item;
use crate::error::Error;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Template used to derive a physical key attribute from logical attributes
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyTemplate {
    /// String template such as `USER#{{id}}`; always produces a string
    Template(String),
    /// Copy the named attribute verbatim, preserving its scalar type
    Alias(String),
}

impl KeyTemplate {
    /// String template
    pub fn template(template: impl Into<String>) -> Self {
        KeyTemplate::Template(template.into())
    }

    /// Alias of a logical attribute
    pub fn alias(attribute: impl Into<String>) -> Self {
        KeyTemplate::Alias(attribute.into())
    }

    /// Ordered, de-duplicated logical attribute names referenced by this template
    pub fn interpolated_names(&self) -> Vec<String> {
        match self {
            KeyTemplate::Template(template) => extract_interpolated_names(template),
            KeyTemplate::Alias(name) => vec![name.clone()],
        }
    }

    /// True for the alias form
    pub fn is_alias(&self) -> bool {
        matches!(self, KeyTemplate::Alias(_))
    }

    /// Resolve the template against logical attribute values.
    pub fn interpolate(
        &self,
        attributes: &Item,
        context: InterpolationContext,
    ) -> Result<AttributeValue, InterpolationError> {
        match self {
            KeyTemplate::Template(template) => {
                interpolate(template, attributes, context).map(AttributeValue::S)
            }
            // alias parts never trigger sparse omission
            KeyTemplate::Alias(name) => match attributes.get(name) {
                Some(AttributeValue::Null(_)) | None => Err(InterpolationError::Unresolved {
                    template: self.to_string(),
                    attribute: name.clone(),
                }),
                Some(value) if is_scalar(value) => Ok(value.clone()),
                Some(_) => Err(InterpolationError::InvalidValue {
                    attribute: name.clone(),
                }),
            },
        }
    }

    /// Recover logical attribute values from a physical key value.
    ///
    /// Returns an empty map when the value does not match the template.
    pub fn reverse(&self, physical: &AttributeValue) -> Result<HashMap<String, AttributeValue>, Error> {
        match self {
            KeyTemplate::Alias(name) => Ok(HashMap::from([(name.clone(), physical.clone())])),
            KeyTemplate::Template(template) => {
                let AttributeValue::S(physical) = physical else {
                    return Ok(HashMap::new());
                };
                let names = extract_interpolated_names(template);
                Ok(reverse_match(template, physical, &names)?
                    .into_iter()
                    .map(|(name, value)| (name, AttributeValue::S(value)))
                    .collect())
            }
        }
    }
}

impl From<&str> for KeyTemplate {
    fn from(template: &str) -> Self {
        KeyTemplate::Template(template.to_string())
    }
}

impl From<String> for KeyTemplate {
    fn from(template: String) -> Self {
        KeyTemplate::Template(template)
    }
}

impl fmt::Display for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyTemplate::Template(template) => f.write_str(template),
            KeyTemplate::Alias(name) => write!(f, "{{alias: {name}}}"),
        }
    }
}

/// How unresolved values are reported
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterpolationContext {
    /// Missing values are errors
    Strict,
    /// Missing values signal that the index should be left out of the item
    SparseIndex,
}

/// Failure to interpolate a key template
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InterpolationError {
    /// Referenced attribute has no value
    #[error("unable to resolve \"{template}\": attribute \"{attribute}\" has no value")]
    Unresolved {
        /// Template being interpolated
        template: String,
        /// Attribute without value
        attribute: String,
    },
    /// Referenced attribute has no value while writing a sparse index
    #[error("sparse index skipped, attribute \"{attribute}\" has no value")]
    SparseIndexSkip {
        /// Attribute without value
        attribute: String,
    },
    /// Referenced attribute value can not be rendered into a key
    #[error("attribute \"{attribute}\" is not a string, number or boolean")]
    InvalidValue {
        /// Attribute name
        attribute: String,
    },
}

impl From<InterpolationError> for Error {
    fn from(e: InterpolationError) -> Self {
        match e {
            InterpolationError::Unresolved {
                template,
                attribute,
            } => Error::UnresolvedInterpolation {
                template,
                attribute,
            },
            InterpolationError::SparseIndexSkip { attribute } => Error::UnresolvedInterpolation {
                template: String::new(),
                attribute,
            },
            InterpolationError::InvalidValue { attribute } => {
                Error::InvalidKeyAttributeValue { attribute }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn segments(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Literal(&rest[..start]));
        }
        segments.push(Segment::Placeholder(after_open[..end].trim()));
        rest = &after_open[end + CLOSE.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

/// Names referenced by `{{name}}` placeholders, in order of first appearance
pub fn extract_interpolated_names(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for segment in segments(template) {
        if let Segment::Placeholder(name) = segment {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Replace every `{{name}}` with the string form of `attributes[name]`
pub fn interpolate(
    template: &str,
    attributes: &Item,
    context: InterpolationContext,
) -> Result<String, InterpolationError> {
    let mut output = String::with_capacity(template.len());
    for segment in segments(template) {
        match segment {
            Segment::Literal(text) => output.push_str(text),
            Segment::Placeholder(name) => match attributes.get(name) {
                Some(AttributeValue::Null(_)) | None => {
                    return Err(match context {
                        InterpolationContext::Strict => InterpolationError::Unresolved {
                            template: template.to_string(),
                            attribute: name.to_string(),
                        },
                        InterpolationContext::SparseIndex => InterpolationError::SparseIndexSkip {
                            attribute: name.to_string(),
                        },
                    });
                }
                Some(value) => {
                    let rendered =
                        scalar_to_string(value).ok_or_else(|| InterpolationError::InvalidValue {
                            attribute: name.to_string(),
                        })?;
                    output.push_str(&rendered);
                }
            },
        }
    }
    Ok(output)
}

/// Match `physical` against `template` and return the raw captured values for `names`.
///
/// The pattern is anchored at the start of the value. A value that does not match
/// yields an empty map.
pub fn reverse_match(
    template: &str,
    physical: &str,
    names: &[String],
) -> Result<HashMap<String, String>, Error> {
    let segments = segments(template);
    let mut pattern = String::from("^");
    let mut captured: Vec<&str> = Vec::new();

    for (position, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
            Segment::Placeholder(name) => {
                if position + 1 == segments.len() {
                    pattern.push_str("(.*)");
                } else {
                    pattern.push_str("(.*?)");
                }
                captured.push(name);
            }
        }
    }

    let regex = Regex::new(&pattern)?;
    let Some(captures) = regex.captures(physical) else {
        return Ok(HashMap::new());
    };

    let mut values = HashMap::new();
    for (group, name) in captured.iter().enumerate() {
        if !names.iter().any(|n| n == name) || values.contains_key(*name) {
            continue;
        }
        if let Some(value) = captures.get(group + 1) {
            let _ = values.insert(name.to_string(), value.as_str().to_string());
        }
    }
    Ok(values)
}

/// String rendering used inside key templates
pub(crate) fn scalar_to_string(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::S(s) => Some(s.clone()),
        AttributeValue::N(n) => Some(n.clone()),
        AttributeValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// String, number, boolean or binary
pub(crate) fn is_scalar(value: &AttributeValue) -> bool {
    matches!(
        value,
        AttributeValue::S(_) | AttributeValue::N(_) | AttributeValue::Bool(_) | AttributeValue::B(_)
    )
}
