use aws_sdk_dynamodb::types::AttributeValue;
use serde::de::DeserializeOwned;

use crate::Item;
use crate::error::Error;
use crate::expression::UpdateBody;
use crate::schema::{
    CompiledKey, CompiledKeyPart, ENTITY_TYPE_ATTRIBUTE, EntityMetadata, InterpolationContext,
    InterpolationError,
};

/// Physical attribute changes derived from an update
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AffectedIndexes {
    /// Index attributes to set
    pub set: Vec<(String, AttributeValue)>,
    /// Index attributes to remove
    pub remove: Vec<String>,
}

impl AffectedIndexes {
    /// True when nothing changes
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

/// Entity-shaped view of a physical item read from a table shared by several entities
#[derive(Clone, Debug, PartialEq)]
pub enum LogicalItem {
    /// Item of a registered entity, physical attributes stripped
    Known {
        /// Logical entity name
        entity: String,
        /// Logical attributes
        attributes: Item,
    },
    /// Item without a registered entity type, untouched
    Unknown(Item),
}

impl LogicalItem {
    /// Deserialize a known item
    pub fn into_entity<T: DeserializeOwned>(self) -> Result<Option<T>, Error> {
        match self {
            LogicalItem::Known { attributes, .. } => Ok(Some(serde_dynamo::from_item(attributes)?)),
            LogicalItem::Unknown(_) => Ok(None),
        }
    }
}

/// Converts between logical attributes and physical items of one entity
#[derive(Clone, Copy, Debug)]
pub struct EntityTransformer<'a> {
    metadata: &'a EntityMetadata,
}

impl<'a> EntityTransformer<'a> {
    /// Transformer for `metadata`
    pub fn new(metadata: &'a EntityMetadata) -> Self {
        Self { metadata }
    }

    /// Fill defaults and generated values for attributes the caller left unset.
    ///
    /// `Null` counts as unset; every other value, including empty strings, `0` and
    /// `false`, is kept.
    pub fn apply_defaults(&self, mut attributes: Item) -> Item {
        attributes.retain(|_, value| !matches!(value, AttributeValue::Null(_)));
        for attribute in &self.metadata.attributes {
            if attributes.contains_key(&attribute.name) {
                continue;
            }
            let value = match (&attribute.auto_generate, &attribute.default) {
                (Some(auto), _) => Some(auto.strategy.generate()),
                (None, Some(default)) => default.resolve(&attributes),
                (None, None) => None,
            };
            if let Some(value) = value {
                let _ = attributes.insert(attribute.name.clone(), value);
            }
        }
        attributes
    }

    /// Physical item for logical `attributes`: the attributes themselves, the primary
    /// key, every resolvable index and the entity type marker
    pub fn to_physical(&self, attributes: Item) -> Result<Item, Error> {
        let attributes = self.apply_defaults(attributes);
        let mut item = attributes.clone();

        for (name, value) in self.primary_key(&attributes)? {
            let _ = item.insert(name, value);
        }

        for index in &self.metadata.schema.indexes {
            let context = if index.is_sparse {
                InterpolationContext::SparseIndex
            } else {
                InterpolationContext::Strict
            };
            match resolve_parts(index.parts(), &attributes, context) {
                Ok(values) => item.extend(values),
                Err(InterpolationError::SparseIndexSkip { attribute }) => {
                    tracing::debug!(
                        entity = %self.metadata.name,
                        index = %index.name,
                        attribute = %attribute,
                        "sparse index skipped"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        let _ = item.insert(
            ENTITY_TYPE_ATTRIBUTE.to_string(),
            AttributeValue::S(self.metadata.name.clone()),
        );
        Ok(item)
    }

    /// Physical primary key, every referenced attribute is required
    pub fn primary_key(&self, attributes: &Item) -> Result<Item, Error> {
        key_item(&self.metadata.schema.primary_key, attributes)
    }

    /// Key items of the unique enforcement records of `attributes`.
    ///
    /// Every unique attribute must have a value.
    pub fn unique_records(&self, attributes: &Item) -> Result<Vec<(String, Item)>, Error> {
        let mut records = Vec::with_capacity(self.metadata.schema.uniques.len());
        for unique in &self.metadata.schema.uniques {
            match attributes.get(&unique.attribute) {
                Some(AttributeValue::Null(_)) | None => {
                    return Err(Error::MissingUniqueAttribute {
                        entity: self.metadata.name.clone(),
                        attribute: unique.attribute.clone(),
                    });
                }
                Some(_) => records.push((unique.attribute.clone(), key_item(&unique.key, attributes)?)),
            }
        }
        Ok(records)
    }

    /// Key of the enforcement record of `attribute` for `value`
    pub fn unique_record(&self, attribute: &str, value: &AttributeValue) -> Result<Option<Item>, Error> {
        let Some(unique) = self.metadata.schema.unique(attribute) else {
            return Ok(None);
        };
        let attributes = Item::from([(attribute.to_string(), value.clone())]);
        key_item(&unique.key, &attributes).map(Some)
    }

    /// Strip physical attributes and recover logical values encoded only in keys
    pub fn to_logical_attributes(&self, mut item: Item) -> Result<Item, Error> {
        let schema = &self.metadata.schema;
        let mut recovered = Item::new();
        for part in schema
            .primary_key
            .parts()
            .chain(schema.indexes.iter().flat_map(|index| index.parts()))
        {
            let Some(physical) = item.get(&part.attribute) else {
                continue;
            };
            for (name, raw) in part.template.reverse(physical)? {
                if item.contains_key(&name) || recovered.contains_key(&name) {
                    continue;
                }
                if let Some(value) = self.logical_value(&name, raw) {
                    let _ = recovered.insert(name, value);
                }
            }
        }

        for attribute in schema.physical_attributes() {
            let _ = item.remove(attribute);
        }
        let _ = item.remove(ENTITY_TYPE_ATTRIBUTE);
        for attribute in self.metadata.attributes.iter().filter(|a| a.hidden) {
            let _ = item.remove(&attribute.name);
        }
        for (name, value) in recovered {
            let _ = item.entry(name).or_insert(value);
        }
        Ok(item)
    }

    fn logical_value(&self, name: &str, raw: AttributeValue) -> Option<AttributeValue> {
        let attribute = self.metadata.attribute(name)?;
        if attribute.hidden {
            return None;
        }
        match &raw {
            AttributeValue::S(s) => attribute.attribute_type.parse_key_value(s),
            _ => Some(raw),
        }
    }

    /// Typed entity from a physical item
    pub fn to_entity<T: DeserializeOwned>(&self, item: Item) -> Result<T, Error> {
        Ok(serde_dynamo::from_item(self.to_logical_attributes(item)?)?)
    }

    /// Physical index attributes that must change with `body`.
    ///
    /// An index touched by the update is re-derived as a whole from the literal values
    /// of the update, falling back to `context` for attributes the update does not set.
    /// Removing or nulling an attribute of a sparse index removes the whole index.
    pub fn affected_indexes(&self, body: &UpdateBody, context: &Item) -> Result<AffectedIndexes, Error> {
        let mut affected = AffectedIndexes::default();
        let mut values = context.clone();
        for (path, action) in body.actions() {
            if let Some(value) = action.literal() {
                let _ = values.insert(path.clone(), value.clone());
            }
        }

        for index in &self.metadata.schema.indexes {
            let mut changed = false;
            let mut removed = false;
            for part in index.parts() {
                for name in &part.interpolations {
                    let Some(action) = body.get(name) else {
                        continue;
                    };
                    let is_scalar = self
                        .metadata
                        .attribute(name)
                        .is_some_and(|a| a.attribute_type.is_scalar());
                    if !is_scalar {
                        continue;
                    }
                    if action.clears_value() {
                        if !index.is_sparse {
                            return Err(Error::UnresolvedInterpolation {
                                template: part.template.to_string(),
                                attribute: name.clone(),
                            });
                        }
                        removed = true;
                    } else if action.literal().is_some() {
                        changed = true;
                    } else {
                        return Err(Error::InvalidDynamicUpdateAttributeValue {
                            attribute: name.clone(),
                            key: part.attribute.clone(),
                        });
                    }
                }
            }

            if removed {
                affected
                    .remove
                    .extend(index.parts().map(|part| part.attribute.clone()));
            } else if changed {
                // all parts, never a subset
                affected.set.extend(resolve_parts(
                    index.parts(),
                    &values,
                    InterpolationContext::Strict,
                )?);
            }
        }
        Ok(affected)
    }
}

fn key_item(key: &CompiledKey, attributes: &Item) -> Result<Item, Error> {
    Ok(resolve_parts(key.parts(), attributes, InterpolationContext::Strict)?
        .into_iter()
        .collect())
}

fn resolve_parts<'p>(
    parts: impl Iterator<Item = &'p CompiledKeyPart>,
    attributes: &Item,
    context: InterpolationContext,
) -> Result<Vec<(String, AttributeValue)>, InterpolationError> {
    parts
        .map(|part| {
            part.template
                .interpolate(attributes, context)
                .map(|value| (part.attribute.clone(), value))
        })
        .collect()
}
