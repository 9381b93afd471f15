use std::collections::HashMap;

use super::declaration::{AttributeType, EntityDeclaration, PrimaryKeyTemplate, Unique};
use super::table::{IndexType, Table};
use super::template::KeyTemplate;
use super::UNIQUE_KEY_PREFIX;
use crate::error::Error;

/// One physical key attribute and the template that produces it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledKeyPart {
    /// Physical attribute name
    pub attribute: String,
    /// Template producing the physical value
    pub template: KeyTemplate,
    /// Logical attributes referenced by the template, ordered and de-duplicated
    pub interpolations: Vec<String>,
}

impl CompiledKeyPart {
    fn new(attribute: &str, template: &KeyTemplate) -> Self {
        Self {
            attribute: attribute.to_string(),
            template: template.clone(),
            interpolations: template.interpolated_names(),
        }
    }

    /// True when `name` is interpolated into this part
    pub fn references(&self, name: &str) -> bool {
        self.interpolations.iter().any(|n| n == name)
    }
}

/// Compiled primary key, or key of a unique enforcement record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledKey {
    /// Partition key part
    pub partition: CompiledKeyPart,
    /// Sort key part
    pub sort: Option<CompiledKeyPart>,
}

impl CompiledKey {
    /// Key parts, partition first
    pub fn parts(&self) -> impl Iterator<Item = &CompiledKeyPart> {
        std::iter::once(&self.partition).chain(self.sort.as_ref())
    }
}

/// Compiled secondary index
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledIndex {
    /// Index name
    pub name: String,
    /// Index type
    pub index_type: IndexType,
    /// Own partition key, absent for local indexes
    pub partition: Option<CompiledKeyPart>,
    /// Sort key
    pub sort: CompiledKeyPart,
    /// Omit all index attributes when a template value is missing
    pub is_sparse: bool,
}

impl CompiledIndex {
    /// Key parts written for this index
    pub fn parts(&self) -> impl Iterator<Item = &CompiledKeyPart> {
        self.partition.iter().chain(std::iter::once(&self.sort))
    }
}

/// Compiled enforcement key of a unique attribute
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledUnique {
    /// Logical attribute name
    pub attribute: String,
    /// Key of the enforcement record
    pub key: CompiledKey,
}

/// Physical layout of an entity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledSchema {
    /// Primary key, never sparse
    pub primary_key: CompiledKey,
    /// Secondary indexes in declaration order
    pub indexes: Vec<CompiledIndex>,
    /// Unique attribute enforcement keys in declaration order
    pub uniques: Vec<CompiledUnique>,
}

impl CompiledSchema {
    /// Look up a compiled index
    pub fn index(&self, name: &str) -> Option<&CompiledIndex> {
        self.indexes.iter().find(|index| index.name == name)
    }

    /// Look up a unique attribute
    pub fn unique(&self, attribute: &str) -> Option<&CompiledUnique> {
        self.uniques.iter().find(|u| u.attribute == attribute)
    }

    /// Every physical attribute derived from templates
    pub fn physical_attributes(&self) -> impl Iterator<Item = &str> {
        self.primary_key
            .parts()
            .chain(self.indexes.iter().flat_map(CompiledIndex::parts))
            .map(|part| part.attribute.as_str())
    }

    /// True when the primary key template references `name`
    pub fn is_primary_key_attribute(&self, name: &str) -> bool {
        self.primary_key.parts().any(|part| part.references(name))
    }
}

struct Compiler<'a> {
    entity: &'a str,
    attribute_types: HashMap<&'a str, AttributeType>,
}

impl Compiler<'_> {
    fn part(&self, attribute: &str, template: &KeyTemplate) -> Result<CompiledKeyPart, Error> {
        let part = CompiledKeyPart::new(attribute, template);
        for name in &part.interpolations {
            let attribute_type =
                self.attribute_types
                    .get(name.as_str())
                    .ok_or_else(|| Error::NoSuchAttribute {
                        entity: self.entity.to_string(),
                        key: attribute.to_string(),
                        attribute: name.clone(),
                    })?;
            let valid = if template.is_alias() {
                attribute_type.is_scalar()
            } else {
                attribute_type.is_template_scalar()
            };
            if !valid {
                return Err(Error::InvalidKeyAttributeType {
                    entity: self.entity.to_string(),
                    key: attribute.to_string(),
                    attribute: name.clone(),
                    attribute_type: attribute_type.to_string(),
                });
            }
        }
        Ok(part)
    }

    fn key(&self, table: &Table, template: &PrimaryKeyTemplate, what: &str) -> Result<CompiledKey, Error> {
        let sort = match (&table.sort_key, &template.sort_key) {
            (Some(attribute), Some(sort)) => Some(self.part(attribute, sort)?),
            (None, None) => None,
            (Some(_), None) => {
                return Err(self.shape_mismatch(format!(
                    "{what} has no sort key but table \"{}\" requires one",
                    table.name
                )));
            }
            (None, Some(_)) => {
                return Err(self.shape_mismatch(format!(
                    "{what} declares a sort key but table \"{}\" has none",
                    table.name
                )));
            }
        };
        Ok(CompiledKey {
            partition: self.part(&table.partition_key, &template.partition_key)?,
            sort,
        })
    }

    fn shape_mismatch(&self, message: String) -> Error {
        Error::KeyShapeMismatch {
            entity: self.entity.to_string(),
            message,
        }
    }
}

/// Compile the key layout of `declaration` for `table`.
///
/// All template references are validated here so that malformed keys surface when the
/// connection is built rather than on the write path.
pub fn compile(declaration: &EntityDeclaration, table: &Table) -> Result<CompiledSchema, Error> {
    let compiler = Compiler {
        entity: &declaration.name,
        attribute_types: declaration
            .attributes
            .iter()
            .map(|a| (a.name.as_str(), a.attribute_type))
            .collect(),
    };

    let primary_key = compiler.key(table, &declaration.primary_key, "primary key")?;

    let mut indexes = Vec::with_capacity(declaration.indexes.len());
    for (name, template) in &declaration.indexes {
        let definition = table.index(name).ok_or_else(|| Error::NoSuchIndexFound {
            index: name.clone(),
            table: table.name.clone(),
        })?;
        if definition.index_type != template.index_type {
            return Err(Error::IndexSignatureMismatch {
                entity: declaration.name.clone(),
                index: name.clone(),
                declared: template.index_type.to_string(),
                expected: definition.index_type.to_string(),
            });
        }

        let partition = match (&definition.partition_key, &template.partition_key) {
            (Some(attribute), Some(partition)) => Some(compiler.part(attribute, partition)?),
            (None, None) => None,
            (Some(_), None) => {
                return Err(compiler.shape_mismatch(format!(
                    "global index \"{name}\" requires a partition key template"
                )));
            }
            (None, Some(_)) => {
                return Err(compiler.shape_mismatch(format!(
                    "local index \"{name}\" shares the table partition key and can not declare one"
                )));
            }
        };

        indexes.push(CompiledIndex {
            name: name.clone(),
            index_type: definition.index_type,
            partition,
            sort: compiler.part(&definition.sort_key, &template.sort_key)?,
            is_sparse: template.is_sparse.unwrap_or(definition.is_sparse),
        });
    }

    let mut uniques = Vec::new();
    for attribute in &declaration.attributes {
        let template = match &attribute.unique {
            None => continue,
            Some(Unique::Keys(keys)) => keys.clone(),
            Some(Unique::Auto) => {
                let value = format!(
                    "{UNIQUE_KEY_PREFIX}{}.{}#{{{{{}}}}}",
                    declaration.name.to_uppercase(),
                    attribute.name.to_uppercase(),
                    attribute.name
                );
                PrimaryKeyTemplate {
                    partition_key: KeyTemplate::Template(value.clone()),
                    sort_key: table.is_composite().then_some(KeyTemplate::Template(value)),
                }
            }
        };
        uniques.push(CompiledUnique {
            attribute: attribute.name.clone(),
            key: compiler.key(table, &template, &format!("unique key of \"{}\"", attribute.name))?,
        });
    }

    Ok(CompiledSchema {
        primary_key,
        indexes,
        uniques,
    })
}
