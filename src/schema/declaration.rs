use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use std::sync::Arc;

use super::table::{IndexType, Table};
use super::template::KeyTemplate;
use crate::Item;
use crate::autogen::AutoGenerateStrategy;

/// Rust type stored as an entity.
///
/// Entities are plain serde types; their declaration describes how logical attributes
/// map onto the physical keys of a table.
///
/// ```rust
/// use dynamo_entity::{AttributeDeclaration, AttributeType, DynamoEntity, EntityDeclaration, PrimaryKeyTemplate};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct User {
///     id: String,
///     name: String,
/// }
///
/// impl DynamoEntity for User {
///     fn declaration() -> EntityDeclaration {
///         EntityDeclaration::new(
///             "User",
///             PrimaryKeyTemplate::composite("USER#{{id}}", "USER#{{id}}"),
///         )
///         .attribute(AttributeDeclaration::new("id", AttributeType::String))
///         .attribute(AttributeDeclaration::new("name", AttributeType::String))
///     }
/// }
/// ```
pub trait DynamoEntity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Metadata of this entity
    fn declaration() -> EntityDeclaration;
}

/// Declared attribute type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// String
    String,
    /// Number
    Number,
    /// Boolean
    Boolean,
    /// Binary
    Binary,
    /// String backed enumeration
    Enum,
    /// List
    List,
    /// Map or nested object
    Map,
    /// String set
    StringSet,
    /// Number set
    NumberSet,
    /// Binary set
    BinarySet,
}

impl AttributeType {
    /// Types that can be interpolated into a string key template
    pub fn is_template_scalar(&self) -> bool {
        matches!(
            self,
            AttributeType::String | AttributeType::Number | AttributeType::Boolean | AttributeType::Enum
        )
    }

    /// Types that can be aliased as a physical key
    pub fn is_scalar(&self) -> bool {
        self.is_template_scalar() || matches!(self, AttributeType::Binary)
    }

    /// Convert a raw string recovered from a key back into a value of this type
    pub(crate) fn parse_key_value(&self, raw: &str) -> Option<AttributeValue> {
        match self {
            AttributeType::String | AttributeType::Enum => Some(AttributeValue::S(raw.to_string())),
            AttributeType::Number => raw
                .parse::<f64>()
                .ok()
                .map(|_| AttributeValue::N(raw.to_string())),
            AttributeType::Boolean => raw.parse::<bool>().ok().map(AttributeValue::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Partition and optional sort key templates
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryKeyTemplate {
    /// Partition key template
    pub partition_key: KeyTemplate,
    /// Sort key template
    pub sort_key: Option<KeyTemplate>,
}

impl PrimaryKeyTemplate {
    /// Partition key only
    pub fn simple(partition_key: impl Into<KeyTemplate>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
        }
    }

    /// Partition and sort key
    pub fn composite(partition_key: impl Into<KeyTemplate>, sort_key: impl Into<KeyTemplate>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: Some(sort_key.into()),
        }
    }
}

/// Index templates declared by an entity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexTemplate {
    /// Index type, must match the table definition
    pub index_type: IndexType,
    /// Partition key template, global indexes only
    pub partition_key: Option<KeyTemplate>,
    /// Sort key template
    pub sort_key: KeyTemplate,
    /// Overrides the table level sparse flag
    pub is_sparse: Option<bool>,
}

impl IndexTemplate {
    /// Global secondary index templates
    pub fn global(partition_key: impl Into<KeyTemplate>, sort_key: impl Into<KeyTemplate>) -> Self {
        Self {
            index_type: IndexType::GlobalSecondaryIndex,
            partition_key: Some(partition_key.into()),
            sort_key: sort_key.into(),
            is_sparse: None,
        }
    }

    /// Local secondary index template
    pub fn local(sort_key: impl Into<KeyTemplate>) -> Self {
        Self {
            index_type: IndexType::LocalSecondaryIndex,
            partition_key: None,
            sort_key: sort_key.into(),
            is_sparse: None,
        }
    }

    /// Set the sparse flag explicitly
    pub fn sparse(mut self, is_sparse: bool) -> Self {
        self.is_sparse = Some(is_sparse);
        self
    }
}

/// Uniqueness constraint on an attribute
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unique {
    /// Derive the enforcement key from the entity and attribute names
    Auto,
    /// Explicit enforcement key templates
    Keys(PrimaryKeyTemplate),
}

/// Function computing a default from the attributes known so far
pub type DefaultProvider = Arc<dyn Fn(&Item) -> Option<AttributeValue> + Send + Sync>;

/// Default value of an attribute
#[derive(Clone)]
pub enum DefaultValue {
    /// Constant value
    Static(AttributeValue),
    /// Computed value
    Provider(DefaultProvider),
}

impl DefaultValue {
    pub(crate) fn resolve(&self, attributes: &Item) -> Option<AttributeValue> {
        match self {
            DefaultValue::Static(value) => Some(value.clone()),
            DefaultValue::Provider(provider) => provider(attributes),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            DefaultValue::Provider(_) => f.write_str("Provider(..)"),
        }
    }
}

/// Value generated by the library when writing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoGenerate {
    /// Generation strategy
    pub strategy: AutoGenerateStrategy,
    /// Regenerate on every update
    pub auto_update: bool,
}

/// Declared attribute of an entity
#[derive(Clone, Debug)]
pub struct AttributeDeclaration {
    /// Logical attribute name
    pub name: String,
    /// Declared type
    pub attribute_type: AttributeType,
    /// Uniqueness constraint
    pub unique: Option<Unique>,
    /// Default applied when the attribute is absent
    pub default: Option<DefaultValue>,
    /// Excluded from entities read back from the store
    pub hidden: bool,
    /// Generated value
    pub auto_generate: Option<AutoGenerate>,
}

impl AttributeDeclaration {
    /// Plain attribute
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            unique: None,
            default: None,
            hidden: false,
            auto_generate: None,
        }
    }

    /// Enforce uniqueness with a derived key
    pub fn unique(mut self) -> Self {
        self.unique = Some(Unique::Auto);
        self
    }

    /// Enforce uniqueness with explicit key templates
    pub fn unique_with(mut self, keys: PrimaryKeyTemplate) -> Self {
        self.unique = Some(Unique::Keys(keys));
        self
    }

    /// Constant default
    pub fn default_value(mut self, value: AttributeValue) -> Self {
        self.default = Some(DefaultValue::Static(value));
        self
    }

    /// Computed default
    pub fn default_with<F>(mut self, provider: F) -> Self
    where
        F: Fn(&Item) -> Option<AttributeValue> + Send + Sync + 'static,
    {
        self.default = Some(DefaultValue::Provider(Arc::new(provider)));
        self
    }

    /// Hide from read results
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Generate on create, and on every update when `auto_update` is set
    pub fn auto_generate(mut self, strategy: AutoGenerateStrategy, auto_update: bool) -> Self {
        self.auto_generate = Some(AutoGenerate {
            strategy,
            auto_update,
        });
        self
    }
}

/// Pre-built entity metadata handed to the schema compiler
#[derive(Clone, Debug)]
pub struct EntityDeclaration {
    /// Logical entity name, unique per connection
    pub name: String,
    /// Table override
    pub table: Option<Table>,
    /// Primary key templates
    pub primary_key: PrimaryKeyTemplate,
    /// Index templates by index name, in declaration order
    pub indexes: Vec<(String, IndexTemplate)>,
    /// Attributes, ancestors first
    pub attributes: Vec<AttributeDeclaration>,
}

impl EntityDeclaration {
    /// New declaration without attributes
    pub fn new(name: impl Into<String>, primary_key: PrimaryKeyTemplate) -> Self {
        Self {
            name: name.into(),
            table: None,
            primary_key,
            indexes: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Store this entity in `table` instead of the connection default
    pub fn table(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    /// Declare index templates
    pub fn index(mut self, name: impl Into<String>, template: IndexTemplate) -> Self {
        let name = name.into();
        self.indexes.retain(|(existing, _)| *existing != name);
        self.indexes.push((name, template));
        self
    }

    /// Declare an attribute, replacing an earlier declaration of the same name in place
    pub fn attribute(mut self, attribute: AttributeDeclaration) -> Self {
        match self
            .attributes
            .iter_mut()
            .find(|existing| existing.name == attribute.name)
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
        self
    }

    /// Inherit attributes from an ancestor.
    ///
    /// Attributes already declared here are more derived and win; inherited ones keep
    /// their ancestor position ahead of the attributes of this entity.
    pub fn extends(mut self, ancestor: impl IntoIterator<Item = AttributeDeclaration>) -> Self {
        let own = std::mem::take(&mut self.attributes);
        for inherited in ancestor {
            self = self.attribute(inherited);
        }
        for attribute in own {
            self = self.attribute(attribute);
        }
        self
    }

    /// Look up a declared attribute
    pub fn find_attribute(&self, name: &str) -> Option<&AttributeDeclaration> {
        self.attributes.iter().find(|a| a.name == name)
    }
}
