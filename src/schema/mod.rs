//! Entity declarations and their compiled key layout.

mod compiler;
mod declaration;
mod registry;
mod table;
mod template;

pub use compiler::{CompiledIndex, CompiledKey, CompiledKeyPart, CompiledSchema, CompiledUnique, compile};
pub use declaration::{
    AttributeDeclaration, AttributeType, AutoGenerate, DefaultProvider, DefaultValue, DynamoEntity,
    EntityDeclaration, IndexTemplate, PrimaryKeyTemplate, Unique,
};
pub use registry::{EntityMetadata, EntityRegistry};
pub use table::{IndexDefinition, IndexType, Table};
pub use template::{
    InterpolationContext, InterpolationError, KeyTemplate, extract_interpolated_names, interpolate,
    reverse_match,
};
pub(crate) use template::{is_scalar, scalar_to_string};

/// Physical attribute holding the logical entity name on every written item
pub const ENTITY_TYPE_ATTRIBUTE: &str = "__et";

/// Key prefix of unique attribute enforcement records
pub const UNIQUE_KEY_PREFIX: &str = "__UNIQUE#";
