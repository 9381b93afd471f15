use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use super::compiler::{CompiledSchema, compile};
use super::declaration::{AttributeDeclaration, DynamoEntity, EntityDeclaration};
use super::table::Table;
use crate::error::Error;

/// Registered entity with its compiled schema
#[derive(Debug)]
pub struct EntityMetadata {
    /// Logical entity name
    pub name: String,
    /// Owning table
    pub table: Table,
    /// Attributes including inherited ones
    pub attributes: Vec<AttributeDeclaration>,
    /// Compiled key layout
    pub schema: CompiledSchema,
}

impl EntityMetadata {
    /// Compile a declaration against its table, or `default_table` when it names none
    pub fn compile(declaration: EntityDeclaration, default_table: Option<&Table>) -> Result<Self, Error> {
        let table = declaration
            .table
            .clone()
            .or_else(|| default_table.cloned())
            .ok_or_else(|| Error::MissingTableConfig {
                entity: declaration.name.clone(),
            })?;
        let schema = compile(&declaration, &table)?;

        Ok(Self {
            name: declaration.name,
            table,
            attributes: declaration.attributes,
            schema,
        })
    }

    /// Look up a declared attribute
    pub fn attribute(&self, name: &str) -> Option<&AttributeDeclaration> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// True when any attribute is unique
    pub fn has_unique_attributes(&self) -> bool {
        !self.schema.uniques.is_empty()
    }
}

/// Entities known to a connection, by name and by Rust type
#[derive(Debug, Default)]
pub struct EntityRegistry {
    by_name: HashMap<String, Arc<EntityMetadata>>,
    by_type: HashMap<TypeId, String>,
}

impl EntityRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register `T`
    pub fn register<T: DynamoEntity>(&mut self, default_table: Option<&Table>) -> Result<(), Error> {
        let metadata = EntityMetadata::compile(T::declaration(), default_table)?;
        if self.by_name.contains_key(&metadata.name) {
            return Err(Error::DuplicateEntityName {
                name: metadata.name,
            });
        }

        let _ = self.by_type.insert(TypeId::of::<T>(), metadata.name.clone());
        let _ = self
            .by_name
            .insert(metadata.name.clone(), Arc::new(metadata));
        Ok(())
    }

    /// Metadata of a registered Rust type
    pub fn get<T: DynamoEntity>(&self) -> Result<Arc<EntityMetadata>, Error> {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|name| self.by_name.get(name))
            .cloned()
            .ok_or_else(|| Error::EntityNotRegistered(std::any::type_name::<T>().to_string()))
    }

    /// Metadata by logical entity name
    pub fn by_name(&self, name: &str) -> Option<Arc<EntityMetadata>> {
        self.by_name.get(name).cloned()
    }

    /// Registered entity count
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Distinct tables used by registered entities
    pub fn tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = Vec::new();
        for metadata in self.by_name.values() {
            if !tables.iter().any(|t| t.name == metadata.table.name) {
                tables.push(&metadata.table);
            }
        }
        tables
    }
}
