use std::collections::BTreeMap;
use std::fmt;

/// Secondary index type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// Global secondary index with its own partition and sort key
    GlobalSecondaryIndex,
    /// Local secondary index sharing the table partition key
    LocalSecondaryIndex,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexType::GlobalSecondaryIndex => f.write_str("GLOBAL_SECONDARY_INDEX"),
            IndexType::LocalSecondaryIndex => f.write_str("LOCAL_SECONDARY_INDEX"),
        }
    }
}

/// Physical definition of a secondary index on a table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDefinition {
    /// Index type
    pub index_type: IndexType,
    /// Physical partition key attribute, `None` for local indexes
    pub partition_key: Option<String>,
    /// Physical sort key attribute
    pub sort_key: String,
    /// Whether items missing key values are left out of the index
    pub is_sparse: bool,
}

impl IndexDefinition {
    /// Global secondary index keyed on `partition_key` and `sort_key`
    pub fn global(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            index_type: IndexType::GlobalSecondaryIndex,
            partition_key: Some(partition_key.into()),
            sort_key: sort_key.into(),
            is_sparse: true,
        }
    }

    /// Local secondary index sorted on `sort_key`
    pub fn local(sort_key: impl Into<String>) -> Self {
        Self {
            index_type: IndexType::LocalSecondaryIndex,
            partition_key: None,
            sort_key: sort_key.into(),
            is_sparse: true,
        }
    }

    /// Override sparse behaviour
    pub fn sparse(mut self, is_sparse: bool) -> Self {
        self.is_sparse = is_sparse;
        self
    }
}

/// Physical table shared by one or more entities
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Physical partition key attribute
    pub partition_key: String,
    /// Physical sort key attribute, absent for simple key tables
    pub sort_key: Option<String>,
    /// Secondary indexes by name
    pub indexes: BTreeMap<String, IndexDefinition>,
}

impl Table {
    /// Table with a partition key only
    pub fn simple(name: impl Into<String>, partition_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_key: partition_key.into(),
            sort_key: None,
            indexes: BTreeMap::new(),
        }
    }

    /// Table with partition and sort key
    pub fn composite(
        name: impl Into<String>,
        partition_key: impl Into<String>,
        sort_key: impl Into<String>,
    ) -> Self {
        Self {
            sort_key: Some(sort_key.into()),
            ..Self::simple(name, partition_key)
        }
    }

    /// Add a secondary index
    pub fn with_index(mut self, name: impl Into<String>, index: IndexDefinition) -> Self {
        let _ = self.indexes.insert(name.into(), index);
        self
    }

    /// True when the table has a sort key
    pub fn is_composite(&self) -> bool {
        self.sort_key.is_some()
    }

    /// Look up an index definition
    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.get(name)
    }

    /// Physical `(partition, sort)` attribute names of an index; local indexes reuse
    /// the table partition key.
    pub fn index_key_attributes(&self, name: &str) -> Option<(&str, &str)> {
        let index = self.indexes.get(name)?;
        let partition_key = index
            .partition_key
            .as_deref()
            .unwrap_or(self.partition_key.as_str());
        Some((partition_key, index.sort_key.as_str()))
    }
}
