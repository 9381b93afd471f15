//! Connection: the store handle, the entity registry and the operational limits.

use std::fmt;
use std::sync::Arc;

use crate::client::DynamoStore;
use crate::config::ConnectionConfig;
use crate::error::Error;
use crate::manager::{BatchManager, EntityManager, ScanManager, TransactionManager};
use crate::schema::{DynamoEntity, EntityRegistry, Table};

type Registration = Box<dyn FnOnce(&mut EntityRegistry, Option<&Table>) -> Result<(), Error> + Send>;

/// Handle shared by every manager.
///
/// Cloning is cheap; dropping the last clone releases the store and the registry.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    store: Arc<dyn DynamoStore>,
    registry: EntityRegistry,
    default_table: Option<Table>,
    config: ConnectionConfig,
}

impl Connection {
    /// Start building a connection over `store`
    ///
    /// ```rust,no_run
    /// use dynamo_entity::{Connection, Table, default_client};
    /// use std::sync::Arc;
    ///
    /// # async fn example() -> Result<(), dynamo_entity::Error> {
    /// let connection = Connection::builder(Arc::new(default_client().await))
    ///     .default_table(Table::composite("app", "PK", "SK"))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder<S: DynamoStore + 'static>(store: Arc<S>) -> ConnectionBuilder {
        ConnectionBuilder {
            store,
            default_table: None,
            registrations: Vec::new(),
            config: ConnectionConfig::default(),
        }
    }

    /// Store the connection talks to
    pub fn store(&self) -> &Arc<dyn DynamoStore> {
        &self.inner.store
    }

    /// Registered entities
    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    /// Operational limits
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Table used by entities that declare none
    pub fn default_table(&self) -> Option<&Table> {
        self.inner.default_table.as_ref()
    }

    /// Table scanned by table-wide operations: the default table, or the only table
    /// registered entities use
    pub(crate) fn scan_table(&self) -> Result<&Table, Error> {
        if let Some(table) = self.default_table() {
            return Ok(table);
        }
        match self.registry().tables().as_slice() {
            [table] => Ok(*table),
            _ => Err(Error::MissingTableConfig {
                entity: "*".to_string(),
            }),
        }
    }

    /// Single entity operations
    pub fn entity_manager(&self) -> EntityManager {
        EntityManager::new(self.clone())
    }

    /// Atomic multi item reads and writes
    pub fn transaction_manager(&self) -> TransactionManager {
        TransactionManager::new(self.clone())
    }

    /// Bulk reads and writes
    pub fn batch_manager(&self) -> BatchManager {
        BatchManager::new(self.clone())
    }

    /// Table and entity scans
    pub fn scan_manager(&self) -> ScanManager {
        ScanManager::new(self.clone())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("registry", &self.inner.registry)
            .field("default_table", &self.inner.default_table)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Builder of a [`Connection`]
pub struct ConnectionBuilder {
    store: Arc<dyn DynamoStore>,
    default_table: Option<Table>,
    registrations: Vec<Registration>,
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Table used by entities that declare none
    pub fn default_table(mut self, table: Table) -> Self {
        self.default_table = Some(table);
        self
    }

    /// Register entity `T`, compiled by [`ConnectionBuilder::build`]
    pub fn entity<T: DynamoEntity>(mut self) -> Self {
        self.registrations
            .push(Box::new(|registry: &mut EntityRegistry, table: Option<&Table>| {
                registry.register::<T>(table)
            }));
        self
    }

    /// Operational limits, [`ConnectionConfig::default`] when not set
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Compile every registered entity.
    ///
    /// Fails on the first schema error.
    pub fn build(self) -> Result<Connection, Error> {
        let mut registry = EntityRegistry::new();
        for register in self.registrations {
            register(&mut registry, self.default_table.as_ref())?;
        }

        tracing::info!(
            entities = registry.len(),
            default_table = self.default_table.as_ref().map(|t| t.name.as_str()),
            max_transaction_items = self.config.max_transaction_items,
            "connection ready"
        );

        Ok(Connection {
            inner: Arc::new(ConnectionInner {
                store: self.store,
                registry,
                default_table: self.default_table,
                config: self.config,
            }),
        })
    }
}

impl fmt::Debug for ConnectionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("default_table", &self.default_table)
            .field("entities", &self.registrations.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
