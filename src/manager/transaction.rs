use crate::Item;
use crate::client::{GetItemInput, TransactWriteOperation, TransactWriteOutcome};
use crate::connection::Connection;
use crate::error::{Error, TransactionCancellationReason};
use crate::expression::UpdateBody;
use crate::options::{CreateOptions, DeleteOptions, FindOneOptions, UpdateOptions};
use crate::schema::DynamoEntity;
use crate::transformer::{LogicalItem, PendingWrite, RequestTransformer};

use super::to_logical_item;

/// Ordered writes applied atomically by [`TransactionManager::write`]
#[derive(Debug)]
pub struct WriteTransaction {
    connection: Connection,
    items: Vec<PendingWrite>,
}

impl WriteTransaction {
    fn transformer<T: DynamoEntity>(&self) -> Result<RequestTransformer, Error> {
        Ok(RequestTransformer::new(self.connection.registry().get::<T>()?))
    }

    /// Add a create
    pub fn create<T: DynamoEntity>(&mut self, entity: &T, options: CreateOptions) -> Result<&mut Self, Error> {
        let attributes: Item = serde_dynamo::to_item(entity)?;
        let write = self.transformer::<T>()?.to_create(attributes, &options)?;
        self.items.push(write);
        Ok(self)
    }

    /// Add an update
    pub fn update<T: DynamoEntity>(
        &mut self,
        primary_key: &Item,
        body: &UpdateBody,
        options: UpdateOptions,
    ) -> Result<&mut Self, Error> {
        let write = self
            .transformer::<T>()?
            .to_update(primary_key, body, &options)?;
        self.items.push(write);
        Ok(self)
    }

    /// Add a delete
    pub fn delete<T: DynamoEntity>(&mut self, primary_key: &Item, options: DeleteOptions) -> Result<&mut Self, Error> {
        let write = self.transformer::<T>()?.to_delete(primary_key, &options)?;
        self.items.push(write);
        Ok(self)
    }

    /// Add an already transformed write
    pub fn push(&mut self, write: PendingWrite) -> &mut Self {
        self.items.push(write);
        self
    }

    /// Logical writes added so far
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing was added
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Point reads served atomically by [`TransactionManager::read`]
#[derive(Debug)]
pub struct ReadTransaction {
    connection: Connection,
    items: Vec<GetItemInput>,
}

impl ReadTransaction {
    /// Add a read of entity `T`
    pub fn get<T: DynamoEntity>(&mut self, primary_key: &Item, options: FindOneOptions) -> Result<&mut Self, Error> {
        let transformer = RequestTransformer::new(self.connection.registry().get::<T>()?);
        self.items.push(transformer.to_get(primary_key, &options)?);
        Ok(self)
    }

    /// Reads added so far
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing was added
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Atomic multi item operations
#[derive(Clone, Debug)]
pub struct TransactionManager {
    connection: Connection,
}

impl TransactionManager {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Empty write transaction bound to this connection
    pub fn write_transaction(&self) -> WriteTransaction {
        WriteTransaction {
            connection: self.connection.clone(),
            items: Vec::new(),
        }
    }

    /// Empty read transaction bound to this connection
    pub fn read_transaction(&self) -> ReadTransaction {
        ReadTransaction {
            connection: self.connection.clone(),
            items: Vec::new(),
        }
    }

    /// Resolve, expand and submit `transaction` as one atomic write.
    ///
    /// Cancellations are reported per submitted item, in submission order.
    pub async fn write(&self, transaction: WriteTransaction) -> Result<(), Error> {
        execute_write(&self.connection, transaction.items).await
    }

    /// Read every item of `transaction` atomically, `None` for missing items
    pub async fn read(&self, transaction: ReadTransaction) -> Result<Vec<Option<LogicalItem>>, Error> {
        if transaction.items.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(items = transaction.items.len(), "transactional read");

        let registry = self.connection.registry();
        self.connection
            .store()
            .transact_get(transaction.items)
            .await?
            .into_iter()
            .map(|item| item.map(|item| to_logical_item(registry, item)).transpose())
            .collect()
    }
}

/// Resolve lazy writes, flatten and submit one atomic write
pub(crate) async fn execute_write(connection: &Connection, writes: Vec<PendingWrite>) -> Result<(), Error> {
    let operations = resolve(connection, writes).await?;
    submit(connection, operations).await
}

/// Resolve lazy writes by reading the current item of each, then flatten and check
/// the item limit
async fn resolve(
    connection: &Connection,
    writes: Vec<PendingWrite>,
) -> Result<Vec<TransactWriteOperation>, Error> {
    let original_items_count = writes.len();
    let mut operations = Vec::with_capacity(writes.len());

    for write in writes {
        match write {
            PendingWrite::Direct(items) => operations.extend(items),
            PendingWrite::NeedsPriorRead(loader) => {
                let prior = connection
                    .store()
                    .get_item(GetItemInput {
                        table_name: loader.primary_key.table_name.clone(),
                        key: loader.primary_key.key.clone(),
                        consistent_read: true,
                        ..Default::default()
                    })
                    .await?;
                if prior.is_none() {
                    tracing::warn!(
                        entity = %loader.entity_name,
                        "no current item, previous unique values are not released"
                    );
                }
                operations.extend(loader.resolve(prior.as_ref())?);
            }
        }
    }

    let limit = connection.config().max_transaction_items;
    if operations.len() > limit {
        return Err(Error::WriteTransactionItemLimitExceeded {
            original_items_count,
            generated_items_count: operations.len(),
            limit,
        });
    }
    Ok(operations)
}

async fn submit(connection: &Connection, operations: Vec<TransactWriteOperation>) -> Result<(), Error> {
    if operations.is_empty() {
        return Ok(());
    }
    let descriptions: Vec<String> = operations.iter().map(ToString::to_string).collect();
    tracing::debug!(items = operations.len(), "submitting write transaction");

    match connection.store().transact_write(operations).await? {
        TransactWriteOutcome::Committed => Ok(()),
        TransactWriteOutcome::Cancelled(reasons) => {
            let reasons = reasons
                .into_iter()
                .enumerate()
                .map(|(index, reason)| TransactionCancellationReason {
                    index,
                    code: reason.code,
                    message: reason.message,
                    operation: descriptions.get(index).cloned().unwrap_or_default(),
                })
                .collect();
            Err(Error::TransactionCancelled { reasons })
        }
    }
}
