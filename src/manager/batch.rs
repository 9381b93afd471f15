use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_stream::{self as stream};

use super::to_logical_item_or_raw;
use super::transaction::execute_write;
use crate::Item;
use crate::client::{BatchWriteRequest, KeyRef, TransactWriteOperation};
use crate::config::RetryConfig;
use crate::connection::Connection;
use crate::error::Error;
use crate::options::{BatchReadOptions, BatchWriteOptions, CreateOptions, DeleteOptions};
use crate::schema::DynamoEntity;
use crate::transformer::{LogicalItem, PendingWrite, RequestTransformer};

#[derive(Debug)]
enum BatchItem {
    /// Goes through the native batch write
    Plain(BatchWriteRequest),
    /// Needs its own write transaction
    Transactional { entity: String, write: PendingWrite },
}

/// Bulk creates and deletes, see [`BatchManager::write`]
#[derive(Debug)]
pub struct WriteBatch {
    connection: Connection,
    items: Vec<BatchItem>,
}

impl WriteBatch {
    /// Add a create.
    ///
    /// Entities without unique attributes are written unconditionally; entities with
    /// unique attributes are created in their own transaction.
    pub fn create<T: DynamoEntity>(&mut self, entity: &T) -> Result<&mut Self, Error> {
        let metadata = self.connection.registry().get::<T>()?;
        let transformer = RequestTransformer::new(metadata.clone());
        let attributes: Item = serde_dynamo::to_item(entity)?;

        let item = if metadata.has_unique_attributes() {
            BatchItem::Transactional {
                entity: metadata.name.clone(),
                write: transformer.to_create(attributes, &CreateOptions::default())?,
            }
        } else {
            let options = CreateOptions {
                overwrite_if_exists: true,
                r#where: None,
            };
            let (main, _) = transformer.create_operations(attributes, &options)?;
            BatchItem::Plain(BatchWriteRequest::Put {
                table_name: main.table_name,
                item: main.item,
            })
        };
        self.items.push(item);
        Ok(self)
    }

    /// Add a delete; entities with unique attributes are deleted in their own
    /// transaction to release their unique values
    pub fn delete<T: DynamoEntity>(&mut self, primary_key: &Item) -> Result<&mut Self, Error> {
        let metadata = self.connection.registry().get::<T>()?;
        let transformer = RequestTransformer::new(metadata.clone());

        let item = match transformer.to_delete(primary_key, &DeleteOptions::default())? {
            PendingWrite::Direct(mut operations) if operations.len() == 1 => match operations.pop() {
                Some(TransactWriteOperation::Delete(delete)) => BatchItem::Plain(BatchWriteRequest::Delete {
                    table_name: delete.table_name,
                    key: delete.key,
                }),
                Some(operation) => BatchItem::Transactional {
                    entity: metadata.name.clone(),
                    write: PendingWrite::Direct(vec![operation]),
                },
                None => return Ok(self),
            },
            write => BatchItem::Transactional {
                entity: metadata.name.clone(),
                write,
            },
        };
        self.items.push(item);
        Ok(self)
    }

    /// Items added so far
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing was added
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Keys read by [`BatchManager::read`]
#[derive(Debug)]
pub struct ReadBatch {
    connection: Connection,
    keys: Vec<KeyRef>,
}

impl ReadBatch {
    /// Add a read of entity `T`
    pub fn get<T: DynamoEntity>(&mut self, primary_key: &Item) -> Result<&mut Self, Error> {
        let transformer = RequestTransformer::new(self.connection.registry().get::<T>()?);
        self.keys.push(transformer.to_key_ref(primary_key)?);
        Ok(self)
    }

    /// Keys added so far
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when nothing was added
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Write that failed with an error
#[derive(Debug)]
pub enum FailedWrite {
    /// Native batch write call
    Batch {
        /// Requests of the failed call
        requests: Vec<BatchWriteRequest>,
        /// Store error
        error: Error,
    },
    /// Transaction of one item with unique attributes
    Transaction {
        /// Logical entity name
        entity: String,
        /// Transaction error
        error: Error,
    },
}

/// Batch write output.
///
/// Partial failure is reported here, never as an error of the whole call.
#[must_use = "batch write results contain unprocessed and failed items that should be checked"]
#[derive(Debug, Default)]
pub struct BatchWriteOutput {
    /// Requests still unprocessed once the retry budget was spent
    pub unprocessed_items: Vec<BatchWriteRequest>,
    /// Writes that failed with an error
    pub failed_items: Vec<FailedWrite>,
    /// Total execution time including all retries
    pub total_duration: Duration,
}

impl BatchWriteOutput {
    /// Check if every write was applied
    pub fn is_success(&self) -> bool {
        self.unprocessed_items.is_empty() && self.failed_items.is_empty()
    }
}

/// Batch get call that failed with an error
#[derive(Debug)]
pub struct FailedRead {
    /// Keys of the failed call
    pub keys: Vec<KeyRef>,
    /// Store error
    pub error: Error,
}

/// Batch read output
#[must_use = "batch read results contain unprocessed and failed keys that should be checked"]
#[derive(Debug, Default)]
pub struct BatchReadOutput {
    /// Items found, in no particular order
    pub items: Vec<LogicalItem>,
    /// Keys still unprocessed once the retry budget was spent
    pub unprocessed_items: Vec<KeyRef>,
    /// Calls that failed with an error
    pub failed_items: Vec<FailedRead>,
    /// Total execution time including all retries
    pub total_duration: Duration,
}

impl BatchReadOutput {
    /// Check if every key was read
    pub fn is_success(&self) -> bool {
        self.unprocessed_items.is_empty() && self.failed_items.is_empty()
    }
}

#[derive(Debug)]
enum Task {
    Chunk(Vec<BatchWriteRequest>),
    Transaction { entity: String, write: PendingWrite },
}

#[derive(Debug, Default)]
struct TaskResult {
    unprocessed: Vec<BatchWriteRequest>,
    failed: Option<FailedWrite>,
}

/// Bulk reads and writes
#[derive(Clone, Debug)]
pub struct BatchManager {
    connection: Connection,
}

impl BatchManager {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Empty write batch bound to this connection
    pub fn write_batch(&self) -> WriteBatch {
        WriteBatch {
            connection: self.connection.clone(),
            items: Vec::new(),
        }
    }

    /// Empty read batch bound to this connection
    pub fn read_batch(&self) -> ReadBatch {
        ReadBatch {
            connection: self.connection.clone(),
            keys: Vec::new(),
        }
    }

    /// Write every item of `batch`.
    ///
    /// Plain items are chunked into native batch writes; items with unique attributes
    /// run as individual transactions. Everything runs under the concurrency limit and
    /// unprocessed requests are retried with exponential backoff.
    pub async fn write(&self, batch: WriteBatch, options: BatchWriteOptions) -> Result<BatchWriteOutput, Error> {
        let start_time = Instant::now();
        let config = self.connection.config();

        let mut plain = Vec::new();
        let mut tasks = Vec::new();
        for item in batch.items {
            match item {
                BatchItem::Plain(request) => plain.push(request),
                BatchItem::Transactional { entity, write } => tasks.push(Task::Transaction { entity, write }),
            }
        }
        let transactions = tasks.len();
        tasks.extend(
            plain
                .chunks(config.max_batch_write_items.max(1))
                .map(|chunk| Task::Chunk(chunk.to_vec())),
        );

        let concurrency = options
            .max_concurrency
            .unwrap_or(config.max_concurrency)
            .min(tasks.len())
            .max(1);
        tracing::debug!(
            tasks = tasks.len(),
            transactions,
            plain = plain.len(),
            concurrency,
            "batch write"
        );

        let results: Vec<TaskResult> = stream::iter(tasks.into_iter().map(|task| self.run(task)))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut output = BatchWriteOutput::default();
        for result in results {
            output.unprocessed_items.extend(result.unprocessed);
            output.failed_items.extend(result.failed);
        }
        output.total_duration = start_time.elapsed();
        Ok(output)
    }

    async fn run(&self, task: Task) -> TaskResult {
        match task {
            Task::Transaction { entity, write } => match execute_write(&self.connection, vec![write]).await {
                Ok(()) => TaskResult::default(),
                Err(error) => TaskResult {
                    failed: Some(FailedWrite::Transaction { entity, error }),
                    ..Default::default()
                },
            },
            Task::Chunk(requests) => self.write_chunk(requests).await,
        }
    }

    async fn write_chunk(&self, requests: Vec<BatchWriteRequest>) -> TaskResult {
        let retry = &self.connection.config().batch_retry;
        let store = self.connection.store();
        let mut pending = requests;
        let mut attempt = 0;

        loop {
            match store.batch_write(pending.clone()).await {
                Ok(unprocessed) => pending = unprocessed,
                Err(error) => {
                    return TaskResult {
                        failed: Some(FailedWrite::Batch {
                            requests: pending,
                            error,
                        }),
                        ..Default::default()
                    };
                }
            }
            if pending.is_empty() {
                return TaskResult::default();
            }
            if !wait_for_retry(retry, &mut attempt, pending.len()).await {
                return TaskResult {
                    unprocessed: pending,
                    failed: None,
                };
            }
        }
    }

    /// Read every key of `batch` in chunks, retrying unprocessed keys with exponential
    /// backoff
    pub async fn read(&self, batch: ReadBatch, options: BatchReadOptions) -> Result<BatchReadOutput, Error> {
        let start_time = Instant::now();
        let config = self.connection.config();

        let chunks: Vec<Vec<KeyRef>> = batch
            .keys
            .chunks(config.max_batch_read_items.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        let concurrency = options
            .max_concurrency
            .unwrap_or(config.max_concurrency)
            .min(chunks.len())
            .max(1);
        tracing::debug!(chunks = chunks.len(), concurrency, "batch read");

        let results: Vec<ReadResult> = stream::iter(chunks.into_iter().map(|keys| self.read_chunk(keys)))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let registry = self.connection.registry();
        let mut output = BatchReadOutput::default();
        for result in results {
            output.items.extend(
                result
                    .items
                    .into_iter()
                    .map(|item| to_logical_item_or_raw(registry, item)),
            );
            output.unprocessed_items.extend(result.unprocessed);
            output.failed_items.extend(result.failed);
        }
        output.total_duration = start_time.elapsed();
        Ok(output)
    }

    async fn read_chunk(&self, keys: Vec<KeyRef>) -> ReadResult {
        let retry = &self.connection.config().batch_retry;
        let store = self.connection.store();
        let mut result = ReadResult::default();
        let mut pending = keys;
        let mut attempt = 0;

        loop {
            match store.batch_get(pending.clone()).await {
                Ok(output) => {
                    result.items.extend(output.items);
                    pending = output.unprocessed_keys;
                }
                Err(error) => {
                    result.failed = Some(FailedRead { keys: pending, error });
                    return result;
                }
            }
            if pending.is_empty() {
                return result;
            }
            if !wait_for_retry(retry, &mut attempt, pending.len()).await {
                result.unprocessed = pending;
                return result;
            }
        }
    }
}

#[derive(Debug, Default)]
struct ReadResult {
    items: Vec<Item>,
    unprocessed: Vec<KeyRef>,
    failed: Option<FailedRead>,
}

/// Sleep before the next attempt, false once the retry budget is spent
async fn wait_for_retry(retry: &RetryConfig, attempt: &mut usize, pending: usize) -> bool {
    if *attempt >= retry.max_retries {
        tracing::warn!(
            attempts = *attempt + 1,
            pending,
            "batch retries exhausted, returning unprocessed items"
        );
        return false;
    }
    sleep(retry.retry_delay(*attempt)).await;
    *attempt += 1;
    true
}
