//! Store interface consumed by the managers, with an implementation for the AWS SDK client.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{
    AttributeValue, Delete, DeleteRequest, Get, KeysAndAttributes, Put, PutRequest,
    ReturnConsumedCapacity, ReturnValue, TransactGetItem, TransactWriteItem, Update, WriteRequest,
};
use std::collections::HashMap;
use std::fmt;

use crate::Item;
use crate::error::Error;

/// Point read
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetItemInput {
    /// Table name
    pub table_name: String,
    /// Physical primary key
    pub key: Item,
    /// Projection expression
    pub projection_expression: Option<String>,
    /// Name placeholders of the projection
    pub expression_attribute_names: Option<HashMap<String, String>>,
    /// Strongly consistent read
    pub consistent_read: bool,
}

/// Conditional put
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutItemInput {
    /// Table name
    pub table_name: String,
    /// Physical item
    pub item: Item,
    /// Condition expression
    pub condition_expression: Option<String>,
    /// Name placeholders
    pub expression_attribute_names: Option<HashMap<String, String>>,
    /// Value placeholders
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
}

/// Update returning all new attributes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateItemInput {
    /// Table name
    pub table_name: String,
    /// Physical primary key
    pub key: Item,
    /// Update expression
    pub update_expression: String,
    /// Condition expression
    pub condition_expression: Option<String>,
    /// Name placeholders
    pub expression_attribute_names: Option<HashMap<String, String>>,
    /// Value placeholders
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
}

/// Conditional delete
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteItemInput {
    /// Table name
    pub table_name: String,
    /// Physical primary key
    pub key: Item,
    /// Condition expression
    pub condition_expression: Option<String>,
    /// Name placeholders
    pub expression_attribute_names: Option<HashMap<String, String>>,
    /// Value placeholders
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
}

/// One query page request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryInput {
    /// Table name
    pub table_name: String,
    /// Index to query instead of the table
    pub index_name: Option<String>,
    /// Key condition expression
    pub key_condition_expression: String,
    /// Filter expression
    pub filter_expression: Option<String>,
    /// Projection expression
    pub projection_expression: Option<String>,
    /// Name placeholders
    pub expression_attribute_names: Option<HashMap<String, String>>,
    /// Value placeholders
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
    /// Page size
    pub limit: Option<i32>,
    /// Ascending sort key order
    pub scan_index_forward: bool,
    /// Continuation cursor
    pub exclusive_start_key: Option<Item>,
    /// Strongly consistent read
    pub consistent_read: bool,
}

/// One scan page request
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanInput {
    /// Table name
    pub table_name: String,
    /// Index to scan instead of the table
    pub index_name: Option<String>,
    /// Filter expression
    pub filter_expression: Option<String>,
    /// Projection expression
    pub projection_expression: Option<String>,
    /// Name placeholders
    pub expression_attribute_names: Option<HashMap<String, String>>,
    /// Value placeholders
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
    /// Page size
    pub limit: Option<i32>,
    /// Segment of a parallel scan
    pub segment: Option<i32>,
    /// Segment count of a parallel scan
    pub total_segments: Option<i32>,
    /// Continuation cursor
    pub exclusive_start_key: Option<Item>,
}

/// Query or scan page
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageOutput {
    /// Matching items
    pub items: Vec<Item>,
    /// Cursor of the next page
    pub last_evaluated_key: Option<Item>,
    /// Items evaluated before filtering
    pub scanned_count: usize,
    /// Read capacity consumed by this page
    pub consumed_capacity: Option<f64>,
}

/// One item of an atomic write transaction
#[derive(Clone, Debug, PartialEq)]
pub enum TransactWriteOperation {
    /// Put
    Put(PutItemInput),
    /// Update
    Update(UpdateItemInput),
    /// Delete
    Delete(DeleteItemInput),
}

impl TransactWriteOperation {
    /// Table written by this operation
    pub fn table_name(&self) -> &str {
        match self {
            TransactWriteOperation::Put(put) => &put.table_name,
            TransactWriteOperation::Update(update) => &update.table_name,
            TransactWriteOperation::Delete(delete) => &delete.table_name,
        }
    }
}

impl fmt::Display for TransactWriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (operation, table, key) = match self {
            TransactWriteOperation::Put(put) => ("Put", &put.table_name, &put.item),
            TransactWriteOperation::Update(update) => ("Update", &update.table_name, &update.key),
            TransactWriteOperation::Delete(delete) => ("Delete", &delete.table_name, &delete.key),
        };
        let mut key: Vec<_> = key
            .iter()
            .filter_map(|(name, value)| value.as_s().ok().map(|value| format!("{name}={value}")))
            .collect();
        key.sort();
        write!(f, "{operation} {table}({})", key.join(", "))
    }
}

/// Store reason for one cancelled transaction item
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CancellationReason {
    /// Reason code, `None` when the item did not fail
    pub code: Option<String>,
    /// Reason message
    pub message: Option<String>,
}

/// Result of an atomic write transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactWriteOutcome {
    /// Every item was applied
    Committed,
    /// Nothing was applied; one reason per submitted item
    Cancelled(Vec<CancellationReason>),
}

/// One request of a batch write
#[derive(Clone, Debug, PartialEq)]
pub enum BatchWriteRequest {
    /// Unconditional put
    Put {
        /// Table name
        table_name: String,
        /// Physical item
        item: Item,
    },
    /// Unconditional delete
    Delete {
        /// Table name
        table_name: String,
        /// Physical primary key
        key: Item,
    },
}

impl BatchWriteRequest {
    /// Destination table
    pub fn table_name(&self) -> &str {
        match self {
            BatchWriteRequest::Put { table_name, .. } | BatchWriteRequest::Delete { table_name, .. } => {
                table_name
            }
        }
    }
}

/// Key of a batch or transactional read
#[derive(Clone, Debug, PartialEq)]
pub struct KeyRef {
    /// Table name
    pub table_name: String,
    /// Physical primary key
    pub key: Item,
}

/// Batch get page
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetOutput {
    /// Items found, in no particular order
    pub items: Vec<Item>,
    /// Keys the store did not process
    pub unprocessed_keys: Vec<KeyRef>,
}

/// Single table store
#[async_trait]
pub trait DynamoStore: Send + Sync {
    /// Read one item
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>, Error>;
    /// Write one item
    async fn put_item(&self, input: PutItemInput) -> Result<(), Error>;
    /// Update one item and return its new attributes
    async fn update_item(&self, input: UpdateItemInput) -> Result<Option<Item>, Error>;
    /// Delete one item
    async fn delete_item(&self, input: DeleteItemInput) -> Result<(), Error>;
    /// Read one query page
    async fn query(&self, input: QueryInput) -> Result<PageOutput, Error>;
    /// Read one scan page
    async fn scan(&self, input: ScanInput) -> Result<PageOutput, Error>;
    /// Write up to 25 requests, returning the unprocessed ones
    async fn batch_write(&self, requests: Vec<BatchWriteRequest>) -> Result<Vec<BatchWriteRequest>, Error>;
    /// Read up to 100 keys
    async fn batch_get(&self, keys: Vec<KeyRef>) -> Result<BatchGetOutput, Error>;
    /// Read items atomically, one result per request in order
    async fn transact_get(&self, requests: Vec<GetItemInput>) -> Result<Vec<Option<Item>>, Error>;
    /// Write items atomically
    async fn transact_write(&self, operations: Vec<TransactWriteOperation>) -> Result<TransactWriteOutcome, Error>;
}

/// Build an AWS SDK configuration with default sensible settings
///
/// It configures:
/// - Adaptive retry mode with 3 max attempts
/// - Exponential backoff starting at 1 second
/// - Connect timeout: 3 seconds
/// - Read timeout: 20 seconds
/// - Operation timeout: 60 seconds
/// - LocalStack support via AWS_PROFILE=localstack
pub async fn aws_config_defaults() -> SdkConfig {
    use aws_config::BehaviorVersion;
    use aws_types::sdk_config::{RetryConfig, TimeoutConfig};
    use std::time::Duration;

    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(3))
        .read_timeout(Duration::from_secs(20))
        .operation_timeout(Duration::from_secs(60))
        .build();

    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .retry_config(
            RetryConfig::adaptive()
                .with_max_attempts(3)
                .with_initial_backoff(Duration::from_secs(1)),
        )
        .timeout_config(timeout_config);

    // Support LocalStack via AWS_PROFILE=localstack
    if std::env::var("AWS_PROFILE").unwrap_or_default() == "localstack" {
        loader = loader.endpoint_url("http://127.0.0.1:4566");
    }

    loader.load().await
}

/// DynamoDB client built from [`aws_config_defaults`]
pub async fn default_client() -> Client {
    Client::new(&aws_config_defaults().await)
}

fn sdk_error<E>(error: E) -> Error
where
    aws_sdk_dynamodb::Error: From<E>,
{
    Error::DynamoDB(aws_sdk_dynamodb::Error::from(error))
}

fn transact_write_item(operation: TransactWriteOperation) -> Result<TransactWriteItem, Error> {
    let item = match operation {
        TransactWriteOperation::Put(input) => TransactWriteItem::builder().put(
            Put::builder()
                .table_name(input.table_name)
                .set_item(Some(input.item))
                .set_condition_expression(input.condition_expression)
                .set_expression_attribute_names(input.expression_attribute_names)
                .set_expression_attribute_values(input.expression_attribute_values)
                .build()?,
        ),
        TransactWriteOperation::Update(input) => TransactWriteItem::builder().update(
            Update::builder()
                .table_name(input.table_name)
                .set_key(Some(input.key))
                .update_expression(input.update_expression)
                .set_condition_expression(input.condition_expression)
                .set_expression_attribute_names(input.expression_attribute_names)
                .set_expression_attribute_values(input.expression_attribute_values)
                .build()?,
        ),
        TransactWriteOperation::Delete(input) => TransactWriteItem::builder().delete(
            Delete::builder()
                .table_name(input.table_name)
                .set_key(Some(input.key))
                .set_condition_expression(input.condition_expression)
                .set_expression_attribute_names(input.expression_attribute_names)
                .set_expression_attribute_values(input.expression_attribute_values)
                .build()?,
        ),
    };
    Ok(item.build())
}

fn write_request(request: BatchWriteRequest) -> Result<(String, WriteRequest), Error> {
    Ok(match request {
        BatchWriteRequest::Put { table_name, item } => (
            table_name,
            WriteRequest::builder()
                .put_request(PutRequest::builder().set_item(Some(item)).build()?)
                .build(),
        ),
        BatchWriteRequest::Delete { table_name, key } => (
            table_name,
            WriteRequest::builder()
                .delete_request(DeleteRequest::builder().set_key(Some(key)).build()?)
                .build(),
        ),
    })
}

fn total_capacity(capacity: Option<&aws_sdk_dynamodb::types::ConsumedCapacity>) -> Option<f64> {
    capacity.and_then(|c| c.capacity_units())
}

#[async_trait]
impl DynamoStore for Client {
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>, Error> {
        let result = self
            .get_item()
            .table_name(input.table_name)
            .set_key(Some(input.key))
            .set_projection_expression(input.projection_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .consistent_read(input.consistent_read)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(result.item)
    }

    async fn put_item(&self, input: PutItemInput) -> Result<(), Error> {
        let _ = self
            .put_item()
            .table_name(input.table_name)
            .set_item(Some(input.item))
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<Option<Item>, Error> {
        let result = self
            .update_item()
            .table_name(input.table_name)
            .set_key(Some(input.key))
            .update_expression(input.update_expression)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(result.attributes)
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<(), Error> {
        let _ = self
            .delete_item()
            .table_name(input.table_name)
            .set_key(Some(input.key))
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn query(&self, input: QueryInput) -> Result<PageOutput, Error> {
        let result = self
            .query()
            .table_name(input.table_name)
            .set_index_name(input.index_name)
            .key_condition_expression(input.key_condition_expression)
            .set_filter_expression(input.filter_expression)
            .set_projection_expression(input.projection_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_limit(input.limit)
            .scan_index_forward(input.scan_index_forward)
            .set_exclusive_start_key(input.exclusive_start_key)
            .consistent_read(input.consistent_read)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(PageOutput {
            scanned_count: result.scanned_count.max(0) as usize,
            consumed_capacity: total_capacity(result.consumed_capacity.as_ref()),
            items: result.items.unwrap_or_default(),
            last_evaluated_key: result.last_evaluated_key,
        })
    }

    async fn scan(&self, input: ScanInput) -> Result<PageOutput, Error> {
        let result = self
            .scan()
            .table_name(input.table_name)
            .set_index_name(input.index_name)
            .set_filter_expression(input.filter_expression)
            .set_projection_expression(input.projection_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_limit(input.limit)
            .set_segment(input.segment)
            .set_total_segments(input.total_segments)
            .set_exclusive_start_key(input.exclusive_start_key)
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(PageOutput {
            scanned_count: result.scanned_count.max(0) as usize,
            consumed_capacity: total_capacity(result.consumed_capacity.as_ref()),
            items: result.items.unwrap_or_default(),
            last_evaluated_key: result.last_evaluated_key,
        })
    }

    async fn batch_write(&self, requests: Vec<BatchWriteRequest>) -> Result<Vec<BatchWriteRequest>, Error> {
        let mut request_items: HashMap<String, Vec<WriteRequest>> = HashMap::new();
        for request in requests {
            let (table_name, request) = write_request(request)?;
            request_items.entry(table_name).or_default().push(request);
        }

        let result = self
            .batch_write_item()
            .set_request_items(Some(request_items))
            .send()
            .await
            .map_err(sdk_error)?;

        let mut unprocessed = Vec::new();
        for (table_name, requests) in result.unprocessed_items.unwrap_or_default() {
            for request in requests {
                if let Some(put) = request.put_request {
                    unprocessed.push(BatchWriteRequest::Put {
                        table_name: table_name.clone(),
                        item: put.item,
                    });
                } else if let Some(delete) = request.delete_request {
                    unprocessed.push(BatchWriteRequest::Delete {
                        table_name: table_name.clone(),
                        key: delete.key,
                    });
                }
            }
        }
        Ok(unprocessed)
    }

    async fn batch_get(&self, keys: Vec<KeyRef>) -> Result<BatchGetOutput, Error> {
        let mut by_table: HashMap<String, Vec<Item>> = HashMap::new();
        for KeyRef { table_name, key } in keys {
            by_table.entry(table_name).or_default().push(key);
        }
        let mut request_items = HashMap::with_capacity(by_table.len());
        for (table_name, keys) in by_table {
            let _ = request_items.insert(
                table_name,
                KeysAndAttributes::builder().set_keys(Some(keys)).build()?,
            );
        }

        let result = self
            .batch_get_item()
            .set_request_items(Some(request_items))
            .send()
            .await
            .map_err(sdk_error)?;

        let items = result
            .responses
            .unwrap_or_default()
            .into_values()
            .flatten()
            .collect();
        let unprocessed_keys = result
            .unprocessed_keys
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(table_name, keys)| {
                keys.keys
                    .into_iter()
                    .map(move |key| KeyRef {
                        table_name: table_name.clone(),
                        key,
                    })
            })
            .collect();

        Ok(BatchGetOutput {
            items,
            unprocessed_keys,
        })
    }

    async fn transact_get(&self, requests: Vec<GetItemInput>) -> Result<Vec<Option<Item>>, Error> {
        let mut transact_items = Vec::with_capacity(requests.len());
        for input in requests {
            let get = Get::builder()
                .table_name(input.table_name)
                .set_key(Some(input.key))
                .set_projection_expression(input.projection_expression)
                .set_expression_attribute_names(input.expression_attribute_names)
                .build()?;
            transact_items.push(TransactGetItem::builder().get(get).build());
        }

        let result = self
            .transact_get_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(result
            .responses
            .unwrap_or_default()
            .into_iter()
            .map(|response| response.item)
            .collect())
    }

    async fn transact_write(&self, operations: Vec<TransactWriteOperation>) -> Result<TransactWriteOutcome, Error> {
        let transact_items = operations
            .into_iter()
            .map(transact_write_item)
            .collect::<Result<Vec<_>, _>>()?;

        match self
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await
            .map_err(aws_sdk_dynamodb::Error::from)
        {
            Ok(_) => Ok(TransactWriteOutcome::Committed),
            Err(aws_sdk_dynamodb::Error::TransactionCanceledException(cancelled)) => {
                Ok(TransactWriteOutcome::Cancelled(
                    cancelled
                        .cancellation_reasons()
                        .iter()
                        .map(|reason| CancellationReason {
                            code: reason.code().map(ToString::to_string),
                            message: reason.message().map(ToString::to_string),
                        })
                        .collect(),
                ))
            }
            Err(e) => Err(Error::DynamoDB(e)),
        }
    }
}
