/// Test helpers and fixtures for manager integration tests
///
/// This module provides an in-memory store that records every request, common
/// entities and connection setup used across all integration tests.
pub mod fixtures;

pub use aws_sdk_dynamodb::types::AttributeValue;
pub use dynamo_entity::*;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;

// Re-export common fixtures
pub use fixtures::{Org, User, connection, connection_with, table};

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Route library logs to the test output, filtered by `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// String attribute value
pub fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

/// Number attribute value
#[allow(dead_code)]
pub fn n(value: &str) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

/// Item from `(name, value)` pairs
pub fn item(pairs: &[(&str, AttributeValue)]) -> Item {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Every request the store received, in arrival order per operation
#[derive(Debug, Default)]
pub struct Recorded {
    pub gets: Vec<GetItemInput>,
    pub puts: Vec<PutItemInput>,
    pub updates: Vec<UpdateItemInput>,
    pub deletes: Vec<DeleteItemInput>,
    pub queries: Vec<QueryInput>,
    pub scans: Vec<ScanInput>,
    pub batch_writes: Vec<Vec<BatchWriteRequest>>,
    pub batch_gets: Vec<Vec<KeyRef>>,
    pub transact_gets: Vec<Vec<GetItemInput>>,
    pub transact_writes: Vec<Vec<TransactWriteOperation>>,
}

/// Responses handed out instead of the default behaviour
#[derive(Debug, Default)]
pub struct Script {
    /// Query and scan pages, an empty page once drained
    pub pages: VecDeque<PageOutput>,
    /// Return every batch write request as unprocessed
    pub reject_batch_writes: bool,
    /// Return every batch get key as unprocessed
    pub reject_batch_gets: bool,
    /// Outcome of the next transactional write
    pub transact_outcome: Option<TransactWriteOutcome>,
}

/// In-memory single table store keyed on `PK` and `SK`.
///
/// Writes are stored as given; conditions and update expressions are recorded but not
/// evaluated, and updates apply their `SET` literals and `REMOVE` names to the stored item.
#[derive(Debug, Default)]
pub struct MockStore {
    items: Mutex<BTreeMap<String, Item>>,
    recorded: Mutex<Recorded>,
    script: Mutex<Script>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self::default())
    }

    /// Requests received so far
    pub fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }

    /// Scripted responses
    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    /// Store `item` as if it had been written before the test
    #[allow(dead_code)]
    pub fn seed(&self, item: Item) {
        let key = storage_key(&item);
        let _ = self.items.lock().unwrap().insert(key, item);
    }

    /// Stored item with these physical keys
    #[allow(dead_code)]
    pub fn stored(&self, pk: &str, sk: &str) -> Option<Item> {
        let key = storage_key(&item(&[("PK", s(pk)), ("SK", s(sk))]));
        self.items.lock().unwrap().get(&key).cloned()
    }

    /// Number of stored items
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    fn apply(&self, operation: &TransactWriteOperation) {
        let mut items = self.items.lock().unwrap();
        match operation {
            TransactWriteOperation::Put(put) => {
                let _ = items.insert(storage_key(&put.item), put.item.clone());
            }
            TransactWriteOperation::Update(update) => {
                let stored = items
                    .entry(storage_key(&update.key))
                    .or_insert_with(|| update.key.clone());
                apply_update_clauses(stored, update);
            }
            TransactWriteOperation::Delete(delete) => {
                let _ = items.remove(&storage_key(&delete.key));
            }
        }
    }

    fn next_page(&self) -> PageOutput {
        self.script().pages.pop_front().unwrap_or_default()
    }
}

fn storage_key(item: &Item) -> String {
    ["PK", "SK"]
        .iter()
        .map(|name| item.get(*name).and_then(|v| v.as_s().ok()).cloned().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("|")
}

/// Apply `SET #a = :b` pairs of plain assignments and `REMOVE #a` names
fn apply_update_clauses(stored: &mut Item, update: &UpdateItemInput) {
    let names = update.expression_attribute_names.clone().unwrap_or_default();
    let values = update.expression_attribute_values.clone().unwrap_or_default();
    let (set, remove) = match update.update_expression.split_once("REMOVE ") {
        Some((set, remove)) => (set.trim_end(), remove),
        None => (update.update_expression.as_str(), ""),
    };

    let set = set.split(" ADD ").next().unwrap_or_default();
    for assignment in set.strip_prefix("SET ").unwrap_or_default().split(", ") {
        let Some((name, value)) = assignment.split_once(" = ") else {
            continue;
        };
        if let (Some(name), Some(value)) = (names.get(name), values.get(value)) {
            let _ = stored.insert(name.clone(), value.clone());
        }
    }
    let remove = remove.split(" DELETE ").next().unwrap_or_default();
    for name in remove.split(", ").filter(|name| !name.is_empty()) {
        if let Some(name) = names.get(name) {
            let _ = stored.remove(name);
        }
    }
}

#[async_trait]
impl DynamoStore for MockStore {
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>, Error> {
        let key = storage_key(&input.key);
        self.recorded().gets.push(input);
        Ok(self.items.lock().unwrap().get(&key).cloned())
    }

    async fn put_item(&self, input: PutItemInput) -> Result<(), Error> {
        self.apply(&TransactWriteOperation::Put(input.clone()));
        self.recorded().puts.push(input);
        Ok(())
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<Option<Item>, Error> {
        self.apply(&TransactWriteOperation::Update(input.clone()));
        let key = storage_key(&input.key);
        self.recorded().updates.push(input);
        Ok(self.items.lock().unwrap().get(&key).cloned())
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<(), Error> {
        self.apply(&TransactWriteOperation::Delete(input.clone()));
        self.recorded().deletes.push(input);
        Ok(())
    }

    async fn query(&self, input: QueryInput) -> Result<PageOutput, Error> {
        self.recorded().queries.push(input);
        Ok(self.next_page())
    }

    async fn scan(&self, input: ScanInput) -> Result<PageOutput, Error> {
        self.recorded().scans.push(input);
        Ok(self.next_page())
    }

    async fn batch_write(&self, requests: Vec<BatchWriteRequest>) -> Result<Vec<BatchWriteRequest>, Error> {
        self.recorded().batch_writes.push(requests.clone());
        if self.script().reject_batch_writes {
            return Ok(requests);
        }
        for request in requests {
            let operation = match request {
                BatchWriteRequest::Put { table_name, item } => TransactWriteOperation::Put(PutItemInput {
                    table_name,
                    item,
                    ..Default::default()
                }),
                BatchWriteRequest::Delete { table_name, key } => {
                    TransactWriteOperation::Delete(DeleteItemInput {
                        table_name,
                        key,
                        ..Default::default()
                    })
                }
            };
            self.apply(&operation);
        }
        Ok(Vec::new())
    }

    async fn batch_get(&self, keys: Vec<KeyRef>) -> Result<BatchGetOutput, Error> {
        self.recorded().batch_gets.push(keys.clone());
        if self.script().reject_batch_gets {
            return Ok(BatchGetOutput {
                items: Vec::new(),
                unprocessed_keys: keys,
            });
        }
        let items = self.items.lock().unwrap();
        Ok(BatchGetOutput {
            items: keys
                .iter()
                .filter_map(|key| items.get(&storage_key(&key.key)).cloned())
                .collect(),
            unprocessed_keys: Vec::new(),
        })
    }

    async fn transact_get(&self, requests: Vec<GetItemInput>) -> Result<Vec<Option<Item>>, Error> {
        self.recorded().transact_gets.push(requests.clone());
        let items = self.items.lock().unwrap();
        Ok(requests
            .iter()
            .map(|request| items.get(&storage_key(&request.key)).cloned())
            .collect())
    }

    async fn transact_write(&self, operations: Vec<TransactWriteOperation>) -> Result<TransactWriteOutcome, Error> {
        self.recorded().transact_writes.push(operations.clone());
        let outcome = self
            .script()
            .transact_outcome
            .take()
            .unwrap_or(TransactWriteOutcome::Committed);
        if outcome == TransactWriteOutcome::Committed {
            for operation in &operations {
                self.apply(operation);
            }
        }
        Ok(outcome)
    }
}

/// Query page of `count` users of org `1`, with a cursor when `more` is set
#[allow(dead_code)]
pub fn page(start: usize, count: usize, consumed_capacity: f64, more: bool) -> PageOutput {
    let items: Vec<Item> = (start..start + count)
        .map(|i| {
            item(&[
                ("PK", s(&format!("USER#{i}"))),
                ("SK", s(&format!("USER#{i}"))),
                ("GSI1PK", s("ORG#1")),
                ("GSI1SK", s(&format!("USER#user{i}"))),
                ("id", s(&i.to_string())),
                ("org", s("1")),
                ("name", s(&format!("user{i}"))),
                ("email", s(&format!("{i}@x"))),
                ("__et", s("User")),
            ])
        })
        .collect();
    let last_evaluated_key = more.then(|| {
        let last = items.last().cloned().unwrap_or_default();
        last.into_iter()
            .filter(|(name, _)| name == "PK" || name == "SK")
            .collect::<HashMap<_, _>>()
    });
    PageOutput {
        scanned_count: items.len(),
        items,
        last_evaluated_key,
        consumed_capacity: Some(consumed_capacity),
    }
}
