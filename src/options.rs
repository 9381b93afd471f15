//! Options accepted by the managers.

use aws_sdk_dynamodb::types::AttributeValue;

use crate::Item;
use crate::expression::{ConditionOptions, SortKeyCondition};

/// Options of a create
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateOptions {
    /// Replace an existing item with the same primary key instead of failing
    pub overwrite_if_exists: bool,
    /// Additional write condition
    pub r#where: Option<ConditionOptions>,
}

/// Options of a point read
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOneOptions {
    /// Attributes to read, all when `None`
    pub select: Option<Vec<String>>,
    /// Strongly consistent read
    pub consistent_read: bool,
}

/// Options of an update
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateOptions {
    /// Additional write condition
    pub r#where: Option<ConditionOptions>,
    /// Current values of attributes that index templates need but the update does not set
    pub nested_key_context: Item,
}

/// Options of a delete
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteOptions {
    /// Additional write condition
    pub r#where: Option<ConditionOptions>,
}

/// Sort key order of query results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

/// Secondary limit that stops pagination before the item limit is reached
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetaLimit {
    /// Stop once the consumed read capacity reaches this total
    ConsumedCapacity(f64),
    /// Stop once this many items were evaluated
    ScannedCount(usize),
}

/// Partition to query
#[derive(Clone, Debug, PartialEq)]
pub enum PartitionKey {
    /// Logical attributes interpolated into the partition key template
    Attributes(Item),
    /// Physical partition key value used as is
    Raw(String),
}

impl PartitionKey {
    /// Partition from `(name, value)` pairs
    pub fn attributes<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, AttributeValue)>,
        K: Into<String>,
    {
        PartitionKey::Attributes(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Options of `find` and `count`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    /// Index to query instead of the table
    pub query_index: Option<String>,
    /// Sort key condition
    pub key_condition: Option<SortKeyCondition>,
    /// Filter applied after the key condition
    pub r#where: Option<ConditionOptions>,
    /// Attributes to read
    pub select: Option<Vec<String>>,
    /// Sort order
    pub order_by: SortOrder,
    /// Maximum items returned, the connection default when `None`
    pub limit: Option<usize>,
    /// Continue after this cursor
    pub cursor: Option<Item>,
    /// Secondary pagination limit
    pub meta_limit: Option<MetaLimit>,
    /// Strongly consistent read
    pub consistent_read: bool,
}

/// Options of scans
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanOptions {
    /// Index to scan instead of the table
    pub scan_index: Option<String>,
    /// Filter
    pub r#where: Option<ConditionOptions>,
    /// Attributes to read
    pub select: Option<Vec<String>>,
    /// Maximum items returned, the connection default when `None`
    pub limit: Option<usize>,
    /// Continue after this cursor
    pub cursor: Option<Item>,
    /// Secondary pagination limit
    pub meta_limit: Option<MetaLimit>,
    /// Segment of a parallel scan
    pub segment: Option<i32>,
    /// Segment count of a parallel scan
    pub total_segments: Option<i32>,
}

/// Options of batch writes
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchWriteOptions {
    /// Overrides the connection concurrency limit
    pub max_concurrency: Option<usize>,
}

/// Options of batch reads
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReadOptions {
    /// Overrides the connection concurrency limit
    pub max_concurrency: Option<usize>,
}
