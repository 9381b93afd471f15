//! # DynamoDB Entity Mapping
//!
//! Entity mapping over a single DynamoDB table shared by many entity types:
//! - Key templates (`"USER#{{id}}"`) mapping logical attributes onto physical keys
//! - Global and local secondary indexes, sparse indexes
//! - Unique attributes enforced with transactional marker records
//! - Condition, filter, key condition, projection and update expressions
//! - Atomic write transactions with per item cancellation reasons
//! - Batch writes and reads with bounded concurrency and exponential backoff
//!
//! ## Features
//!
//! - **Type-safe**: entities are plain `serde` types, declared once with [`DynamoEntity`]
//! - **Async-first**: built on `tokio` and `aws-sdk-dynamodb`
//! - **No global state**: every registry lives in a [`Connection`]
//! - **Testable**: the store is the [`DynamoStore`] trait, implemented for the SDK client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynamo_entity::{
//!     AttributeDeclaration, AttributeType, Connection, CreateOptions, DynamoEntity,
//!     EntityDeclaration, Error, FindOneOptions, PrimaryKeyTemplate, Table, default_client,
//! };
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     id: String,
//!     email: String,
//!     name: String,
//! }
//!
//! impl DynamoEntity for User {
//!     fn declaration() -> EntityDeclaration {
//!         EntityDeclaration::new("User", PrimaryKeyTemplate::composite("USER#{{id}}", "USER#{{id}}"))
//!             .attribute(AttributeDeclaration::new("id", AttributeType::String))
//!             .attribute(AttributeDeclaration::new("email", AttributeType::String).unique())
//!             .attribute(AttributeDeclaration::new("name", AttributeType::String))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let connection = Connection::builder(Arc::new(default_client().await))
//!         .default_table(Table::composite("app", "PK", "SK"))
//!         .entity::<User>()
//!         .build()?;
//!     let users = connection.entity_manager();
//!
//!     let user = User {
//!         id: "123".to_string(),
//!         email: "user@example.com".to_string(),
//!         name: "John Doe".to_string(),
//!     };
//!     users.create(&user, CreateOptions::default()).await?;
//!
//!     let key = dynamo_entity::to_item(&[("id", "123")])?;
//!     let retrieved: Option<User> = users.find_one(&key, FindOneOptions::default()).await?;
//!
//!     Ok(())
//! }
//! ```
#![deny(
    bad_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    unused_extern_crates,
    unused_import_braces,
    deprecated,
    unreachable_code
)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused,
    unused_qualifications,
    unused_results
)]

mod autogen;
mod client;
mod config;
mod connection;
mod error;
mod options;

/// Entity declarations and their compiled key layout
pub mod schema;

/// Expression compiler
pub mod expression;

/// Logical to physical conversion
pub mod transformer;

/// Entity, transaction, batch and scan managers
pub mod manager;

use aws_sdk_dynamodb::types::AttributeValue;
use serde::Serialize;
use std::collections::HashMap;

/// Attribute map keyed by attribute name
pub type Item = HashMap<String, AttributeValue>;

pub use autogen::AutoGenerateStrategy;
pub use client::{
    BatchGetOutput, BatchWriteRequest, CancellationReason, DeleteItemInput, DynamoStore, GetItemInput,
    KeyRef, PageOutput, PutItemInput, QueryInput, ScanInput, TransactWriteOperation, TransactWriteOutcome,
    UpdateItemInput, aws_config_defaults, default_client,
};
pub use config::{ConnectionConfig, RetryConfig};
pub use connection::{Connection, ConnectionBuilder};
pub use error::{Error, TransactionCancellationReason};
pub use expression::{
    AttributeCondition, ConditionOptions, SortKeyCondition, UpdateAction, UpdateBody, to_value,
};
pub use manager::{
    BatchManager, BatchReadOutput, BatchWriteOutput, EntityManager, FailedRead, FailedWrite, FindOutput,
    ReadBatch, ReadTransaction, ScanManager, ScanOutput, TransactionManager, WriteBatch, WriteTransaction,
};
pub use options::{
    BatchReadOptions, BatchWriteOptions, CreateOptions, DeleteOptions, FindOneOptions, FindOptions, MetaLimit,
    PartitionKey, ScanOptions, SortOrder, UpdateOptions,
};
pub use schema::{
    AttributeDeclaration, AttributeType, DynamoEntity, EntityDeclaration, IndexDefinition, IndexTemplate,
    IndexType, KeyTemplate, PrimaryKeyTemplate, Table, Unique,
};
pub use transformer::LogicalItem;

// Re-export aws-config types for configuration
pub use aws_config::{BehaviorVersion, Region, SdkConfig};

/// Attribute map from `(name, value)` pairs of any serializable values
///
/// ```rust
/// let key = dynamo_entity::to_item(&[("id", "123")]).unwrap();
/// assert_eq!(key["id"].as_s().unwrap(), "123");
/// ```
pub fn to_item<K, V>(pairs: &[(K, V)]) -> Result<Item, Error>
where
    K: AsRef<str>,
    V: Serialize,
{
    pairs
        .iter()
        .map(|(name, value)| Ok((name.as_ref().to_string(), to_value(value)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_item() {
        let item = to_item(&[("id", 7)]).unwrap();
        assert_eq!(item.get("id"), Some(&AttributeValue::N("7".into())));
    }

    #[test]
    fn test_to_item_empty() {
        let pairs: [(&str, String); 0] = [];
        assert!(to_item(&pairs).unwrap().is_empty());
    }

    #[test]
    fn test_to_item_mixed_values() {
        let item = to_item(&[("id", serde_json::json!("1")), ("age", serde_json::json!(30))]).unwrap();
        assert_eq!(item.get("id"), Some(&AttributeValue::S("1".into())));
        assert_eq!(item.get("age"), Some(&AttributeValue::N("30".into())));
    }
}
