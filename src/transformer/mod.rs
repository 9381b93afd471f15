//! Logical to physical conversion of entities and requests.

mod entity;
mod lazy;
mod request;

pub use entity::{AffectedIndexes, EntityTransformer, LogicalItem};
pub use lazy::{LazyTransactionWriteItemListLoader, PendingWrite};
pub use request::RequestTransformer;
pub(crate) use request::to_scan_input;
