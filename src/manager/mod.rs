//! Operations over a [`crate::Connection`].

mod batch;
mod entity;
mod pagination;
mod scan;
mod transaction;

pub use batch::{BatchManager, BatchReadOutput, BatchWriteOutput, FailedRead, FailedWrite, ReadBatch, WriteBatch};
pub use entity::EntityManager;
pub use scan::{ScanManager, ScanOutput};
pub use transaction::{ReadTransaction, TransactionManager, WriteTransaction};

use crate::Item;
use crate::error::Error;
use crate::schema::{ENTITY_TYPE_ATTRIBUTE, EntityRegistry};
use crate::transformer::{EntityTransformer, LogicalItem};

/// Page of typed entities
#[derive(Clone, Debug, PartialEq)]
pub struct FindOutput<T> {
    /// Entities in store order
    pub items: Vec<T>,
    /// Cursor to continue from, `None` when there is nothing left
    pub cursor: Option<Item>,
}

/// Attribute an item read from a shared table to its registered entity
pub(crate) fn to_logical_item(registry: &EntityRegistry, item: Item) -> Result<LogicalItem, Error> {
    let metadata = item
        .get(ENTITY_TYPE_ATTRIBUTE)
        .and_then(|value| value.as_s().ok())
        .and_then(|name| registry.by_name(name));

    match metadata {
        Some(metadata) => Ok(LogicalItem::Known {
            entity: metadata.name.clone(),
            attributes: EntityTransformer::new(&metadata).to_logical_attributes(item)?,
        }),
        None => Ok(LogicalItem::Unknown(item)),
    }
}

/// Like [`to_logical_item`], keeping an item that cannot be converted as unknown
pub(crate) fn to_logical_item_or_raw(registry: &EntityRegistry, item: Item) -> LogicalItem {
    match to_logical_item(registry, item.clone()) {
        Ok(logical) => logical,
        Err(error) => {
            tracing::warn!(%error, "item kept as unknown, conversion failed");
            LogicalItem::Unknown(item)
        }
    }
}
