use std::fmt;

use crate::Item;
use crate::client::{KeyRef, TransactWriteOperation};
use crate::error::Error;

type Resolver = Box<dyn FnOnce(Option<&Item>) -> Result<Vec<TransactWriteOperation>, Error> + Send>;

/// Write items that can only be computed once the current item is known
pub struct LazyTransactionWriteItemListLoader {
    /// Logical entity name
    pub entity_name: String,
    /// Item to read before resolving
    pub primary_key: KeyRef,
    resolve: Resolver,
}

impl LazyTransactionWriteItemListLoader {
    pub(crate) fn new<F>(entity_name: impl Into<String>, primary_key: KeyRef, resolve: F) -> Self
    where
        F: FnOnce(Option<&Item>) -> Result<Vec<TransactWriteOperation>, Error> + Send + 'static,
    {
        Self {
            entity_name: entity_name.into(),
            primary_key,
            resolve: Box::new(resolve),
        }
    }

    /// Produce the write items from the item as it was before the write, `None` when
    /// it does not exist
    pub fn resolve(self, prior: Option<&Item>) -> Result<Vec<TransactWriteOperation>, Error> {
        (self.resolve)(prior)
    }
}

impl fmt::Debug for LazyTransactionWriteItemListLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyTransactionWriteItemListLoader")
            .field("entity_name", &self.entity_name)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}

/// Physical writes of one logical operation
#[derive(Debug)]
pub enum PendingWrite {
    /// Ready to submit, main item first
    Direct(Vec<TransactWriteOperation>),
    /// Needs the current item before the writes are known
    NeedsPriorRead(LazyTransactionWriteItemListLoader),
}

impl PendingWrite {
    /// True when the write expands to more than one item or needs a prior read
    pub fn is_transactional(&self) -> bool {
        match self {
            PendingWrite::Direct(operations) => operations.len() > 1,
            PendingWrite::NeedsPriorRead(_) => true,
        }
    }
}
