use super::FindOutput;
use super::pagination::{Accumulated, Collect, paginate};
use super::transaction::execute_write;
use crate::Item;
use crate::client::{GetItemInput, QueryInput, TransactWriteOperation};
use crate::connection::Connection;
use crate::error::Error;
use crate::expression::UpdateBody;
use crate::options::{CreateOptions, DeleteOptions, FindOneOptions, FindOptions, PartitionKey, UpdateOptions};
use crate::schema::DynamoEntity;
use crate::transformer::{EntityTransformer, PendingWrite, RequestTransformer};

/// Single entity operations
#[derive(Clone, Debug)]
pub struct EntityManager {
    connection: Connection,
}

impl EntityManager {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    fn transformer<T: DynamoEntity>(&self) -> Result<RequestTransformer, Error> {
        Ok(RequestTransformer::new(self.connection.registry().get::<T>()?))
    }

    /// Write a new entity and return it with defaults and generated values applied.
    ///
    /// Fails with a conditional check error when an item with the same primary key, or
    /// the same value of a unique attribute, already exists.
    pub async fn create<T: DynamoEntity>(&self, entity: &T, options: CreateOptions) -> Result<T, Error> {
        let transformer = self.transformer::<T>()?;
        let attributes: Item = serde_dynamo::to_item(entity)?;
        let (main, unique_records) = transformer.create_operations(attributes, &options)?;
        let item = main.item.clone();

        if unique_records.is_empty() {
            tracing::debug!(entity = %transformer.metadata().name, "create");
            self.connection.store().put_item(main).await?;
        } else {
            let mut operations = Vec::with_capacity(1 + unique_records.len());
            operations.push(TransactWriteOperation::Put(main));
            operations.extend(unique_records);
            execute_write(&self.connection, vec![PendingWrite::Direct(operations)]).await?;
        }

        EntityTransformer::new(transformer.metadata()).to_entity(item)
    }

    /// Read one entity by its primary key attributes
    pub async fn find_one<T: DynamoEntity>(&self, primary_key: &Item, options: FindOneOptions) -> Result<Option<T>, Error> {
        let transformer = self.transformer::<T>()?;
        let input = transformer.to_get(primary_key, &options)?;
        match self.connection.store().get_item(input).await? {
            Some(item) => Ok(Some(EntityTransformer::new(transformer.metadata()).to_entity(item)?)),
            None => Ok(None),
        }
    }

    /// True when an entity with these attributes exists.
    ///
    /// `attributes` is either a single unique attribute, looked up through its
    /// enforcement record, or the primary key attributes.
    pub async fn exists<T: DynamoEntity>(&self, attributes: &Item) -> Result<bool, Error> {
        let transformer = self.transformer::<T>()?;
        let metadata = transformer.metadata();
        let entity = EntityTransformer::new(metadata);

        let unique_key = match attributes.iter().next() {
            Some((name, value)) if attributes.len() == 1 => entity.unique_record(name, value)?,
            _ => None,
        };
        let key = match unique_key {
            Some(key) => key,
            None => entity.primary_key(attributes)?,
        };

        let input = GetItemInput {
            table_name: metadata.table.name.clone(),
            key,
            ..Default::default()
        };
        Ok(self.connection.store().get_item(input).await?.is_some())
    }

    /// Apply `body` to an existing entity and return the updated entity
    pub async fn update<T: DynamoEntity>(
        &self,
        primary_key: &Item,
        body: &UpdateBody,
        options: UpdateOptions,
    ) -> Result<T, Error> {
        let transformer = self.transformer::<T>()?;
        let metadata = transformer.metadata();
        let write = transformer.to_update(primary_key, body, &options)?;

        let updated = match write {
            PendingWrite::Direct(mut operations) if operations.len() == 1 => match operations.pop() {
                Some(TransactWriteOperation::Update(update)) => {
                    tracing::debug!(entity = %metadata.name, "update");
                    self.connection.store().update_item(update).await?
                }
                _ => None,
            },
            write => {
                execute_write(&self.connection, vec![write]).await?;
                let input = transformer.to_get(
                    primary_key,
                    &FindOneOptions {
                        consistent_read: true,
                        ..Default::default()
                    },
                )?;
                self.connection.store().get_item(input).await?
            }
        };

        match updated {
            Some(item) => EntityTransformer::new(metadata).to_entity(item),
            None => Err(Error::EntityNotFound(metadata.name.clone())),
        }
    }

    /// Delete an entity and release its unique values
    pub async fn delete<T: DynamoEntity>(&self, primary_key: &Item, options: DeleteOptions) -> Result<(), Error> {
        let transformer = self.transformer::<T>()?;
        match transformer.to_delete(primary_key, &options)? {
            PendingWrite::Direct(mut operations) if operations.len() == 1 => {
                if let Some(TransactWriteOperation::Delete(delete)) = operations.pop() {
                    tracing::debug!(entity = %transformer.metadata().name, "delete");
                    self.connection.store().delete_item(delete).await?;
                }
                Ok(())
            }
            write => execute_write(&self.connection, vec![write]).await,
        }
    }

    /// Query entities of one partition, following cursors until the limit is reached
    pub async fn find<T: DynamoEntity>(&self, partition: &PartitionKey, options: FindOptions) -> Result<FindOutput<T>, Error> {
        let transformer = self.transformer::<T>()?;
        let query = transformer.to_query(partition, &options)?;
        let limit = options
            .limit
            .unwrap_or(self.connection.config().default_query_limit);
        let accumulated = self.query_pages(query, limit, &options, Collect::Items).await?;

        let entity = EntityTransformer::new(transformer.metadata());
        let items = accumulated
            .items
            .into_iter()
            .map(|item| entity.to_entity(item))
            .collect::<Result<Vec<T>, _>>()?;
        Ok(FindOutput {
            items,
            cursor: accumulated.cursor,
        })
    }

    /// Count entities of one partition.
    ///
    /// Items are counted page by page and not kept. Without `limit` every page is read,
    /// the connection's `default_query_limit` does not apply; `meta_limit` still does.
    pub async fn count<T: DynamoEntity>(&self, partition: &PartitionKey, options: FindOptions) -> Result<usize, Error> {
        let transformer = self.transformer::<T>()?;
        let query = transformer.to_query(partition, &options)?;
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(self.query_pages(query, limit, &options, Collect::Count).await?.count)
    }

    async fn query_pages(
        &self,
        query: QueryInput,
        limit: usize,
        options: &FindOptions,
        collect: Collect,
    ) -> Result<Accumulated, Error> {
        let store = self.connection.store().clone();

        let accumulated = paginate(limit, options.meta_limit, query.exclusive_start_key.clone(), collect, |cursor, page_size| {
            let store = store.clone();
            let input = QueryInput {
                limit: Some(page_size),
                exclusive_start_key: cursor,
                ..query.clone()
            };
            async move { store.query(input).await }
        })
        .await?;

        tracing::debug!(
            table = %query.table_name,
            index = query.index_name.as_deref().unwrap_or_default(),
            pages = accumulated.pages,
            items = accumulated.count,
            "query"
        );
        Ok(accumulated)
    }
}
