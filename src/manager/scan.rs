use futures_util::StreamExt;
use tokio_stream::{self as stream};

use super::FindOutput;
use super::pagination::{Accumulated, Collect, paginate};
use super::to_logical_item;
use crate::Item;
use crate::client::ScanInput;
use crate::connection::Connection;
use crate::error::Error;
use crate::options::ScanOptions;
use crate::schema::DynamoEntity;
use crate::transformer::{EntityTransformer, LogicalItem, RequestTransformer, to_scan_input};

/// Items of a table scan
#[derive(Clone, Debug, PartialEq)]
pub struct ScanOutput {
    /// Items attributed to their entity where possible
    pub items: Vec<LogicalItem>,
    /// Cursor to continue from, `None` when there is nothing left
    pub cursor: Option<Item>,
}

/// Table and entity scans
#[derive(Clone, Debug)]
pub struct ScanManager {
    connection: Connection,
}

impl ScanManager {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Scan the whole table, whatever entity the items belong to
    pub async fn scan(&self, options: ScanOptions) -> Result<ScanOutput, Error> {
        let input = to_scan_input(self.connection.scan_table()?, None, &options)?;
        let accumulated = self.scan_pages(input, self.limit(&options), &options, Collect::Items).await?;
        self.to_output(accumulated)
    }

    /// Scan items of entity `T`
    pub async fn find<T: DynamoEntity>(&self, options: ScanOptions) -> Result<FindOutput<T>, Error> {
        let metadata = self.connection.registry().get::<T>()?;
        let input = RequestTransformer::new(metadata.clone()).to_scan(&options)?;
        let accumulated = self.scan_pages(input, self.limit(&options), &options, Collect::Items).await?;

        let entity = EntityTransformer::new(&metadata);
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

    /// Count items of entity `T`.
    ///
    /// Items are counted page by page and not kept. Without `limit` the whole table is
    /// read, the connection's `default_query_limit` does not apply.
    pub async fn count<T: DynamoEntity>(&self, options: ScanOptions) -> Result<usize, Error> {
        let metadata = self.connection.registry().get::<T>()?;
        let input = RequestTransformer::new(metadata).to_scan(&options)?;
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(self.scan_pages(input, limit, &options, Collect::Count).await?.count)
    }

    /// Scan `total_segments` segments of the table concurrently.
    ///
    /// Every segment is read to its end or to the item limit; results are not ordered.
    pub async fn parallel_scan(&self, total_segments: i32, options: ScanOptions) -> Result<Vec<LogicalItem>, Error> {
        let table = self.connection.scan_table()?;
        let segments = (0..total_segments.max(1))
            .map(|segment| {
                let options = ScanOptions {
                    segment: Some(segment),
                    total_segments: Some(total_segments.max(1)),
                    cursor: None,
                    ..options.clone()
                };
                to_scan_input(table, None, &options).map(|input| (input, options))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let concurrency = segments
            .len()
            .min(self.connection.config().max_concurrency)
            .max(1);
        tracing::debug!(segments = segments.len(), concurrency, "parallel scan");

        let results: Vec<Result<Accumulated, Error>> =
            stream::iter(segments.into_iter().map(|(input, options)| async move {
                self.scan_pages(input, self.limit(&options), &options, Collect::Items).await
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let registry = self.connection.registry();
        let mut items = Vec::new();
        for result in results {
            for item in result?.items {
                items.push(to_logical_item(registry, item)?);
            }
        }
        Ok(items)
    }

    fn to_output(&self, accumulated: Accumulated) -> Result<ScanOutput, Error> {
        let registry = self.connection.registry();
        let items = accumulated
            .items
            .into_iter()
            .map(|item| to_logical_item(registry, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScanOutput {
            items,
            cursor: accumulated.cursor,
        })
    }

    fn limit(&self, options: &ScanOptions) -> usize {
        options
            .limit
            .unwrap_or(self.connection.config().default_query_limit)
    }

    async fn scan_pages(
        &self,
        scan: ScanInput,
        limit: usize,
        options: &ScanOptions,
        collect: Collect,
    ) -> Result<Accumulated, Error> {
        let store = self.connection.store().clone();

        let accumulated = paginate(limit, options.meta_limit, scan.exclusive_start_key.clone(), collect, |cursor, page_size| {
            let store = store.clone();
            let input = ScanInput {
                limit: Some(page_size),
                exclusive_start_key: cursor,
                ..scan.clone()
            };
            async move { store.scan(input).await }
        })
        .await?;

        tracing::debug!(
            table = %scan.table_name,
            segment = scan.segment,
            pages = accumulated.pages,
            items = accumulated.count,
            "scan"
        );
        Ok(accumulated)
    }
}
