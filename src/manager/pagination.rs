use std::future::Future;

use crate::Item;
use crate::client::PageOutput;
use crate::error::Error;
use crate::options::MetaLimit;

/// What to keep of the pages read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Collect {
    /// Keep every item
    Items,
    /// Count items and drop them
    Count,
}

/// Items accumulated over several pages
#[derive(Debug, Default)]
pub(crate) struct Accumulated {
    pub(crate) items: Vec<Item>,
    /// Items read, kept or not
    pub(crate) count: usize,
    pub(crate) cursor: Option<Item>,
    pub(crate) pages: usize,
}

/// Fetch pages until `limit` items are accumulated, the store has no more pages or
/// `meta_limit` trips.
///
/// `fetch` receives the cursor to continue from and the page size.
pub(crate) async fn paginate<F, Fut>(
    limit: usize,
    meta_limit: Option<MetaLimit>,
    cursor: Option<Item>,
    collect: Collect,
    mut fetch: F,
) -> Result<Accumulated, Error>
where
    F: FnMut(Option<Item>, i32) -> Fut,
    Fut: Future<Output = Result<PageOutput, Error>>,
{
    let mut accumulated = Accumulated {
        cursor,
        ..Default::default()
    };
    let mut consumed_capacity = 0.0;
    let mut scanned_count = 0;

    loop {
        let remaining = limit.saturating_sub(accumulated.count);
        if remaining == 0 {
            break;
        }
        let page_size = i32::try_from(remaining).unwrap_or(i32::MAX);
        let page = fetch(accumulated.cursor.take(), page_size).await?;
        accumulated.pages += 1;

        consumed_capacity += page.consumed_capacity.unwrap_or_default();
        scanned_count += page.scanned_count;
        let taken = page.items.len().min(remaining);
        accumulated.count += taken;
        if collect == Collect::Items {
            accumulated.items.extend(page.items.into_iter().take(taken));
        }
        accumulated.cursor = page.last_evaluated_key;

        if accumulated.cursor.is_none() {
            break;
        }
        let tripped = match meta_limit {
            Some(MetaLimit::ConsumedCapacity(max)) => consumed_capacity >= max,
            Some(MetaLimit::ScannedCount(max)) => scanned_count >= max,
            None => false,
        };
        if tripped {
            tracing::debug!(
                pages = accumulated.pages,
                consumed_capacity,
                scanned_count,
                "pagination meta limit reached"
            );
            break;
        }
    }

    Ok(accumulated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::AttributeValue;
    use std::sync::Mutex;

    fn page(ids: &[&str], next: Option<&str>, capacity: f64) -> PageOutput {
        let item = |id: &str| Item::from([("PK".to_string(), AttributeValue::S(id.to_string()))]);
        PageOutput {
            items: ids.iter().map(|id| item(*id)).collect(),
            last_evaluated_key: next.map(item),
            scanned_count: ids.len(),
            consumed_capacity: Some(capacity),
        }
    }

    #[tokio::test]
    async fn test_stops_without_cursor() {
        let pages = Mutex::new(vec![page(&["3"], None, 1.0), page(&["1", "2"], Some("2"), 1.0)]);
        let result = paginate(10, None, None, Collect::Items, |_, _| {
            let next = pages.lock().unwrap().pop().unwrap();
            async move { Ok(next) }
        })
        .await
        .unwrap();
        assert_eq!(result.items.len(), 3);
        assert_eq!(result.pages, 2);
        assert!(result.cursor.is_none());
    }

    #[tokio::test]
    async fn test_stops_at_limit_and_requests_remaining() {
        let sizes = Mutex::new(Vec::new());
        let result = paginate(3, None, None, Collect::Items, |_, size| {
            sizes.lock().unwrap().push(size);
            async move { Ok(page(&["1", "2"], Some("2"), 1.0)) }
        })
        .await
        .unwrap();
        assert_eq!(result.items.len(), 3);
        assert_eq!(*sizes.lock().unwrap(), vec![3, 1]);
        assert!(result.cursor.is_some());
    }

    #[tokio::test]
    async fn test_scanned_count_meta_limit() {
        let result = paginate(100, Some(MetaLimit::ScannedCount(4)), None, Collect::Items, |_, _| async {
            Ok(page(&["1", "2"], Some("2"), 0.5))
        })
        .await
        .unwrap();
        assert_eq!(result.pages, 2);
        assert_eq!(result.items.len(), 4);
    }

    #[tokio::test]
    async fn test_resumes_from_cursor() {
        let start = Item::from([("PK".to_string(), AttributeValue::S("9".into()))]);
        let seen = Mutex::new(None);
        let _ = paginate(1, None, Some(start.clone()), Collect::Items, |cursor, _| {
            *seen.lock().unwrap() = cursor;
            async { Ok(page(&["10"], None, 1.0)) }
        })
        .await
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(start));
    }

    #[tokio::test]
    async fn test_count_drops_items() {
        let pages = Mutex::new(vec![page(&["3"], None, 1.0), page(&["1", "2"], Some("2"), 1.0)]);
        let result = paginate(usize::MAX, None, None, Collect::Count, |_, size| {
            assert_eq!(size, i32::MAX);
            let next = pages.lock().unwrap().pop().unwrap();
            async move { Ok(next) }
        })
        .await
        .unwrap();
        assert_eq!(result.count, 3);
        assert!(result.items.is_empty());
    }
}
