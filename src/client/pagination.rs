//! Lazy iteration over paginated collections.

use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::SynclineError;

use super::request::RequestSpec;
use super::ApiClient;

/// One page of a collection, in provider order.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `false` once the provider signals the last page.
    pub has_more: bool,
    /// Provider continuation (cursor, `nextUri`, `nextRecordsUrl`).
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self {
            items,
            has_more,
            next: None,
        }
    }

    /// A page whose only end-of-collection signal is its size.
    pub fn sized(items: Vec<T>) -> Self {
        Self::new(items, true)
    }

    pub fn with_next(mut self, next: Option<String>) -> Self {
        self.next = next.filter(|next| !next.is_empty());
        self
    }
}

/// Converts a decoded list response into a [`Page`].
pub trait IntoPage<T> {
    fn into_page(self) -> Result<Page<T>, SynclineError>;
}

impl<T> IntoPage<T> for Page<T> {
    fn into_page(self) -> Result<Page<T>, SynclineError> {
        Ok(self)
    }
}

/// Position handed to the request builder for each page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub page_size: usize,
    /// Zero-based page number.
    pub page_index: usize,
    /// Items received before this page.
    pub offset: usize,
    /// Continuation returned with the previous page.
    pub next: Option<String>,
}

impl PageCursor {
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size,
            page_index: 0,
            offset: 0,
            next: None,
        }
    }

    pub fn is_first(&self) -> bool {
        self.page_index == 0
    }

    fn advance(&self, received: usize, next: Option<String>) -> Self {
        Self {
            page_size: self.page_size,
            page_index: self.page_index + 1,
            offset: self.offset + received,
            next,
        }
    }
}

impl ApiClient {
    /// Stream every item of a paginated collection, one `execute` per page.
    ///
    /// `build` maps the cursor to the request for that page. Iteration stops
    /// after an empty page, a page shorter than `page_size`, or a page whose
    /// `has_more` is false. A full page always triggers one more fetch.
    /// Pass a `page_size` of 0 when the provider picks its own batch size, so
    /// only `has_more` ends the stream. The first error is yielded and ends
    /// the stream.
    ///
    /// # Example
    /// ```no_run
    /// use futures::TryStreamExt;
    /// use serde::Deserialize;
    /// use syncline::client::{ApiClient, IntoPage, Page, RequestSpec};
    /// use syncline::error::SynclineError;
    ///
    /// #[derive(Deserialize)]
    /// struct IdList {
    ///     ids: Vec<String>,
    /// }
    ///
    /// impl IntoPage<String> for IdList {
    ///     fn into_page(self) -> Result<Page<String>, SynclineError> {
    ///         Ok(Page::sized(self.ids))
    ///     }
    /// }
    ///
    /// # async fn example(client: ApiClient) -> syncline::error::Result<()> {
    /// let ids: Vec<String> = client
    ///     .iterate_pages::<String, IdList, _>(50, |cursor| {
    ///         RequestSpec::get("/ids")
    ///             .query("offset", cursor.offset)
    ///             .query("limit", cursor.page_size)
    ///     })
    ///     .try_collect()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn iterate_pages<'a, T, R, F>(
        &'a self,
        page_size: usize,
        build: F,
    ) -> BoxStream<'a, Result<T, SynclineError>>
    where
        T: Send + 'a,
        R: DeserializeOwned + IntoPage<T> + Send + 'a,
        F: FnMut(&PageCursor) -> RequestSpec + Send + 'a,
    {
        Box::pin(async_stream::stream! {
            let mut build = build;
            let mut cursor = PageCursor::first(page_size);
            loop {
                let spec = build(&cursor);
                let page = match self
                    .execute::<R>(spec)
                    .await
                    .and_then(|response| <R as IntoPage<T>>::into_page(response))
                {
                    Ok(page) => page,
                    Err(err) => {
                        yield Err(err);
                        break;
                    }
                };

                let received = page.items.len();
                let exhausted =
                    received == 0 || !page.has_more || (page_size > 0 && received < page_size);
                debug!(page = cursor.page_index, received, exhausted, "fetched page");

                let next = page.next;
                for item in page.items {
                    yield Ok(item);
                }
                if exhausted {
                    break;
                }
                cursor = cursor.advance(received, next);
            }
        })
    }
}
