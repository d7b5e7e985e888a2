//! Lazy, pull-based traversal of cursor-paginated listings.
//!
//! A [`PageStream`] fetches the first page on the first pull and follows each
//! page's absolute `next` URL until a page has none. Pages are fetched one at
//! a time; each fetch still goes through the scheduler's admission control.

use std::collections::VecDeque;

use futures::Stream;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use gobracket_shared::{GoBracketError, Page, Result};

use crate::request::Request;
use crate::scheduler::Scheduler;

/// Entry point for paginated listings on top of a [`Scheduler`].
#[derive(Debug, Clone, Copy)]
pub struct PaginatedFetcher<'a> {
    scheduler: &'a Scheduler,
}

impl<'a> PaginatedFetcher<'a> {
    pub fn new(scheduler: &'a Scheduler) -> Self {
        Self { scheduler }
    }

    /// Start a fresh traversal at the first page of `request`.
    ///
    /// Nothing is fetched until the first pull.
    pub fn stream<T: DeserializeOwned>(&self, request: Request) -> PageStream<'a, T> {
        PageStream {
            scheduler: self.scheduler,
            cursor: Cursor::First(request),
            buffer: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    /// Continue a listing from a page the caller already fetched.
    ///
    /// `page`'s records are yielded first, then its `next` link is followed.
    pub fn resume<T: DeserializeOwned>(&self, page: Page<T>) -> Result<PageStream<'a, T>> {
        let cursor = match page.next.as_deref() {
            Some(next) => Cursor::Next(parse_next(next)?),
            None => Cursor::Done,
        };
        Ok(PageStream {
            scheduler: self.scheduler,
            cursor,
            buffer: page.results.into(),
            pages_fetched: 1,
        })
    }
}

fn parse_next(next: &str) -> Result<Url> {
    Url::parse(next).map_err(|e| GoBracketError::parse(format!("invalid next link '{next}': {e}")))
}

/// Where the next page comes from.
#[derive(Debug)]
enum Cursor {
    First(Request),
    Next(Url),
    Done,
}

/// Records of a paginated listing, pulled one at a time.
#[derive(Debug)]
pub struct PageStream<'a, T> {
    scheduler: &'a Scheduler,
    cursor: Cursor,
    buffer: VecDeque<T>,
    pages_fetched: usize,
}

impl<'a, T: DeserializeOwned> PageStream<'a, T> {
    /// Whether buffered records or unfetched pages remain.
    pub fn has_more(&self) -> bool {
        !self.buffer.is_empty() || !matches!(self.cursor, Cursor::Done)
    }

    /// Pages fetched so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Next record in page order, fetching further pages as needed.
    ///
    /// After an error the traversal is finished; later pulls return `Ok(None)`.
    pub async fn next_record(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }

            let body = match std::mem::replace(&mut self.cursor, Cursor::Done) {
                Cursor::First(request) => self.scheduler.call(&request).await?,
                Cursor::Next(url) => self.scheduler.call_url(&url).await?,
                Cursor::Done => return Ok(None),
            };

            let page: Page<T> = serde_json::from_value(body)
                .map_err(|e| GoBracketError::parse(format!("malformed page: {e}")))?;
            self.pages_fetched += 1;

            debug!(
                page = self.pages_fetched,
                records = page.results.len(),
                has_next = page.next.is_some(),
                "page fetched"
            );

            if let Some(next) = page.next.as_deref() {
                self.cursor = Cursor::Next(parse_next(next)?);
            }

            self.buffer.extend(page.results);
        }
    }

    /// Drain every page.
    #[instrument(skip_all)]
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// First record matching `predicate`; stops fetching once found.
    pub async fn find(mut self, mut predicate: impl FnMut(&T) -> bool) -> Result<Option<T>> {
        while let Some(record) = self.next_record().await? {
            if predicate(&record) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Adapt into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + 'a
    where
        T: 'a,
    {
        futures::stream::try_unfold(self, |mut pages| async move {
            let record = pages.next_record().await?;
            Ok::<_, GoBracketError>(record.map(|record| (record, pages)))
        })
    }
}
