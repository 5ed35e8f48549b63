//! Shared page loop for query and scan

use tracing::{debug, warn};

use super::retry::with_retry;
use super::Fetcher;
use crate::config::PageLimitMode;
use crate::errors::{AdapterError, AdapterResult};
use crate::store::{Page, QueryRequest, ScanRequest};
use crate::value::Item;

/// A request that can be resumed from a continuation token
enum Paged {
    Query(QueryRequest),
    Scan(ScanRequest),
}

impl Paged {
    fn resume_from(&mut self, key: Option<Item>) {
        match self {
            Paged::Query(r) => r.exclusive_start_key = key,
            Paged::Scan(r) => r.exclusive_start_key = key,
        }
    }

    fn set_limit(&mut self, limit: Option<usize>) {
        match self {
            Paged::Query(r) => r.limit = limit,
            Paged::Scan(r) => r.limit = limit,
        }
    }

    fn set_count_only(&mut self) {
        match self {
            Paged::Query(r) => r.count_only = true,
            Paged::Scan(r) => r.count_only = true,
        }
    }

    fn table(&self) -> &str {
        match self {
            Paged::Query(r) => &r.table,
            Paged::Scan(r) => &r.table,
        }
    }
}

impl<'a> Fetcher<'a> {
    /// Runs a query to completion or until `limit` items are collected.
    pub async fn query(&self, request: QueryRequest, limit: Option<usize>) -> AdapterResult<Vec<Item>> {
        self.collect(Paged::Query(request), limit).await
    }

    /// Runs a scan to completion or until `limit` items are collected.
    pub async fn scan(&self, request: ScanRequest, limit: Option<usize>) -> AdapterResult<Vec<Item>> {
        self.collect(Paged::Scan(request), limit).await
    }

    /// Sums the per-page counts of a query.
    pub async fn query_count(&self, request: QueryRequest) -> AdapterResult<usize> {
        self.count(Paged::Query(request)).await
    }

    /// Sums the per-page counts of a scan.
    pub async fn scan_count(&self, request: ScanRequest) -> AdapterResult<usize> {
        self.count(Paged::Scan(request)).await
    }

    async fn collect(&self, mut request: Paged, limit: Option<usize>) -> AdapterResult<Vec<Item>> {
        let mut items: Vec<Item> = Vec::new();
        let mut pages = 0usize;

        if limit == Some(0) {
            return Ok(items);
        }

        loop {
            if let Some(limit) = limit {
                request.set_limit(Some(limit - items.len()));
            }
            let page = self.fetch_page(&request).await?;
            pages += 1;
            items.extend(page.items);

            if let Some(limit) = limit {
                if items.len() >= limit {
                    items.truncate(limit);
                    break;
                }
            }
            match page.last_evaluated_key {
                None => break,
                Some(key) => {
                    self.check_page_budget(pages, request.table())?;
                    request.resume_from(Some(key));
                }
            }
        }

        debug!(
            table = request.table(),
            pages,
            items = items.len(),
            "fetch complete"
        );
        Ok(items)
    }

    async fn count(&self, mut request: Paged) -> AdapterResult<usize> {
        request.set_count_only();
        let mut total = 0usize;
        let mut pages = 0usize;

        loop {
            let page = self.fetch_page(&request).await?;
            pages += 1;
            total += page.count;
            match page.last_evaluated_key {
                None => break,
                Some(key) => {
                    self.check_page_budget(pages, request.table())?;
                    request.resume_from(Some(key));
                }
            }
        }

        debug!(table = request.table(), pages, total, "count complete");
        Ok(total)
    }

    /// Errors when another page would exceed the budget in `Throw` mode.
    fn check_page_budget(&self, pages: usize, table: &str) -> AdapterResult<()> {
        if pages < self.config.max_pages {
            return Ok(());
        }
        match self.config.page_limit_mode {
            PageLimitMode::Throw => Err(AdapterError::scan_page_limit(self.config.max_pages)),
            PageLimitMode::Unbounded => {
                if pages == self.config.max_pages {
                    warn!(
                        table,
                        max_pages = self.config.max_pages,
                        "page budget exhausted, continuing unbounded"
                    );
                }
                Ok(())
            }
        }
    }

    async fn fetch_page(&self, request: &Paged) -> AdapterResult<Page> {
        let retry = &self.config.retry;
        match request {
            Paged::Query(r) => {
                with_retry(retry, self.stats, "query", || {
                    self.stats.increment_query_requests();
                    self.client.query(r.clone())
                })
                .await
            }
            Paged::Scan(r) => {
                with_retry(retry, self.stats, "scan", || {
                    self.stats.increment_scan_requests();
                    self.client.scan(r.clone())
                })
                .await
            }
        }
    }
}
