use super::options::Start;
use super::{Adapter, QueryOptions, ResultPage, ScanOptions};
use crate::config::DecodeErrorPolicy;
use crate::context::{Context, RateLimiter};
use crate::core::{Error, Result, Value};
use crate::cursor::Cursor;
use crate::schema::Entity;
use crate::store::{
    Item, KeyCondition, Page, QueryRequest, RangeBound, ScanRequest, StoreClient, StoreResult,
};
use log::warn;
use std::sync::Arc;

/// A query or scan request that can be re-sent from successive start keys.
enum Walk {
    Query(QueryRequest),
    Scan(ScanRequest),
}

impl Walk {
    fn index(&self) -> Option<&str> {
        match self {
            Self::Query(request) => request.index.as_deref(),
            Self::Scan(request) => request.index.as_deref(),
        }
    }

    fn has_filter(&self) -> bool {
        match self {
            Self::Query(request) => request.filter.is_some(),
            Self::Scan(request) => request.filter.is_some(),
        }
    }

    fn resume_from(&mut self, key: Item) {
        match self {
            Self::Query(request) => request.exclusive_start_key = Some(key),
            Self::Scan(request) => request.exclusive_start_key = Some(key),
        }
    }

    /// Never ask the store to evaluate more than `limit` items per call.
    fn cap_limit(&mut self, limit: usize) {
        let slot = match self {
            Self::Query(request) => &mut request.limit,
            Self::Scan(request) => &mut request.limit,
        };
        *slot = Some(slot.map_or(limit, |page_size| page_size.min(limit)));
    }

    async fn send(&self, client: &dyn StoreClient) -> StoreResult<Page> {
        match self {
            Self::Query(request) => client.query(request.clone()).await,
            Self::Scan(request) => client.scan(request.clone()).await,
        }
    }
}

/// Limits applied while handing items to the visitor.
struct Delivery {
    limit: Option<usize>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
}

impl<E: Entity> Adapter<E> {
    /// Visits entities whose `index` hash key equals `hash`, in range order.
    ///
    /// `index` is `None` for the base table. The visitor gets each entity and
    /// whether it is the last one; returning `false` stops the walk without
    /// fetching further pages. "Last" is only known when the store reports
    /// no further pages, or when `limit` is reached.
    pub async fn query<F>(
        &self,
        ctx: &Context,
        index: Option<&str>,
        hash: impl Into<Value>,
        options: QueryOptions,
        visitor: F,
    ) -> Result<()>
    where
        F: FnMut(E, bool) -> bool,
    {
        let hash = hash.into();
        self.traced("query", async {
            let (walk, delivery) = self.query_walk(index, hash, options)?;
            self.walk(ctx, walk, delivery, visitor).await
        })
        .await
    }

    /// Collects every entity a query yields.
    pub async fn query_all(
        &self,
        ctx: &Context,
        index: Option<&str>,
        hash: impl Into<Value>,
        options: QueryOptions,
    ) -> Result<Vec<E>> {
        let mut out = Vec::new();
        self.query(ctx, index, hash, options, |entity, _| {
            out.push(entity);
            true
        })
        .await?;
        Ok(out)
    }

    /// Fetches a single page of a query, with the cursor to continue from.
    pub async fn query_page(
        &self,
        ctx: &Context,
        index: Option<&str>,
        hash: impl Into<Value>,
        options: QueryOptions,
    ) -> Result<ResultPage<E>> {
        let hash = hash.into();
        self.traced("query_page", async {
            let (walk, delivery) = self.query_walk(index, hash, options)?;
            self.single_page(ctx, walk, delivery.limit).await
        })
        .await
    }

    /// Unordered walk over the whole table, or a whole index.
    ///
    /// Same visitor contract as [`query`](Self::query).
    pub async fn scan<F>(&self, ctx: &Context, options: ScanOptions, visitor: F) -> Result<()>
    where
        F: FnMut(E, bool) -> bool,
    {
        self.traced("scan", async {
            let (walk, delivery) = self.scan_walk(options)?;
            self.walk(ctx, walk, delivery, visitor).await
        })
        .await
    }

    pub async fn scan_all(&self, ctx: &Context, options: ScanOptions) -> Result<Vec<E>> {
        let mut out = Vec::new();
        self.scan(ctx, options, |entity, _| {
            out.push(entity);
            true
        })
        .await?;
        Ok(out)
    }

    pub async fn scan_page(&self, ctx: &Context, options: ScanOptions) -> Result<ResultPage<E>> {
        self.traced("scan_page", async {
            let (walk, delivery) = self.scan_walk(options)?;
            self.single_page(ctx, walk, delivery.limit).await
        })
        .await
    }

    /// Cursor that resumes `index` right after `entity`.
    pub fn cursor_after(&self, index: Option<&str>, entity: &E) -> Result<Cursor> {
        Cursor::starting_after(&self.keys(), index, &entity.to_record())
    }

    fn query_walk(
        &self,
        index: Option<&str>,
        hash: Value,
        options: QueryOptions,
    ) -> Result<(Walk, Delivery)> {
        options.validate()?;
        let keys = self.keys();
        let schema = self.descriptor().key_schema(index)?;

        let range = match &options.start {
            Start::AtRange(bound) => {
                let Some(range_attribute) = &schema.range else {
                    return Err(Error::InvalidOptions(format!(
                        "{} has no range attribute to start at",
                        index.unwrap_or("table")
                    )));
                };
                let value = keys.encode_part(range_attribute, bound)?;
                let bound = if options.descending {
                    RangeBound::AtMost(value)
                } else {
                    RangeBound::AtLeast(value)
                };
                Some((range_attribute.clone(), bound))
            }
            _ => None,
        };

        let request = QueryRequest {
            table: self.table.clone(),
            index: index.map(str::to_string),
            key_condition: KeyCondition {
                hash_attribute: schema.hash.clone(),
                hash_value: keys.encode_part(&schema.hash, &hash)?,
                range,
            },
            filter: options.filter.as_ref().and_then(|f| f.compile()),
            exclusive_start_key: self.start_key(index, &options.start)?,
            scan_forward: !options.descending,
            limit: self.config.page_size,
            consistent_read: options
                .consistent_read
                .unwrap_or(index.is_none() && self.config.consistent_reads),
        };

        Ok((
            Walk::Query(request),
            Delivery {
                limit: options.limit,
                rate_limiter: options.rate_limiter,
            },
        ))
    }

    fn scan_walk(&self, options: ScanOptions) -> Result<(Walk, Delivery)> {
        options.validate()?;
        let index = options.index.as_deref();
        if let Some(index) = index {
            self.descriptor().require_index(index)?;
        }

        let request = ScanRequest {
            table: self.table.clone(),
            index: options.index.clone(),
            filter: options.filter.as_ref().and_then(|f| f.compile()),
            exclusive_start_key: self.start_key(index, &options.start)?,
            limit: self.config.page_size,
            consistent_read: options
                .consistent_read
                .unwrap_or(index.is_none() && self.config.consistent_reads),
        };

        Ok((
            Walk::Scan(request),
            Delivery {
                limit: options.limit,
                rate_limiter: options.rate_limiter,
            },
        ))
    }

    fn start_key(&self, index: Option<&str>, start: &Start) -> Result<Option<Item>> {
        match start {
            Start::After(record) => {
                let cursor = Cursor::starting_after(&self.keys(), index, record)?;
                cursor.resolve(index).map(Some)
            }
            Start::Cursor(cursor) => cursor.resolve(index).map(Some),
            Start::Beginning | Start::AtRange(_) => Ok(None),
        }
    }

    /// Page-at-a-time iteration shared by query and scan.
    async fn walk<F>(&self, ctx: &Context, mut walk: Walk, delivery: Delivery, mut visitor: F) -> Result<()>
    where
        F: FnMut(E, bool) -> bool,
    {
        let mut yielded = 0usize;

        loop {
            ctx.check()?;
            let page = ctx
                .run(walk.send(self.client.as_ref()))
                .await?
                .map_err(Error::from_store)?;

            let Page {
                items,
                last_evaluated_key,
            } = page;

            if items.is_empty() {
                // An empty unfiltered page is the end. A filtered one only
                // means every item on it was filtered out.
                match last_evaluated_key {
                    Some(key) if walk.has_filter() => {
                        walk.resume_from(key);
                        continue;
                    }
                    _ => return Ok(()),
                }
            }

            let last_page = last_evaluated_key.is_none();
            let source = walk.index().unwrap_or(self.table.as_str());
            // Decoding one item ahead lets a skipped final item still leave
            // the last decodable one flagged as last.
            let mut entities = items
                .iter()
                .filter_map(|item| self.decode_or_skip(item, source).transpose())
                .peekable();

            while let Some(entity) = entities.next() {
                let entity = entity?;
                if let Some(limiter) = &delivery.rate_limiter {
                    ctx.run(limiter.acquire()).await?;
                }

                yielded += 1;
                let limit_reached = delivery.limit.is_some_and(|limit| yielded >= limit);
                let is_last = limit_reached || (last_page && entities.peek().is_none());
                if !visitor(entity, is_last) || limit_reached {
                    return Ok(());
                }
            }

            match last_evaluated_key {
                Some(key) => walk.resume_from(key),
                None => return Ok(()),
            }
        }
    }

    /// Fetches one page holding at most `limit` entities.
    ///
    /// When the page is cut short of what the store returned, the next
    /// cursor resumes right after the last entity kept.
    async fn single_page(
        &self,
        ctx: &Context,
        mut walk: Walk,
        limit: Option<usize>,
    ) -> Result<ResultPage<E>> {
        if let Some(limit) = limit {
            walk.cap_limit(limit);
        }
        let page = ctx
            .run(walk.send(self.client.as_ref()))
            .await?
            .map_err(Error::from_store)?;

        let mut items = Vec::with_capacity(page.items.len());
        let mut last_kept = None;
        let mut cut = false;
        for item in &page.items {
            if limit.is_some_and(|limit| items.len() >= limit) {
                cut = true;
                break;
            }
            let source = walk.index().unwrap_or(self.table.as_str());
            if let Some(entity) = self.decode_or_skip(item, source)? {
                items.push(entity);
                last_kept = Some(item);
            }
        }

        let resume_from = match (cut, last_kept) {
            (true, Some(item)) => Some(item),
            _ => page.last_evaluated_key.as_ref(),
        };
        let next = match resume_from {
            Some(key) => Some(Cursor::build(&self.keys(), walk.index(), key)?),
            None => None,
        };
        Ok(ResultPage { items, next })
    }

    /// Decodes an item, or logs and returns `None` under `DecodeErrorPolicy::Skip`.
    fn decode_or_skip(&self, item: &Item, source: &str) -> Result<Option<E>> {
        match self.items().decode_entity(item) {
            Ok(entity) => Ok(Some(entity)),
            Err(err) if self.config.decode_errors == DecodeErrorPolicy::Skip => {
                warn!(
                    "skipping undecodable {} item on {}: {}",
                    self.descriptor().name(),
                    source,
                    err
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
