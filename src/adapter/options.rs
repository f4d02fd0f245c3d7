use crate::condition::Condition;
use crate::context::RateLimiter;
use crate::core::{Error, Record, Result, Value};
use crate::cursor::Cursor;
use crate::schema::Entity;
use std::fmt;
use std::sync::Arc;

/// Where a walk resumes. At most one may be given.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) enum Start {
    #[default]
    Beginning,
    /// Inclusive bound on the range attribute (queries only).
    AtRange(Value),
    /// Exclusive: resume after this entity.
    After(Record),
    Cursor(Cursor),
}

impl Start {
    fn describe(&self) -> &'static str {
        match self {
            Self::Beginning => "beginning",
            Self::AtRange(_) => "range bound",
            Self::After(_) => "starting-after entity",
            Self::Cursor(_) => "cursor",
        }
    }
}

fn set_start(slot: &mut Start, conflict: &mut Option<String>, start: Start) {
    if *slot != Start::Beginning && conflict.is_none() {
        *conflict = Some(format!(
            "cannot combine a {} with a {}",
            slot.describe(),
            start.describe()
        ));
    }
    *slot = start;
}

#[derive(Clone, Default)]
pub struct QueryOptions {
    pub(crate) descending: bool,
    pub(crate) start: Start,
    pub(crate) limit: Option<usize>,
    pub(crate) consistent_read: Option<bool>,
    pub(crate) filter: Option<Condition>,
    pub(crate) rate_limiter: Option<Arc<dyn RateLimiter>>,
    conflict: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Order by the range attribute, highest first.
    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Start at this range value, inclusive.
    pub fn start_at(mut self, range: impl Into<Value>) -> Self {
        set_start(&mut self.start, &mut self.conflict, Start::AtRange(range.into()));
        self
    }

    /// Resume strictly after `entity`.
    pub fn starting_after<E: Entity>(mut self, entity: &E) -> Self {
        set_start(&mut self.start, &mut self.conflict, Start::After(entity.to_record()));
        self
    }

    pub fn cursor(mut self, cursor: Cursor) -> Self {
        set_start(&mut self.start, &mut self.conflict, Start::Cursor(cursor));
        self
    }

    /// Stop after yielding this many items.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = Some(consistent);
        self
    }

    pub fn filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(conflict) = &self.conflict {
            return Err(Error::InvalidOptions(conflict.clone()));
        }
        if self.limit == Some(0) {
            return Err(Error::InvalidOptions("limit must be > 0".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("descending", &self.descending)
            .field("start", &self.start)
            .field("limit", &self.limit)
            .field("consistent_read", &self.consistent_read)
            .field("filter", &self.filter)
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct ScanOptions {
    pub(crate) index: Option<String>,
    pub(crate) start: Start,
    pub(crate) limit: Option<usize>,
    pub(crate) consistent_read: Option<bool>,
    pub(crate) filter: Option<Condition>,
    pub(crate) rate_limiter: Option<Arc<dyn RateLimiter>>,
    conflict: Option<String>,
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk a secondary index instead of the table.
    pub fn index(mut self, index: &str) -> Self {
        self.index = Some(index.to_string());
        self
    }

    pub fn starting_after<E: Entity>(mut self, entity: &E) -> Self {
        set_start(&mut self.start, &mut self.conflict, Start::After(entity.to_record()));
        self
    }

    pub fn cursor(mut self, cursor: Cursor) -> Self {
        set_start(&mut self.start, &mut self.conflict, Start::Cursor(cursor));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = Some(consistent);
        self
    }

    pub fn filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(conflict) = &self.conflict {
            return Err(Error::InvalidOptions(conflict.clone()));
        }
        if self.limit == Some(0) {
            return Err(Error::InvalidOptions("limit must be > 0".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOptions")
            .field("index", &self.index)
            .field("start", &self.start)
            .field("limit", &self.limit)
            .field("consistent_read", &self.consistent_read)
            .field("filter", &self.filter)
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish()
    }
}

/// One page fetched with `query_page` / `scan_page`.
#[derive(Debug, Clone)]
pub struct ResultPage<E> {
    pub items: Vec<E>,
    /// Resumes after this page; `None` once the store has nothing further.
    pub next: Option<Cursor>,
}
