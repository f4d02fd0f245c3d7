use super::{
    AttributeValue, BatchWriteOutput, BatchWriteRequest, CancellationReason, DeleteItemRequest,
    Expression, GetItemRequest, IndexSchema, Item, KeyCondition, MAX_BATCH_WRITE_ITEMS,
    MAX_TRANSACT_ITEMS, Page, Projection, PutItemRequest, QueryRequest, RangeBound, ScanRequest,
    StoreClient, StoreError, StoreResult, TableSchema, TransactWriteItem, WriteRequest,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::RwLock;

const DEFAULT_PAGE_SIZE: usize = 100;

/// Call counters, for asserting how an adapter drove the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub puts: usize,
    pub gets: usize,
    pub consistent_gets: usize,
    pub deletes: usize,
    pub queries: usize,
    pub scans: usize,
    pub batch_writes: usize,
    pub batch_items_applied: usize,
    pub transactions: usize,
}

#[derive(Debug, Default)]
struct FaultPlan {
    unprocessed_rounds: usize,
    throttled_calls: usize,
}

/// Primary or index position of an item, ordered the way the store pages.
#[derive(Debug, Clone)]
struct OrderedKey(Vec<AttributeValue>);

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

struct MemoryTable {
    schema: TableSchema,
    items: BTreeMap<OrderedKey, Item>,
}

impl MemoryTable {
    fn index(&self, name: Option<&str>) -> StoreResult<Option<&IndexSchema>> {
        match name {
            None => Ok(None),
            Some(name) => self.schema.index(name).map(Some).ok_or_else(|| {
                StoreError::ResourceNotFound(format!("{}/index/{}", self.schema.table_name, name))
            }),
        }
    }

    fn primary_key(&self, item: &Item) -> StoreResult<OrderedKey> {
        let mut parts = Vec::with_capacity(2);
        for name in self.schema.key_attributes() {
            match item.get(name) {
                Some(value) if value.is_key_value() => parts.push(value.clone()),
                Some(value) => {
                    return Err(StoreError::Validation(format!(
                        "key attribute '{}' has non-key type {}",
                        name,
                        value.type_tag()
                    )));
                }
                None => {
                    return Err(StoreError::Validation(format!(
                        "missing key attribute '{}'",
                        name
                    )));
                }
            }
        }
        Ok(OrderedKey(parts))
    }

    fn validate_index_attributes(&self, item: &Item) -> StoreResult<()> {
        for index in &self.schema.indexes {
            let names = std::iter::once(&index.hash_key).chain(index.range_key.iter());
            for name in names {
                if let Some(value) = item.get(name) {
                    if !value.is_key_value() && !value.is_null() {
                        return Err(StoreError::Validation(format!(
                            "index '{}' key attribute '{}' has non-key type {}",
                            index.name,
                            name,
                            value.type_tag()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Attribute names that identify an item's position in a table or index.
    fn position_attributes<'a>(&'a self, index: Option<&'a IndexSchema>) -> Vec<&'a str> {
        let mut names = Vec::with_capacity(4);
        if let Some(index) = index {
            names.push(index.hash_key.as_str());
            if let Some(range) = &index.range_key {
                names.push(range.as_str());
            }
        }
        for name in self.schema.key_attributes() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    fn position(&self, index: Option<&IndexSchema>, item: &Item) -> StoreResult<OrderedKey> {
        self.position_attributes(index)
            .into_iter()
            .map(|name| {
                item.get(name).cloned().ok_or_else(|| {
                    StoreError::Validation(format!(
                        "exclusive start key is missing attribute '{}'",
                        name
                    ))
                })
            })
            .collect::<StoreResult<Vec<_>>>()
            .map(OrderedKey)
    }

    fn is_indexed(index: &IndexSchema, item: &Item) -> bool {
        let present = |name: &String| item.get(name).is_some_and(|v| v.is_key_value());
        present(&index.hash_key) && index.range_key.as_ref().is_none_or(present)
    }

    fn project(&self, index: Option<&IndexSchema>, item: &Item) -> Item {
        let Some(index) = index else {
            return item.clone();
        };

        let keys = self.position_attributes(Some(index));
        let keep = |name: &str| match &index.projection {
            Projection::All => true,
            Projection::KeysOnly => keys.contains(&name),
            Projection::Include(extra) => keys.contains(&name) || extra.iter().any(|e| e == name),
        };

        item.iter()
            .filter(|(name, _)| keep(name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn continuation_key(&self, index: Option<&IndexSchema>, item: &Item) -> Item {
        self.position_attributes(index)
            .into_iter()
            .filter_map(|name| item.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }

    /// Cut one page out of `ordered`, honouring the start key, limit and filter.
    ///
    /// The limit counts evaluated items, so a filtered page may be empty
    /// while a continuation key is still returned.
    fn page(
        &self,
        index: Option<&IndexSchema>,
        ordered: Vec<(OrderedKey, &Item)>,
        forward: bool,
        exclusive_start_key: Option<&Item>,
        limit: usize,
        filter: Option<&Expression>,
    ) -> StoreResult<Page> {
        let start = match exclusive_start_key {
            Some(start_key) => {
                let after = self.position(index, start_key)?;
                ordered
                    .iter()
                    .position(|(key, _)| if forward { key > &after } else { key < &after })
                    .unwrap_or(ordered.len())
            }
            None => 0,
        };

        let end = (start + limit).min(ordered.len());
        let mut items = Vec::new();
        for (_, item) in &ordered[start..end] {
            let keep = match filter {
                Some(filter) => filter.evaluate(item)?,
                None => true,
            };
            if keep {
                items.push(self.project(index, item));
            }
        }

        let last_evaluated_key = if end < ordered.len() {
            Some(self.continuation_key(index, ordered[end - 1].1))
        } else {
            None
        };

        Ok(Page {
            items,
            last_evaluated_key,
        })
    }
}

fn range_matches(bound: &RangeBound, value: &AttributeValue) -> bool {
    let cmp = |other: &AttributeValue| value.compare(other);
    match bound {
        RangeBound::Equal(v) => cmp(v) == Some(Ordering::Equal),
        RangeBound::AtLeast(v) => cmp(v).is_some_and(|o| o != Ordering::Less),
        RangeBound::AtMost(v) => cmp(v).is_some_and(|o| o != Ordering::Greater),
        RangeBound::Between(lo, hi) => {
            cmp(lo).is_some_and(|o| o != Ordering::Less)
                && cmp(hi).is_some_and(|o| o != Ordering::Greater)
        }
        RangeBound::BeginsWith(prefix) => value.as_s().is_some_and(|s| s.starts_with(prefix.as_str())),
    }
}

/// In-process store with the paging, conditional-write and transaction
/// semantics of the remote service.
///
/// Reads are always strongly consistent. Faults can be injected to
/// exercise retry and throttling paths.
pub struct MemoryStore {
    tables: RwLock<HashMap<String, MemoryTable>>,
    page_size: usize,
    faults: Mutex<FaultPlan>,
    stats: Mutex<StoreStats>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            faults: Mutex::new(FaultPlan::default()),
            stats: Mutex::new(StoreStats::default()),
        }
    }

    /// Maximum items evaluated per query or scan call.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The next `rounds` batch writes each leave their last request unprocessed.
    pub fn fail_unprocessed_rounds(&self, rounds: usize) {
        self.faults_mut(|faults| faults.unprocessed_rounds = rounds);
    }

    /// The next `calls` store calls fail with `Throttled`.
    pub fn throttle_next(&self, calls: usize) {
        self.faults_mut(|faults| faults.throttled_calls = calls);
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Every item in `table`, in primary key order.
    pub async fn items(&self, table: &str) -> Vec<Item> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    fn faults_mut<R>(&self, f: impl FnOnce(&mut FaultPlan) -> R) -> R {
        let mut faults = self
            .faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut faults)
    }

    fn record(&self, f: impl FnOnce(&mut StoreStats)) {
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut stats);
    }

    fn admit(&self) -> StoreResult<()> {
        self.faults_mut(|faults| {
            if faults.throttled_calls > 0 {
                faults.throttled_calls -= 1;
                Err(StoreError::Throttled)
            } else {
                Ok(())
            }
        })
    }

    fn check_key_condition(
        index: Option<&IndexSchema>,
        schema: &TableSchema,
        condition: &KeyCondition,
    ) -> StoreResult<()> {
        let (hash, range) = match index {
            Some(index) => (&index.hash_key, index.range_key.as_ref()),
            None => (&schema.hash_key, schema.range_key.as_ref()),
        };

        if &condition.hash_attribute != hash {
            return Err(StoreError::Validation(format!(
                "key condition must address hash key '{}', got '{}'",
                hash, condition.hash_attribute
            )));
        }

        if let Some((name, _)) = &condition.range {
            if range != Some(name) {
                return Err(StoreError::Validation(format!(
                    "'{}' is not the range key of the addressed table or index",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn create_table(&self, schema: TableSchema) -> StoreResult<()> {
        self.admit()?;
        let mut tables = self.tables.write().await;
        if tables.contains_key(&schema.table_name) {
            return Err(StoreError::ResourceInUse(schema.table_name));
        }

        let mut seen = HashSet::new();
        for index in &schema.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(StoreError::Validation(format!(
                    "duplicate index '{}'",
                    index.name
                )));
            }
        }

        tables.insert(
            schema.table_name.clone(),
            MemoryTable {
                schema,
                items: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn put_item(&self, request: PutItemRequest) -> StoreResult<()> {
        self.admit()?;
        self.record(|s| s.puts += 1);

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&request.table)
            .ok_or_else(|| StoreError::ResourceNotFound(request.table.clone()))?;

        let key = table.primary_key(&request.item)?;
        table.validate_index_attributes(&request.item)?;

        if let Some(condition) = &request.condition {
            let empty = Item::new();
            let existing = table.items.get(&key).unwrap_or(&empty);
            if !condition.evaluate(existing)? {
                return Err(StoreError::ConditionalCheckFailed);
            }
        }

        table.items.insert(key, request.item);
        Ok(())
    }

    async fn get_item(&self, request: GetItemRequest) -> StoreResult<Option<Item>> {
        self.admit()?;
        self.record(|s| {
            s.gets += 1;
            if request.consistent_read {
                s.consistent_gets += 1;
            }
        });

        let tables = self.tables.read().await;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::ResourceNotFound(request.table.clone()))?;
        let key = table.primary_key(&request.key)?;
        Ok(table.items.get(&key).cloned())
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> StoreResult<()> {
        self.admit()?;
        self.record(|s| s.deletes += 1);

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&request.table)
            .ok_or_else(|| StoreError::ResourceNotFound(request.table.clone()))?;
        let key = table.primary_key(&request.key)?;

        if let Some(condition) = &request.condition {
            let empty = Item::new();
            let existing = table.items.get(&key).unwrap_or(&empty);
            if !condition.evaluate(existing)? {
                return Err(StoreError::ConditionalCheckFailed);
            }
        }

        table.items.remove(&key);
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> StoreResult<Page> {
        self.admit()?;
        self.record(|s| s.queries += 1);

        let tables = self.tables.read().await;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::ResourceNotFound(request.table.clone()))?;
        let index = table.index(request.index.as_deref())?;
        Self::check_key_condition(index, &table.schema, &request.key_condition)?;

        let condition = &request.key_condition;
        let mut ordered = Vec::new();
        for item in table.items.values() {
            if let Some(index) = index {
                if !MemoryTable::is_indexed(index, item) {
                    continue;
                }
            }

            let hash_matches = item
                .get(&condition.hash_attribute)
                .is_some_and(|v| v.compare(&condition.hash_value) == Some(Ordering::Equal));
            if !hash_matches {
                continue;
            }

            if let Some((range_name, bound)) = &condition.range {
                if !item.get(range_name).is_some_and(|v| range_matches(bound, v)) {
                    continue;
                }
            }

            ordered.push((table.position(index, item)?, item));
        }

        ordered.sort_by(|a, b| a.0.cmp(&b.0));
        if !request.scan_forward {
            ordered.reverse();
        }

        let limit = request.limit.unwrap_or(self.page_size).min(self.page_size);
        if limit == 0 {
            return Err(StoreError::Validation("limit must be positive".to_string()));
        }

        table.page(
            index,
            ordered,
            request.scan_forward,
            request.exclusive_start_key.as_ref(),
            limit,
            request.filter.as_ref(),
        )
    }

    async fn scan(&self, request: ScanRequest) -> StoreResult<Page> {
        self.admit()?;
        self.record(|s| s.scans += 1);

        let tables = self.tables.read().await;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| StoreError::ResourceNotFound(request.table.clone()))?;
        let index = table.index(request.index.as_deref())?;

        let mut ordered = Vec::new();
        for item in table.items.values() {
            if index.is_some_and(|index| !MemoryTable::is_indexed(index, item)) {
                continue;
            }
            ordered.push((table.position(index, item)?, item));
        }
        ordered.sort_by(|a, b| a.0.cmp(&b.0));

        let limit = request.limit.unwrap_or(self.page_size).min(self.page_size);
        if limit == 0 {
            return Err(StoreError::Validation("limit must be positive".to_string()));
        }

        table.page(
            index,
            ordered,
            true,
            request.exclusive_start_key.as_ref(),
            limit,
            request.filter.as_ref(),
        )
    }

    async fn batch_write_item(&self, request: BatchWriteRequest) -> StoreResult<BatchWriteOutput> {
        self.admit()?;
        self.record(|s| s.batch_writes += 1);

        if request.requests.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(StoreError::Validation(format!(
                "batch of {} requests exceeds {}",
                request.requests.len(),
                MAX_BATCH_WRITE_ITEMS
            )));
        }

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&request.table)
            .ok_or_else(|| StoreError::ResourceNotFound(request.table.clone()))?;

        let mut keyed = Vec::with_capacity(request.requests.len());
        for write in &request.requests {
            let key = match write {
                WriteRequest::Put(item) => {
                    table.validate_index_attributes(item)?;
                    table.primary_key(item)?
                }
                WriteRequest::Delete(key) => table.primary_key(key)?,
            };
            keyed.push(key);
        }

        let withheld = self.faults_mut(|faults| {
            if faults.unprocessed_rounds > 0 && !request.requests.is_empty() {
                faults.unprocessed_rounds -= 1;
                1
            } else {
                0
            }
        });

        let split = request.requests.len() - withheld;
        let mut requests = request.requests;
        let unprocessed = requests.split_off(split);

        let applied = requests.len();
        for (write, key) in requests.into_iter().zip(keyed) {
            match write {
                WriteRequest::Put(item) => {
                    table.items.insert(key, item);
                }
                WriteRequest::Delete(_) => {
                    table.items.remove(&key);
                }
            }
        }
        self.record(|s| s.batch_items_applied += applied);

        Ok(BatchWriteOutput { unprocessed })
    }

    async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> StoreResult<()> {
        self.admit()?;
        self.record(|s| s.transactions += 1);

        if items.len() > MAX_TRANSACT_ITEMS {
            return Err(StoreError::Validation(format!(
                "transaction of {} items exceeds {}",
                items.len(),
                MAX_TRANSACT_ITEMS
            )));
        }

        let mut tables = self.tables.write().await;

        let mut targets = Vec::with_capacity(items.len());
        let mut reasons = Vec::with_capacity(items.len());
        for write in &items {
            let table = tables
                .get(write.table())
                .ok_or_else(|| StoreError::ResourceNotFound(write.table().to_string()))?;

            let (key, condition) = match write {
                TransactWriteItem::Put {
                    item, condition, ..
                } => {
                    table.validate_index_attributes(item)?;
                    (table.primary_key(item)?, condition)
                }
                TransactWriteItem::Delete { key, condition, .. } => {
                    (table.primary_key(key)?, condition)
                }
            };

            if targets
                .iter()
                .any(|(t, k): &(String, OrderedKey)| t == write.table() && k == &key)
            {
                return Err(StoreError::Validation(
                    "transaction addresses the same item more than once".to_string(),
                ));
            }

            let reason = match condition {
                Some(condition) => {
                    let empty = Item::new();
                    let existing = table.items.get(&key).unwrap_or(&empty);
                    if condition.evaluate(existing)? {
                        CancellationReason::None
                    } else {
                        CancellationReason::ConditionalCheckFailed
                    }
                }
                None => CancellationReason::None,
            };

            reasons.push(reason);
            targets.push((write.table().to_string(), key));
        }

        if reasons.iter().any(|r| *r != CancellationReason::None) {
            return Err(StoreError::TransactionCanceled { reasons });
        }

        for (write, (table_name, key)) in items.into_iter().zip(targets) {
            let Some(table) = tables.get_mut(&table_name) else {
                continue;
            };
            match write {
                TransactWriteItem::Put { item, .. } => {
                    table.items.insert(key, item);
                }
                TransactWriteItem::Delete { .. } => {
                    table.items.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> AttributeValue {
        AttributeValue::S(v.to_string())
    }

    fn n(v: i64) -> AttributeValue {
        AttributeValue::N(v.to_string())
    }

    fn schema() -> TableSchema {
        TableSchema {
            table_name: "things".to_string(),
            hash_key: "name".to_string(),
            range_key: Some("version".to_string()),
            indexes: vec![IndexSchema {
                name: "byID".to_string(),
                hash_key: "id".to_string(),
                range_key: None,
                projection: Projection::KeysOnly,
            }],
        }
    }

    fn thing(name: &str, version: i64, id: Option<&str>) -> Item {
        let mut item = Item::new();
        item.insert("name".to_string(), s(name));
        item.insert("version".to_string(), n(version));
        item.insert("payload".to_string(), s("data"));
        if let Some(id) = id {
            item.insert("id".to_string(), s(id));
        }
        item
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new().with_page_size(2);
        store.create_table(schema()).await.unwrap();
        for version in [3, 1, 10, 2] {
            store
                .put_item(PutItemRequest {
                    table: "things".to_string(),
                    item: thing("a", version, if version == 10 { Some("x") } else { None }),
                    condition: None,
                })
                .await
                .unwrap();
        }
        store
    }

    fn query(start: Option<Item>, forward: bool) -> QueryRequest {
        QueryRequest {
            table: "things".to_string(),
            index: None,
            key_condition: KeyCondition {
                hash_attribute: "name".to_string(),
                hash_value: s("a"),
                range: None,
            },
            filter: None,
            exclusive_start_key: start,
            scan_forward: forward,
            limit: None,
            consistent_read: true,
        }
    }

    #[tokio::test]
    async fn test_query_pages_in_numeric_range_order() {
        let store = seeded().await;

        let first = store.query(query(None, true)).await.unwrap();
        let versions: Vec<_> = first.items.iter().map(|i| i["version"].clone()).collect();
        assert_eq!(versions, vec![n(1), n(2)]);

        let second = store
            .query(query(first.last_evaluated_key.clone(), true))
            .await
            .unwrap();
        let versions: Vec<_> = second.items.iter().map(|i| i["version"].clone()).collect();
        assert_eq!(versions, vec![n(3), n(10)]);
        assert!(second.last_evaluated_key.is_none());

        let reversed = store.query(query(None, false)).await.unwrap();
        assert_eq!(reversed.items[0]["version"], n(10));
    }

    #[tokio::test]
    async fn test_sparse_index_projects_keys_only() {
        let store = seeded().await;
        let page = store
            .scan(ScanRequest {
                table: "things".to_string(),
                index: Some("byID".to_string()),
                filter: None,
                exclusive_start_key: None,
                limit: None,
                consistent_read: false,
            })
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].get("payload").is_none());
        assert_eq!(page.items[0]["version"], n(10));
    }

    #[tokio::test]
    async fn test_transaction_is_all_or_nothing() {
        let store = seeded().await;
        let mut guard = Expression::default();
        guard.text = "attribute_not_exists(#n)".to_string();
        guard.names.insert("#n".to_string(), "name".to_string());

        let err = store
            .transact_write_items(vec![
                TransactWriteItem::Put {
                    table: "things".to_string(),
                    item: thing("b", 1, None),
                    condition: Some(guard.clone()),
                },
                TransactWriteItem::Put {
                    table: "things".to_string(),
                    item: thing("a", 1, None),
                    condition: Some(guard),
                },
            ])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StoreError::TransactionCanceled {
                reasons: vec![
                    CancellationReason::None,
                    CancellationReason::ConditionalCheckFailed
                ]
            }
        );
        assert_eq!(store.items("things").await.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_table_is_resource_not_found() {
        let store = MemoryStore::new();
        let err = store
            .get_item(GetItemRequest {
                table: "nope".to_string(),
                key: thing("a", 1, None),
                consistent_read: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ResourceNotFound(_)));
    }
}
