use super::{Adapter, QueryOptions};
use crate::codec::Key;
use crate::condition::Condition;
use crate::context::Context;
use crate::core::{Error, Result, Value};
use crate::schema::Entity;
use crate::store::{DeleteItemRequest, GetItemRequest, PutItemRequest, StoreError};

fn condition_failed(entity: String, key: Key) -> Error {
    Error::ConditionFailed { entity, key }
}

/// Maps a failed conditional write; everything else goes through `from_store`.
pub(crate) fn condition_error(err: StoreError, on_condition: impl FnOnce() -> Error) -> Error {
    match err {
        StoreError::ConditionalCheckFailed => on_condition(),
        other => Error::from_store(other),
    }
}

impl<E: Entity> Adapter<E> {
    /// Provisions the table and its indexes. An existing table is success.
    pub async fn create_table(&self, ctx: &Context) -> Result<()> {
        self.traced("create_table", async {
            let schema = self.descriptor().table_schema(&self.table);
            match ctx.run(self.client.create_table(schema)).await? {
                Ok(()) | Err(StoreError::ResourceInUse(_)) => Ok(()),
                Err(err) => Err(Error::from_store(err)),
            }
        })
        .await
    }

    /// Unconditional upsert.
    pub async fn save(&self, ctx: &Context, entity: &E) -> Result<()> {
        self.traced("save", self.put(ctx, entity, None, condition_failed))
            .await
    }

    /// Upsert guarded by `condition`; a false condition is `ConditionFailed`.
    pub async fn save_if(&self, ctx: &Context, entity: &E, condition: &Condition) -> Result<()> {
        self.traced(
            "save_if",
            self.put(ctx, entity, Some(condition), condition_failed),
        )
        .await
    }

    /// Writes `entity` only if no item with its primary key exists.
    ///
    /// Any existing item, however recently written, is `AlreadyExists`.
    pub async fn create(&self, ctx: &Context, entity: &E) -> Result<()> {
        let key_attributes = self.descriptor().primary_key().attributes();
        let guard = Condition::not_exists(key_attributes.as_slice());
        self.traced(
            "create",
            self.put(ctx, entity, Some(&guard), |entity, key| Error::AlreadyExists {
                entity,
                key,
            }),
        )
        .await
    }

    async fn put(
        &self,
        ctx: &Context,
        entity: &E,
        condition: Option<&Condition>,
        on_condition: fn(String, Key) -> Error,
    ) -> Result<()> {
        let record = entity.to_record();
        let item = self.items().encode(&record)?;
        let key = self.keys().primary_key(&record)?;

        let request = PutItemRequest {
            table: self.table.clone(),
            item,
            condition: condition.and_then(Condition::compile),
        };

        ctx.run(self.client.put_item(request))
            .await?
            .map_err(|err| {
                condition_error(err, || {
                    on_condition(self.descriptor().name().to_string(), key)
                })
            })
    }

    /// Strongly consistent point lookup unless reads are configured otherwise.
    ///
    /// `key` holds one value per primary key part, hash first.
    pub async fn get(&self, ctx: &Context, key: &[Value]) -> Result<E> {
        self.traced("get", async {
            let key = self.keys().key_from_parts(None, key)?;
            let request = GetItemRequest {
                table: self.table.clone(),
                key: key.to_item(),
                consistent_read: self.config.consistent_reads,
            };

            match ctx.run(self.client.get_item(request)).await?.map_err(Error::from_store)? {
                Some(item) => self.items().decode_entity(&item),
                None => Err(Error::NotFound {
                    entity: self.descriptor().name().to_string(),
                    key,
                }),
            }
        })
        .await
    }

    /// First entity on `index` matching the given key values.
    pub async fn get_by_index(
        &self,
        ctx: &Context,
        index: &str,
        hash: impl Into<Value>,
        range: Option<Value>,
    ) -> Result<E> {
        let hash = hash.into();
        self.traced("get_by_index", self.first_on_index(ctx, index, hash, range))
            .await
    }

    async fn first_on_index(
        &self,
        ctx: &Context,
        index: &str,
        hash: Value,
        range: Option<Value>,
    ) -> Result<E> {
        let keys = self.keys();
        let mut parts = vec![hash.clone()];
        parts.extend(range.clone());
        let key = keys.key_from_parts(Some(index), &parts)?;

        let mut options = QueryOptions::new().limit(1);
        if let Some(range) = range {
            options = options.start_at(range);
        }

        let mut found = None;
        self.query(ctx, Some(index), hash, options, |entity, _| {
            found = Some(entity);
            false
        })
        .await?;

        // A range bound matches at-or-after, so re-check exact equality.
        let matches = |entity: &E| {
            let record = entity.to_record();
            keys.index_key(index, &record)
                .map(|candidate| candidate.as_ref() == Some(&key))
                .unwrap_or(false)
        };

        match found {
            Some(entity) if matches(&entity) => Ok(entity),
            _ => Err(Error::NotFound {
                entity: self.descriptor().name().to_string(),
                key,
            }),
        }
    }

    /// Deletes by primary key. Deleting a missing item succeeds.
    pub async fn delete(&self, ctx: &Context, key: &[Value]) -> Result<()> {
        self.traced("delete", self.remove(ctx, key, None)).await
    }

    /// Deletes only if `condition` holds on the stored item.
    pub async fn delete_if(&self, ctx: &Context, key: &[Value], condition: &Condition) -> Result<()> {
        self.traced("delete_if", self.remove(ctx, key, Some(condition)))
            .await
    }

    async fn remove(&self, ctx: &Context, key: &[Value], condition: Option<&Condition>) -> Result<()> {
        let key = self.keys().key_from_parts(None, key)?;
        let request = DeleteItemRequest {
            table: self.table.clone(),
            key: key.to_item(),
            condition: condition.and_then(Condition::compile),
        };

        ctx.run(self.client.delete_item(request))
            .await?
            .map_err(|err| {
                condition_error(err, || Error::ConditionFailed {
                    entity: self.descriptor().name().to_string(),
                    key,
                })
            })
    }
}
