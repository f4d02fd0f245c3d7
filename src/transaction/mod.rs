//! Atomic multi-item writes across entity types.

use crate::adapter::Adapter;
use crate::codec::Key;
use crate::condition::Condition;
use crate::context::Context;
use crate::core::{Error, Result, Value};
use crate::schema::Entity;
use crate::store::{CancellationReason, StoreClient, StoreError, TransactWriteItem};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Create,
    Write,
}

#[derive(Debug, Clone)]
struct Staged {
    entity: String,
    key: Key,
    intent: Intent,
    write: TransactWriteItem,
}

/// Writes staged for one atomic submission.
///
/// Each write is encoded when it is staged, so an encoding failure
/// surfaces before anything reaches the store.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    staged: Vec<Staged>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Stages an upsert, optionally guarded by `condition`.
    pub fn save<E: Entity>(
        &mut self,
        adapter: &Adapter<E>,
        entity: &E,
        condition: Option<&Condition>,
    ) -> Result<&mut Self> {
        self.stage_put(adapter, entity, condition.cloned(), Intent::Write)
    }

    /// Stages a create-only write; a conflict surfaces as `AlreadyExists`.
    pub fn create<E: Entity>(&mut self, adapter: &Adapter<E>, entity: &E) -> Result<&mut Self> {
        let key_attributes = E::descriptor().primary_key().attributes();
        let guard = Condition::not_exists(key_attributes.as_slice());
        self.stage_put(adapter, entity, Some(guard), Intent::Create)
    }

    pub fn delete<E: Entity>(
        &mut self,
        adapter: &Adapter<E>,
        key: &[Value],
        condition: Option<&Condition>,
    ) -> Result<&mut Self> {
        let key = adapter.keys().key_from_parts(None, key)?;
        self.staged.push(Staged {
            entity: E::descriptor().name().to_string(),
            write: TransactWriteItem::Delete {
                table: adapter.table().to_string(),
                key: key.to_item(),
                condition: condition.and_then(Condition::compile),
            },
            key,
            intent: Intent::Write,
        });
        Ok(self)
    }

    fn stage_put<E: Entity>(
        &mut self,
        adapter: &Adapter<E>,
        entity: &E,
        condition: Option<Condition>,
        intent: Intent,
    ) -> Result<&mut Self> {
        let record = entity.to_record();
        let item = adapter.items().encode(&record)?;
        let key = adapter.keys().primary_key(&record)?;
        self.staged.push(Staged {
            entity: E::descriptor().name().to_string(),
            key,
            intent,
            write: TransactWriteItem::Put {
                table: adapter.table().to_string(),
                item,
                condition: condition.as_ref().and_then(Condition::compile),
            },
        });
        Ok(self)
    }
}

/// Submits [`Transaction`]s as single all-or-nothing store writes.
#[derive(Clone)]
pub struct TransactionCoordinator {
    client: Arc<dyn StoreClient>,
    max_items: usize,
}

impl TransactionCoordinator {
    pub fn new(client: Arc<dyn StoreClient>, max_items: usize) -> Self {
        Self { client, max_items }
    }

    /// Coordinator sharing an adapter's client and transaction limit.
    pub fn for_adapter<E: Entity>(adapter: &Adapter<E>) -> Self {
        Self::new(
            Arc::clone(adapter.client()),
            adapter.config().max_transaction_items,
        )
    }

    /// Writes every staged item or none of them.
    ///
    /// The item limit is checked before any store call. A failed condition
    /// on a create is `AlreadyExists`, on any other write `ConditionFailed`;
    /// either way nothing is written.
    pub async fn transact_save(&self, ctx: &Context, transaction: Transaction) -> Result<()> {
        let count = transaction.len();
        let span = info_span!("schemakv.transaction", items = count);

        async move {
            let result = self.submit(ctx, transaction).await;
            match &result {
                Ok(()) => event!(Level::DEBUG, "transaction committed"),
                Err(err) => event!(Level::ERROR, error = %err, "transaction aborted"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn submit(&self, ctx: &Context, transaction: Transaction) -> Result<()> {
        let count = transaction.len();
        if count > self.max_items {
            return Err(Error::TooManyTransactionItems {
                count,
                max: self.max_items,
            });
        }
        if count == 0 {
            return Ok(());
        }

        let staged = transaction.staged;
        let writes = staged.iter().map(|s| s.write.clone()).collect();

        match ctx.run(self.client.transact_write_items(writes)).await? {
            Ok(()) => Ok(()),
            Err(StoreError::TransactionCanceled { reasons }) => Err(cancellation_error(staged, reasons)),
            Err(StoreError::ConditionalCheckFailed) => Err(Error::TransactionCanceled {
                reasons: vec![CancellationReason::ConditionalCheckFailed.to_string()],
            }),
            Err(other) => Err(Error::from_store(other)),
        }
    }
}

/// Reports the first failed condition with its entity and key.
fn cancellation_error(staged: Vec<Staged>, reasons: Vec<CancellationReason>) -> Error {
    let failed = staged
        .into_iter()
        .zip(reasons.iter())
        .find(|(_, reason)| **reason == CancellationReason::ConditionalCheckFailed);

    match failed {
        Some((staged, _)) if staged.intent == Intent::Create => Error::AlreadyExists {
            entity: staged.entity,
            key: staged.key,
        },
        Some((staged, _)) => Error::ConditionFailed {
            entity: staged.entity,
            key: staged.key,
        },
        None => Error::TransactionCanceled {
            reasons: reasons.iter().map(ToString::to_string).collect(),
        },
    }
}

impl<E: Entity> Adapter<E> {
    /// Saves `(entity, condition)` pairs of this entity type atomically.
    pub async fn transact_save(&self, ctx: &Context, items: &[(E, Option<Condition>)]) -> Result<()> {
        let max = self.config().max_transaction_items;
        if items.len() > max {
            return Err(Error::TooManyTransactionItems {
                count: items.len(),
                max,
            });
        }

        let mut transaction = Transaction::new();
        for (entity, condition) in items {
            transaction.save(self, entity, condition.as_ref())?;
        }
        TransactionCoordinator::for_adapter(self)
            .transact_save(ctx, transaction)
            .await
    }
}
