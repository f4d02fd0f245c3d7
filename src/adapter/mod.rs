//! Per-entity storage adapter.
//!
//! One generic [`Adapter`] serves every entity type; the entity's
//! [`EntityDescriptor`] drives key derivation, item encoding and the
//! shape of every store request.

mod batch;
mod crud;
mod options;
mod query;

pub use options::{QueryOptions, ResultPage, ScanOptions};

use crate::codec::{ItemCodec, KeyCodec};
use crate::config::AdapterConfig;
use crate::core::Result;
use crate::schema::{Entity, EntityDescriptor};
use crate::store::StoreClient;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// CRUD, query, scan and batch operations for one entity type.
///
/// Holds no mutable state: clones share the client and can be used from
/// any number of tasks.
///
/// # Example
///
/// ```
/// use schemakv::{Adapter, AdapterConfig, Context, Entity, MemoryStore};
/// use std::sync::Arc;
///
/// #[derive(Debug, Entity)]
/// #[entity(table = "things", hash = "name", range = "version")]
/// #[index(name = "thingID", hash = "thingID")]
/// struct Thing {
///     name: String,
///     version: i64,
///     #[entity(rename = "thingID")]
///     thing_id: Option<String>,
/// }
///
/// # tokio_test::block_on(async {
/// let things = Adapter::<Thing>::new(Arc::new(MemoryStore::new()), AdapterConfig::default())?;
/// let ctx = Context::background();
/// things.create_table(&ctx).await?;
///
/// let thing = Thing { name: "a".into(), version: 1, thing_id: Some("t-1".into()) };
/// things.create(&ctx, &thing).await?;
/// assert!(things.create(&ctx, &thing).await.unwrap_err().is_already_exists());
///
/// let found = things.get_by_index(&ctx, "thingID", "t-1", None).await?;
/// assert_eq!(found.version, 1);
/// # Ok::<(), schemakv::Error>(())
/// # }).unwrap();
/// ```
pub struct Adapter<E: Entity> {
    client: Arc<dyn StoreClient>,
    config: AdapterConfig,
    table: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Adapter<E> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            config: self.config.clone(),
            table: self.table.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Adapter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("entity", &E::descriptor().name())
            .field("table", &self.table)
            .field("config", &self.config)
            .finish()
    }
}

impl<E: Entity> Adapter<E> {
    pub fn new(client: Arc<dyn StoreClient>, config: AdapterConfig) -> Result<Self> {
        config.validate()?;
        let table = config
            .table_name
            .clone()
            .unwrap_or_else(|| E::descriptor().table().to_string());

        Ok(Self {
            client,
            config,
            table,
            _entity: PhantomData,
        })
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        E::descriptor()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    pub fn keys(&self) -> KeyCodec<'static> {
        KeyCodec::new(E::descriptor())
    }

    pub fn items(&self) -> ItemCodec<'static> {
        ItemCodec::new(E::descriptor())
    }

    /// Runs one adapter operation inside its tracing span.
    async fn traced<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let span = info_span!(
            "schemakv.adapter",
            entity = %E::descriptor().name(),
            table = %self.table,
            operation
        );

        async move {
            let result = fut.await;
            match &result {
                Ok(_) => event!(Level::DEBUG, "store operation completed"),
                Err(err)
                    if err.is_not_found() || err.is_already_exists() || err.is_condition_failed() =>
                {
                    event!(Level::DEBUG, error = %err, "store operation rejected")
                }
                Err(err) => event!(Level::ERROR, error = %err, "store operation failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}
