use super::Adapter;
use crate::config::BatchRetryPolicy;
use crate::context::Context;
use crate::core::{Error, Result, Value};
use crate::schema::Entity;
use crate::store::{BatchWriteRequest, StoreClient, WriteRequest};
use log::warn;

impl<E: Entity> Adapter<E> {
    /// Upserts up to `max_batch_size` entities.
    ///
    /// Everything is encoded before the first store call. Items the store
    /// reports as unprocessed are re-submitted with backoff until none remain.
    pub async fn batch_save(&self, ctx: &Context, entities: &[E]) -> Result<()> {
        self.traced("batch_save", async {
            self.check_batch_size(entities.len())?;
            let codec = self.items();
            let requests = entities
                .iter()
                .map(|entity| codec.encode_entity(entity).map(WriteRequest::Put))
                .collect::<Result<Vec<_>>>()?;
            self.submit_batch(ctx, requests).await
        })
        .await
    }

    /// Deletes up to `max_batch_size` items by primary key.
    pub async fn batch_delete(&self, ctx: &Context, keys: &[Vec<Value>]) -> Result<()> {
        self.traced("batch_delete", async {
            self.check_batch_size(keys.len())?;
            let codec = self.keys();
            let requests = keys
                .iter()
                .map(|parts| {
                    codec
                        .key_from_parts(None, parts)
                        .map(|key| WriteRequest::Delete(key.to_item()))
                })
                .collect::<Result<Vec<_>>>()?;
            self.submit_batch(ctx, requests).await
        })
        .await
    }

    fn check_batch_size(&self, count: usize) -> Result<()> {
        let max = self.config.max_batch_size;
        if count > max {
            return Err(Error::BatchTooLarge { count, max });
        }
        Ok(())
    }

    async fn submit_batch(&self, ctx: &Context, requests: Vec<WriteRequest>) -> Result<()> {
        submit_until_processed(
            ctx,
            self.client.as_ref(),
            &self.table,
            requests,
            &self.config.batch_retry,
        )
        .await
    }
}

/// Submits a batch, then only what the store left unprocessed, until
/// nothing remains or the policy's round limit is hit.
async fn submit_until_processed(
    ctx: &Context,
    client: &dyn StoreClient,
    table: &str,
    requests: Vec<WriteRequest>,
    policy: &BatchRetryPolicy,
) -> Result<()> {
    let mut pending = requests;
    let mut rounds = 0usize;

    while !pending.is_empty() {
        if rounds >= policy.max_rounds {
            return Err(Error::BatchRetriesExhausted {
                rounds,
                remaining: pending.len(),
            });
        }

        if rounds > 0 {
            let delay = policy.backoff(rounds);
            warn!(
                "{} of batch on '{}' unprocessed after round {}; retrying in {:?}",
                pending.len(),
                table,
                rounds,
                delay
            );
            ctx.run(tokio::time::sleep(delay)).await?;
        }

        let request = BatchWriteRequest {
            table: table.to_string(),
            requests: pending,
        };
        let output = ctx
            .run(client.batch_write_item(request))
            .await?
            .map_err(Error::from_store)?;

        pending = output.unprocessed;
        rounds += 1;
    }

    Ok(())
}
