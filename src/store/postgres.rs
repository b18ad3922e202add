use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{
    apply_fields, collection_of, ChangeEvent, Direction, DocumentSnapshot, DocumentStore, Query,
    StoreError, StoreResult, WriteBatch, WriteOp,
};

/// Redis channel carrying committed change events between API instances.
pub const CHANGES_CHANNEL: &str = "docstore:changes";

/// Document store backed by the `documents` table.
///
/// When built with a Redis connection, change events are published on
/// [`CHANGES_CHANNEL`] and come back through [`spawn_change_relay`], so every
/// instance sees every commit. Without Redis they are delivered in-process.
pub struct PgDocumentStore {
    pool: PgPool,
    events: broadcast::Sender<ChangeEvent>,
    publisher: Option<redis::aio::MultiplexedConnection>,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            pool,
            events,
            publisher: None,
        }
    }

    pub fn with_redis(pool: PgPool, publisher: redis::aio::MultiplexedConnection) -> Self {
        Self {
            publisher: Some(publisher),
            ..Self::new(pool)
        }
    }

    /// Sender feeding local subscribers; handed to the Redis relay.
    pub fn event_sender(&self) -> broadcast::Sender<ChangeEvent> {
        self.events.clone()
    }

    async fn publish(&self, event: ChangeEvent) {
        if let Some(conn) = &self.publisher {
            let mut conn = conn.clone();
            match serde_json::to_string(&event) {
                Ok(payload) => match conn.publish::<_, _, ()>(CHANGES_CHANNEL, payload).await {
                    Ok(()) => return,
                    Err(e) => warn!("Change event publish failed, delivering locally: {}", e),
                },
                Err(e) => warn!("Change event serialization failed: {}", e),
            }
        }
        let _ = self.events.send(event);
    }
}

fn field_path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

fn build_query_sql(query: &Query) -> String {
    let mut sql = String::from("SELECT path, data FROM documents WHERE collection = $1");
    let mut idx = 2;
    for _ in &query.filters {
        sql.push_str(&format!(" AND data #> ${}::text[] = ${}::jsonb", idx, idx + 1));
        idx += 2;
    }
    match &query.order_by {
        Some((_, Direction::Ascending)) => {
            sql.push_str(&format!(" ORDER BY data #> ${idx}::text[] ASC NULLS FIRST"))
        }
        Some((_, Direction::Descending)) => {
            sql.push_str(&format!(" ORDER BY data #> ${idx}::text[] DESC NULLS LAST"))
        }
        None => sql.push_str(" ORDER BY path"),
    }
    sql
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        collection_of(path)?;
        let data = sqlx::query_scalar::<_, Json<Value>>("SELECT data FROM documents WHERE path = $1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(data.map(|d| d.0))
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<DocumentSnapshot>> {
        let sql = build_query_sql(query);
        let mut q = sqlx::query_as::<_, (String, Json<Value>)>(&sql).bind(&query.collection);
        for (field, value) in &query.filters {
            q = q.bind(field_path(field)).bind(Json(value.clone()));
        }
        if let Some((field, _)) = &query.order_by {
            q = q.bind(field_path(field));
        }
        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(path, data)| DocumentSnapshot { path, data: data.0 })
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let collections = batch.touched_collections()?;
        if collections.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for op in batch.into_ops() {
            match op {
                WriteOp::Set { path, data } => {
                    let collection = collection_of(&path)?.to_string();
                    sqlx::query(
                        "INSERT INTO documents (path, collection, data) VALUES ($1, $2, $3)
                         ON CONFLICT (path) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
                    )
                    .bind(&path)
                    .bind(&collection)
                    .bind(Json(data))
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Create { path, data } => {
                    let collection = collection_of(&path)?.to_string();
                    let inserted = sqlx::query(
                        "INSERT INTO documents (path, collection, data) VALUES ($1, $2, $3)",
                    )
                    .bind(&path)
                    .bind(&collection)
                    .bind(Json(data))
                    .execute(&mut *tx)
                    .await;
                    match inserted {
                        Ok(_) => {}
                        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                            return Err(StoreError::AlreadyExists(path));
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                WriteOp::Update { path, fields } => {
                    let current = sqlx::query_scalar::<_, Json<Value>>(
                        "SELECT data FROM documents WHERE path = $1 FOR UPDATE",
                    )
                    .bind(&path)
                    .fetch_optional(&mut *tx)
                    .await?;
                    let mut data = current
                        .ok_or_else(|| StoreError::NotFound(path.clone()))?
                        .0;
                    apply_fields(&path, &mut data, &fields)?;
                    sqlx::query("UPDATE documents SET data = $2, updated_at = NOW() WHERE path = $1")
                        .bind(&path)
                        .bind(Json(data))
                        .execute(&mut *tx)
                        .await?;
                }
                WriteOp::Delete { path } => {
                    sqlx::query("DELETE FROM documents WHERE path = $1")
                        .bind(&path)
                        .execute(&mut *tx)
                        .await?;
                }
                WriteOp::DeleteTree { path } => {
                    sqlx::query("DELETE FROM documents WHERE path = $1 OR starts_with(path, $2)")
                        .bind(&path)
                        .bind(format!("{path}/"))
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;

        self.publish(ChangeEvent { collections }).await;
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Forwards change events published on Redis to local subscribers.
/// Reconnects after a short pause if the subscription drops.
pub fn spawn_change_relay(
    client: redis::Client,
    events: broadcast::Sender<ChangeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(p) => p,
                Err(e) => {
                    error!("Change relay: Redis pubsub error: {}", e);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
            };
            if let Err(e) = pubsub.subscribe(CHANGES_CHANNEL).await {
                error!("Change relay: subscribe error: {}", e);
                tokio::time::sleep(Duration::from_secs(2)).await;
                continue;
            }
            info!("Change relay subscribed to {}", CHANGES_CHANNEL);

            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                match serde_json::from_str::<ChangeEvent>(&payload) {
                    Ok(event) => {
                        let _ = events.send(event);
                    }
                    Err(e) => warn!("Change relay: malformed event {:?}: {}", payload, e),
                }
            }
            warn!("Change relay: subscription closed, reconnecting");
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_sql_numbers_placeholders() {
        let query = Query::collection("schools")
            .where_eq("plan.name", "Pro")
            .order_by("createdAt", Direction::Descending);
        assert_eq!(
            build_query_sql(&query),
            "SELECT path, data FROM documents WHERE collection = $1 \
             AND data #> $2::text[] = $3::jsonb \
             ORDER BY data #> $4::text[] DESC NULLS LAST"
        );
    }

    #[test]
    fn unordered_query_falls_back_to_path_order() {
        assert!(build_query_sql(&Query::collection("platformAdmins")).ends_with("ORDER BY path"));
    }

    #[test]
    fn field_paths_split_on_dots() {
        assert_eq!(field_path("plan.name"), vec!["plan", "name"]);
    }
}
