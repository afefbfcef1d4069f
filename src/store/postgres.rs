use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgListener;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, error, info};

use super::{
    new_document_id, CollectionPath, Direction, Document, DocumentStore, FieldWrite, Fields,
    ListenerHandle, ListenerSlot, Query, SnapshotSink, StoreError, WriteMap,
};

/// NOTIFY channel fed by the `documents` trigger; payload is the collection path.
pub const CHANGE_CHANNEL: &str = "documents_changed";

const MAX_ID_ATTEMPTS: usize = 5;

// JSON object of server timestamps for the keys in $n, in the canonical text form.
const STAMPS_SQL: &str = r#"(SELECT COALESCE(jsonb_object_agg(k, to_jsonb(to_char(clock_timestamp() AT TIME ZONE 'UTC', 'YYYY-MM-DD"T"HH24:MI:SS.US"Z"'))), '{}'::jsonb) FROM unnest($STAMPS::text[]) AS k)"#;

/// `LIKE` pattern matching every sub-collection nested under document `id`.
fn nested_pattern(collection: &CollectionPath, id: &str) -> String {
    let prefix = collection.nested_prefix(id);
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Write payload split into the parts the SQL statements take separately.
struct SqlWrite {
    values: Fields,
    clears: Vec<String>,
    stamps: Vec<String>,
}

impl SqlWrite {
    fn from_map(map: WriteMap) -> Result<Self, StoreError> {
        map.validate()?;
        let mut out = SqlWrite {
            values: Fields::new(),
            clears: Vec::new(),
            stamps: Vec::new(),
        };
        for (key, write) in map {
            match write {
                FieldWrite::Value(v) => {
                    out.values.insert(key, v);
                }
                FieldWrite::Clear => out.clears.push(key),
                FieldWrite::ServerTimestamp => out.stamps.push(key),
                FieldWrite::Unset => {}
            }
        }
        Ok(out)
    }
}

/// Document store on a single Postgres `documents` table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn fetch_ordered(pool: &PgPool, query: &Query) -> Result<Vec<Document>, StoreError> {
    let direction = match query.order_by.direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    };
    let sql = format!(
        "SELECT id, data FROM documents
         WHERE collection = $1 AND jsonb_exists(data, $2)
         ORDER BY data -> $2 {direction}, id {direction}"
    );
    let rows: Vec<(String, Json<Fields>)> = sqlx::query_as(&sql)
        .bind(query.collection.as_str())
        .bind(&query.order_by.field)
        .fetch_all(pool)
        .await
        .map_err(unavailable)?;

    Ok(rows
        .into_iter()
        .map(|(id, Json(fields))| Document { id, fields })
        .collect())
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        fetch_ordered(&self.pool, query).await
    }

    async fn get(
        &self,
        collection: &CollectionPath,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let row: Option<(Json<Fields>,)> =
            sqlx::query_as("SELECT data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection.as_str())
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;

        Ok(row.map(|(Json(fields),)| Document {
            id: id.to_string(),
            fields,
        }))
    }

    async fn add(&self, collection: &CollectionPath, fields: WriteMap) -> Result<String, StoreError> {
        let write = SqlWrite::from_map(fields)?;
        let sql = format!(
            "INSERT INTO documents (collection, id, data)
             VALUES ($1, $2, $3::jsonb || {})
             ON CONFLICT (collection, id) DO NOTHING",
            STAMPS_SQL.replace("$STAMPS", "$4")
        );

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = new_document_id();
            let result = sqlx::query(&sql)
                .bind(collection.as_str())
                .bind(&id)
                .bind(Json(Value::Object(write.values.clone())))
                .bind(&write.stamps)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
            if result.rows_affected() == 1 {
                debug!(collection = %collection, %id, "document added");
                return Ok(id);
            }
        }
        error!(collection = %collection, "could not allocate a document id");
        Err(StoreError::Unavailable("document id allocation failed".into()))
    }

    async fn update(
        &self,
        collection: &CollectionPath,
        id: &str,
        fields: WriteMap,
    ) -> Result<(), StoreError> {
        let write = SqlWrite::from_map(fields)?;
        let sql = format!(
            "UPDATE documents
             SET data = ((data || $3::jsonb) - $4::text[]) || {}
             WHERE collection = $1 AND id = $2",
            STAMPS_SQL.replace("$STAMPS", "$5")
        );
        let result = sqlx::query(&sql)
            .bind(collection.as_str())
            .bind(id)
            .bind(Json(Value::Object(write.values)))
            .bind(&write.clears)
            .bind(&write.stamps)
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, collection: &CollectionPath, id: &str) -> Result<(), StoreError> {
        let nested = nested_pattern(collection, id);
        sqlx::query(
            r"DELETE FROM documents
             WHERE (collection = $1 AND id = $2) OR collection LIKE $3 ESCAPE '\'",
        )
        .bind(collection.as_str())
        .bind(id)
        .bind(nested)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn subscribe(
        &self,
        query: &Query,
        sink: SnapshotSink,
    ) -> Result<ListenerHandle, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(unavailable)?;
        listener.listen(CHANGE_CHANNEL).await.map_err(unavailable)?;

        let slot = ListenerSlot::new(sink);
        slot.deliver(Ok(fetch_ordered(&self.pool, query).await?));

        let pool = self.pool.clone();
        let query = query.clone();
        let task_slot = slot.clone();
        let task = tokio::spawn(async move {
            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        error!(?e, collection = %query.collection, "listener connection failed");
                        task_slot.fail(unavailable(e));
                        return;
                    }
                };
                if notification.payload() != query.collection.as_str() {
                    continue;
                }
                match fetch_ordered(&pool, &query).await {
                    Ok(docs) => {
                        if !task_slot.deliver(Ok(docs)) {
                            return;
                        }
                    }
                    Err(e) => {
                        error!(?e, collection = %query.collection, "snapshot query failed");
                        task_slot.fail(e);
                        return;
                    }
                }
            }
        });
        info!(channel = CHANGE_CHANNEL, "live listener started");

        Ok(ListenerHandle::new(move || {
            slot.close();
            task.abort();
        }))
    }
}
