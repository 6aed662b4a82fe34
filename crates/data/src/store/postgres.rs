//! `PostgreSQL` document store.
//!
//! # Schema: `atelier.documents`
//!
//! One JSONB row per document, keyed by `(collection, id)`. A trigger calls
//! `pg_notify('atelier_documents', collection)` on every insert, update and
//! delete; subscribers `LISTEN` on that channel and re-read their query
//! whenever their collection is named, which gives full-snapshot push
//! semantics.
//!
//! # Migrations
//!
//! Stored in `crates/data/migrations/` and applied with
//! [`PgDocumentStore::migrate`].

use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    CollectionPath, CreateOutcome, Direction, Document, DocumentStore, Fields, Query,
    SnapshotStream, StoreError,
};

/// Channel the change trigger notifies on.
pub const NOTIFY_CHANNEL: &str = "atelier_documents";

// Direction cannot be bound as a parameter, so each ordering has its own statement.
// Timestamps are written as UTC RFC 3339 with microseconds, which orders
// correctly as text; any other value sorts last instead of failing the query.
const SNAPSHOT_DESC: &str = r#"
    SELECT id, data
    FROM atelier.documents
    WHERE collection = $1
      AND ($2::text IS NULL OR data -> $2 = $3::jsonb)
    ORDER BY CASE WHEN jsonb_typeof(data -> $4) = 'string'
                   AND data ->> $4 ~ '^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}Z$'
              THEN (data ->> $4) COLLATE "C" END DESC NULLS LAST,
             updated_at DESC
"#;

const SNAPSHOT_ASC: &str = r#"
    SELECT id, data
    FROM atelier.documents
    WHERE collection = $1
      AND ($2::text IS NULL OR data -> $2 = $3::jsonb)
    ORDER BY CASE WHEN jsonb_typeof(data -> $4) = 'string'
                   AND data ->> $4 ~ '^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{6}Z$'
              THEN (data ->> $4) COLLATE "C" END ASC NULLS LAST,
             updated_at ASC
"#;

/// Internal row type for document queries.
#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: Json<Value>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        match row.data.0 {
            Value::Object(fields) => Ok(Self::new(row.id, fields)),
            other => Err(StoreError::Corrupted(format!(
                "document {} is not an object: {other}",
                row.id
            ))),
        }
    }
}

/// [`DocumentStore`] backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the connection cannot be established.
    pub async fn connect(
        database_url: &SecretString,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url.expose_secret())
            .await?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Migration` if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn snapshot(pool: &PgPool, query: &Query) -> Result<Vec<Document>, StoreError> {
        let sql = match query.order_by.direction {
            Direction::Descending => SNAPSHOT_DESC,
            Direction::Ascending => SNAPSHOT_ASC,
        };
        let (field, value) = query
            .filter
            .as_ref()
            .map(|f| (f.field.clone(), Json(f.value.clone())))
            .unzip();

        let rows = sqlx::query_as::<_, DocumentRow>(sql)
            .bind(query.path.as_str())
            .bind(field)
            .bind(value)
            .bind(query.order_by.field.as_str())
            .fetch_all(pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    #[instrument(skip(self), fields(collection = %path))]
    async fn get(&self, path: &CollectionPath, id: &str) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r"
            SELECT id, data
            FROM atelier.documents
            WHERE collection = $1 AND id = $2
            ",
        )
        .bind(path.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self, body), fields(collection = %path))]
    async fn create_only(
        &self,
        path: &CollectionPath,
        id: &str,
        body: Fields,
    ) -> Result<CreateOutcome, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO atelier.documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            ",
        )
        .bind(path.as_str())
        .bind(id)
        .bind(Json(Value::Object(body)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(id, "create-only rejected: document exists");
            Ok(CreateOutcome::AlreadyExists)
        } else {
            Ok(CreateOutcome::Created)
        }
    }

    #[instrument(skip(self, body), fields(collection = %path))]
    async fn create(&self, path: &CollectionPath, body: Fields) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        sqlx::query(
            r"
            INSERT INTO atelier.documents (collection, id, data)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(path.as_str())
        .bind(&id)
        .bind(Json(Value::Object(body)))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    #[instrument(skip(self, body), fields(collection = %path))]
    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        body: Fields,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE atelier.documents
            SET data = data || $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            ",
        )
        .bind(path.as_str())
        .bind(id)
        .bind(Json(Value::Object(body)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection: path.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, values), fields(collection = %path))]
    async fn append(
        &self,
        path: &CollectionPath,
        id: &str,
        field: &str,
        values: Vec<Value>,
    ) -> Result<(), StoreError> {
        // Single statement, so concurrent appends serialize on the row lock.
        let result = sqlx::query(
            r"
            UPDATE atelier.documents
            SET data = jsonb_set(
                    data,
                    ARRAY[$3::text],
                    COALESCE(NULLIF(data -> $3, 'null'::jsonb), '[]'::jsonb) || $4::jsonb
                ),
                updated_at = NOW()
            WHERE collection = $1 AND id = $2
              AND (data -> $3 IS NULL OR jsonb_typeof(data -> $3) IN ('array', 'null'))
            ",
        )
        .bind(path.as_str())
        .bind(id)
        .bind(field)
        .bind(Json(Value::Array(values)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(path, id).await? {
                None => Err(StoreError::NotFound {
                    collection: path.to_string(),
                    id: id.to_string(),
                }),
                Some(_) => Err(StoreError::InvalidArgument(format!(
                    "field {field} of {path}/{id} is not an array"
                ))),
            };
        }
        Ok(())
    }

    #[instrument(skip(self), fields(collection = %path))]
    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r"
            DELETE FROM atelier.documents
            WHERE collection = $1 AND id = $2
            ",
        )
        .bind(path.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, query), fields(collection = %query.path))]
    async fn subscribe(&self, query: Query) -> Result<SnapshotStream, StoreError> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;

        // Read after LISTEN so no commit falls between the two.
        let initial = Self::snapshot(&self.pool, &query).await?;
        let pool = self.pool.clone();

        Ok(Box::pin(stream! {
            yield Ok(initial);
            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        if notification.payload() != query.path.as_str() {
                            continue;
                        }
                        yield PgDocumentStore::snapshot(&pool, &query).await;
                    }
                    Ok(None) => {
                        // Connection dropped; notifications may have been missed.
                        warn!(collection = %query.path, "listener reconnecting, resyncing snapshot");
                        yield PgDocumentStore::snapshot(&pool, &query).await;
                    }
                    Err(e) => {
                        yield Err(StoreError::from(e));
                        break;
                    }
                }
            }
        }))
    }
}
