//! PostgreSQL key-value store.

use async_trait::async_trait;
use gantry_core::Result;
use gantry_core::store::KeyValueStore;
use sqlx::PgPool;

use crate::DbError;

/// `kv_entries` table implementation of `KeyValueStore`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_entries WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::from)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
