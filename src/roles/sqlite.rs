//! SQLite-backed role store.
//!
//! Writes always use the canonical access encoding (a JSON array stored as
//! text). Reads still accept the legacy double-encoded form until
//! [`SqliteRoleStore::canonicalize_legacy_access`] has been run against the
//! database.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

use super::{Role, RoleId, RoleStore, RoleStoreError};
use crate::ability::Grant;

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Role store handle with connection pool.
#[derive(Clone)]
pub struct SqliteRoleStore {
    pool: SqlitePool,
}

impl SqliteRoleStore {
    /// Connection acquire timeout - a stuck pool surfaces as an error, not a hang.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database.
    pub async fn connect(path: &str) -> Result<Self, RoleStoreError> {
        let pool = if path == ":memory:" {
            // Unique shared-cache name per call so parallel tests never collide.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:admin-access-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                warn!(path = %parent.display(), error = %e, "Failed to create role database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Role database connected");

        sqlx::migrate!("./migrations").run(&pool).await?;

        // WAL lets role reads proceed while administrative writes are in flight.
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a role, storing its grants canonically.
    pub async fn upsert_role(
        &self,
        id: RoleId,
        name: &str,
        grants: &[Grant],
    ) -> Result<(), RoleStoreError> {
        let access = encode_access(grants)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, access, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                access = excluded.access,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(access)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a role. Returns whether a row was removed.
    pub async fn delete_role(&self, id: RoleId) -> Result<bool, RoleStoreError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rewrite double-encoded access lists into the canonical encoding.
    ///
    /// Rows whose content cannot be decoded are left untouched and logged;
    /// they keep failing with a data-integrity error on lookup. Returns the
    /// number of rows rewritten.
    pub async fn canonicalize_legacy_access(&self) -> Result<u64, RoleStoreError> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, access FROM roles WHERE access IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut migrated = 0u64;

        for (id, raw) in rows {
            let Ok(Value::String(inner)) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };

            let grants: Vec<Grant> = match serde_json::from_str(&inner) {
                Ok(grants) => grants,
                Err(e) => {
                    error!(role_id = id, error = %e, "Legacy access list is not decodable; left as is");
                    continue;
                }
            };

            sqlx::query("UPDATE roles SET access = ?, updated_at = ? WHERE id = ?")
                .bind(encode_access(&grants)?)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            migrated += 1;
        }

        tx.commit().await?;

        if migrated > 0 {
            info!(rows = migrated, "Canonicalized legacy role access lists");
        }
        Ok(migrated)
    }
}

#[async_trait]
impl RoleStore for SqliteRoleStore {
    async fn get_role_by_id(&self, id: RoleId) -> Result<Option<Role>, RoleStoreError> {
        let row = sqlx::query_as::<_, (i64, String, Option<String>)>(
            "SELECT id, name, access FROM roles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, name, access)| Role {
            id,
            name,
            access: access.map(decode_column),
        }))
    }
}

/// Canonical marshal for an access list.
pub fn encode_access(grants: &[Grant]) -> Result<String, RoleStoreError> {
    Ok(serde_json::to_string(grants)?)
}

/// Lift the stored text into JSON.
///
/// Text that is not JSON at all is handed on as a string value so that
/// parsing reports it as a data-integrity failure instead of an empty role.
fn decode_column(text: String) -> Value {
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(_) => Value::String(text),
    }
}
