//! Generic key-value content store.
//!
//! Documents are JSON values stored under string keys. Every row carries a
//! version counter so read-modify-write updates can compare-and-swap.

use chrono::Utc;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::errors::AppError;

/// Attempts a merge update makes before reporting a conflict.
const MAX_UPDATE_ATTEMPTS: usize = 32;

/// Key-value store backed by the `kv_store` table.
#[derive(Clone)]
pub struct ContentStore {
    pool: SqlitePool,
}

impl ContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Point lookup. A missing key is `None`, not an error.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        Ok(self.get_versioned(key).await?.map(|(value, _)| value))
    }

    async fn get_versioned(&self, key: &str) -> Result<Option<(Value, i64)>, AppError> {
        let row = sqlx::query("SELECT value, version FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some((decode(key, &raw)?, row.get("version"))))
            }
            None => Ok(None),
        }
    }

    /// Unconditional write; replaces whatever is stored at `key`.
    pub async fn set(&self, key: &str, value: &Value) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO kv_store (key, value, version, updated_at) VALUES (?, ?, 1, ?)
               ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   version = kv_store.version + 1,
                   updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create-only write. Fails with a conflict when `key` already exists.
    pub async fn insert(&self, key: &str, value: &Value) -> Result<(), AppError> {
        let result =
            sqlx::query("INSERT INTO kv_store (key, value, version, updated_at) VALUES (?, ?, 1, ?)")
                .bind(key)
                .bind(value.to_string())
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(AppError::Conflict(format!("Key {} already exists", key)))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove `key`. Removing a missing key is a no-op.
    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Delete of missing key {}", key);
        }
        Ok(())
    }

    /// Every document whose key starts with `prefix`, in ascending key order.
    pub async fn get_by_prefix(&self, prefix: &str) -> Result<Vec<Value>, AppError> {
        let rows = match prefix_upper_bound(prefix) {
            Some(upper) => {
                sqlx::query("SELECT key, value FROM kv_store WHERE key >= ? AND key < ? ORDER BY key")
                    .bind(prefix)
                    .bind(upper)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT key, value FROM kv_store WHERE key >= ? ORDER BY key")
                    .bind(prefix)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter()
            .map(|row| {
                let key: String = row.get("key");
                let raw: String = row.get("value");
                decode(&key, &raw)
            })
            .collect()
    }

    /// Read-modify-write with optimistic concurrency.
    ///
    /// `apply` maps the stored document to its replacement. When another
    /// writer gets in between the read and the write, the document is re-read
    /// and `apply` runs again on the fresh copy. Returns `None` if the key
    /// does not exist.
    pub async fn update<F>(&self, key: &str, mut apply: F) -> Result<Option<Value>, AppError>
    where
        F: FnMut(&Value) -> Value,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let Some((current, version)) = self.get_versioned(key).await? else {
                return Ok(None);
            };

            let next = apply(&current);

            let result = sqlx::query(
                "UPDATE kv_store SET value = ?, version = version + 1, updated_at = ? WHERE key = ? AND version = ?",
            )
            .bind(next.to_string())
            .bind(Utc::now().to_rfc3339())
            .bind(key)
            .bind(version)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 1 {
                return Ok(Some(next));
            }

            tracing::debug!(
                "Concurrent modification of {} (attempt {}), retrying",
                key,
                attempt
            );
            tokio::task::yield_now().await;
        }

        Err(AppError::Conflict(format!(
            "Concurrent modification of {} detected, please retry",
            key
        )))
    }
}

fn decode(key: &str, raw: &str) -> Result<Value, AppError> {
    serde_json::from_str(raw).map_err(|e| {
        tracing::error!("Corrupt document at {}: {:?}", key, e);
        AppError::Database(format!("Corrupt document at {}: {}", key, e))
    })
}

/// Smallest string greater than every string starting with `prefix`.
///
/// `None` means the range is unbounded above (empty prefix, or a prefix of
/// only `char::MAX`).
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = next_char(last) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

fn next_char(c: char) -> Option<char> {
    match c {
        char::MAX => None,
        // skip the surrogate gap
        '\u{D7FF}' => Some('\u{E000}'),
        _ => char::from_u32(c as u32 + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use serde_json::json;
    use tempfile::TempDir;

    async fn store() -> (ContentStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("store.sqlite"))
            .await
            .unwrap();
        (ContentStore::new(pool), temp_dir)
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(prefix_upper_bound("event:").as_deref(), Some("event;"));
        assert_eq!(prefix_upper_bound("a").as_deref(), Some("b"));
        assert_eq!(prefix_upper_bound(""), None);
        assert_eq!(
            prefix_upper_bound("a\u{10FFFF}").as_deref(),
            Some("b")
        );
        assert_eq!(
            prefix_upper_bound("x\u{D7FF}").as_deref(),
            Some("x\u{E000}")
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (store, _dir) = store().await;
        assert!(store.get("event:missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let (store, _dir) = store().await;
        store.set("settings", &json!({ "a": 1 })).await.unwrap();
        store.set("settings", &json!({ "b": 2 })).await.unwrap();

        assert_eq!(store.get("settings").await.unwrap(), Some(json!({ "b": 2 })));
    }

    #[tokio::test]
    async fn test_insert_refuses_existing_key() {
        let (store, _dir) = store().await;
        store.insert("event:1", &json!({ "n": 1 })).await.unwrap();

        let err = store.insert("event:1", &json!({ "n": 2 })).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.get("event:1").await.unwrap(), Some(json!({ "n": 1 })));
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let (store, _dir) = store().await;
        store.delete("event:nope").await.unwrap();

        store.set("event:1", &json!({})).await.unwrap();
        store.delete("event:1").await.unwrap();
        assert!(store.get("event:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_prefix_scopes_to_prefix() {
        let (store, _dir) = store().await;
        store.set("event:2", &json!({ "id": "event:2" })).await.unwrap();
        store.set("event:1", &json!({ "id": "event:1" })).await.unwrap();
        store.set("events:x", &json!({ "id": "events:x" })).await.unwrap();
        store.set("news:1", &json!({ "id": "news:1" })).await.unwrap();
        store.set("settings", &json!({})).await.unwrap();

        let events = store.get_by_prefix("event:").await.unwrap();
        let ids: Vec<&str> = events.iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["event:1", "event:2"]);

        assert!(store.get_by_prefix("leader:").await.unwrap().is_empty());
        assert_eq!(store.get_by_prefix("").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_update_missing_returns_none() {
        let (store, _dir) = store().await;
        let result = store.update("event:missing", |v| v.clone()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_disjoint_fields() {
        let (store, _dir) = store().await;
        store
            .insert("event:1", &json!({ "title": "Old", "location": "Hall" }))
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for i in 0..6 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .update("event:1", |current| {
                        let mut next = current.clone();
                        next[format!("field{}", i)] = json!(i);
                        next
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let record = store.get("event:1").await.unwrap().unwrap();
        for i in 0..6 {
            assert_eq!(record[format!("field{}", i)], json!(i));
        }
        assert_eq!(record["title"], "Old");
    }
}
