use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite, sqlite::SqlitePoolOptions};

use super::{SettingsError, SettingsStore};

pub struct SqliteSettingsStore {
    pool: Arc<Pool<Sqlite>>,
}

impl SqliteSettingsStore {
    pub async fn create_from_file<P>(path_arg: P) -> Result<SqliteSettingsStore, SettingsError>
    where
        P: AsRef<Path>,
    {
        let url = format!("sqlite://{}?mode=rwc", path_arg.as_ref().display());
        let pool = Arc::new(SqlitePoolOptions::new().connect(&url).await?);
        SqliteSettingsStore::create_from_pool(pool).await
    }

    pub async fn create_from_pool(pool: Arc<Pool<Sqlite>>) -> Result<SqliteSettingsStore, SettingsError> {
        sqlx::migrate!("../migrations").run(&*pool).await?;
        Ok(SqliteSettingsStore { pool })
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn load_flag(&self, key: &str) -> Result<Option<bool>, SettingsError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.map(|r| r.get::<bool, _>(0)))
    }

    async fn store_flag(&self, key: &str, value: bool) -> Result<(), SettingsError> {
        sqlx::query(
            "
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }
}
