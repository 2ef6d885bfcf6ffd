use std::{path::Path, sync::Arc};

use async_trait::async_trait;
use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};

use super::{DeviceFound, DeviceFoundSink, SinkError};

/// Keeps a history of every resolution in `device_found_events`.
pub struct SqliteDeviceFoundSink {
    pool: Arc<Pool<Sqlite>>,
}

impl SqliteDeviceFoundSink {
    pub async fn create_from_file<P>(path_arg: P) -> Result<Box<dyn DeviceFoundSink>, SinkError>
    where
        P: AsRef<Path>,
    {
        let url = format!("sqlite://{}?mode=rwc", path_arg.as_ref().display());
        let pool = Arc::new(SqlitePoolOptions::new().connect(&url).await?);
        let sink = SqliteDeviceFoundSink::create_from_pool(pool).await?;
        Ok(Box::new(sink))
    }

    pub async fn create_from_pool(pool: Arc<Pool<Sqlite>>) -> Result<SqliteDeviceFoundSink, SinkError> {
        sqlx::migrate!("../migrations").run(&*pool).await?;
        Ok(SqliteDeviceFoundSink { pool })
    }
}

#[async_trait]
impl DeviceFoundSink for SqliteDeviceFoundSink {
    async fn device_found(&mut self, event: &DeviceFound) -> Result<(), SinkError> {
        sqlx::query(
            "
            INSERT INTO device_found_events (date_time, identity, name, distance)
            VALUES (?, ?, ?, ?)",
        )
        .bind(event.date_time)
        .bind(event.identity.to_string())
        .bind(&event.name)
        .bind(event.distance)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }
    async fn close(mut self: Box<Self>) -> Result<(), SinkError> {
        self.pool.close().await;
        Ok(())
    }
}
