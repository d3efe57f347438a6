use sqlx::PgPool;

/// Durable record of notification jobs that exhausted their retries.
pub struct DlqWriter {
    pool: PgPool,
}

impl DlqWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        anomaly_id: &str,
        channel: &str,
        payload: &serde_json::Value,
        error: &str,
        attempts: u32,
    ) -> Result<(), sqlx::Error> {
        let id = lumiwatch_common::id::new_id();
        sqlx::query(
            r#"INSERT INTO notifications_dlq
               (id, anomaly_id, channel, payload, error, attempts)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(&id)
        .bind(anomaly_id)
        .bind(channel)
        .bind(payload)
        .bind(error)
        .bind(attempts as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<DlqEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, DlqEntry>(
            "SELECT id, anomaly_id, channel, error, attempts, created_at \
             FROM notifications_dlq \
             ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Debug, serde::Serialize, sqlx::FromRow)]
pub struct DlqEntry {
    pub id: String,
    pub anomaly_id: String,
    pub channel: String,
    pub error: String,
    pub attempts: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
