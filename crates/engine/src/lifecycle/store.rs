use sqlx::PgPool;

use super::anomaly::{Anomaly, AnomalySource};

/// Durable anomaly records. Upserts keep the row current through the
/// active -> investigating -> resolved lifecycle so open anomalies survive
/// a process restart.
pub struct AnomalyStore {
    pool: PgPool,
}

impl AnomalyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, anomaly: &Anomaly) -> Result<(), sqlx::Error> {
        let source_kind = match &anomaly.source {
            AnomalySource::Rule(_) => "rule",
            AnomalySource::Prediction(_) => "prediction",
        };
        let source_ref = match &anomaly.source {
            AnomalySource::Rule(rule_id) => rule_id.clone(),
            AnomalySource::Prediction(component) => component.clone(),
        };

        sqlx::query(
            r#"INSERT INTO anomalies
               (id, source_kind, source_ref, device_id, metric, observed_value,
                threshold, severity, status, first_triggered_at, last_updated_at,
                resolved_at, resolution_reason)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                       to_timestamp($10::double precision / 1000),
                       to_timestamp($11::double precision / 1000),
                       CASE WHEN $12::bigint IS NOT NULL
                            THEN to_timestamp($12::double precision / 1000)
                            ELSE NULL END,
                       $13)
               ON CONFLICT (id) DO UPDATE SET
                   observed_value = EXCLUDED.observed_value,
                   status = EXCLUDED.status,
                   last_updated_at = EXCLUDED.last_updated_at,
                   resolved_at = EXCLUDED.resolved_at,
                   resolution_reason = EXCLUDED.resolution_reason"#,
        )
        .bind(&anomaly.id)
        .bind(source_kind)
        .bind(source_ref)
        .bind(&anomaly.device_id)
        .bind(anomaly.metric.as_str())
        .bind(anomaly.observed_value)
        .bind(anomaly.threshold)
        .bind(anomaly.severity.as_str())
        .bind(anomaly.status.as_str())
        .bind(anomaly.first_triggered_at_ms)
        .bind(anomaly.last_updated_at_ms)
        .bind(anomaly.resolved_at_ms)
        .bind(&anomaly.resolution_reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
