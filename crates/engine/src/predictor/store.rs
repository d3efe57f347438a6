use sqlx::PgPool;

use super::scorer::Prediction;

/// Durable prediction records, one row per (device, component), replaced
/// in place each scoring cycle.
pub struct PredictionStore {
    pool: PgPool,
}

impl PredictionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, prediction: &Prediction) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO predictions
               (id, device_id, component, failure_probability, days_to_failure,
                confidence, generated_at)
               VALUES ($1, $2, $3, $4, $5, $6,
                       to_timestamp($7::double precision / 1000))
               ON CONFLICT (device_id, component) DO UPDATE SET
                   id = EXCLUDED.id,
                   failure_probability = EXCLUDED.failure_probability,
                   days_to_failure = EXCLUDED.days_to_failure,
                   confidence = EXCLUDED.confidence,
                   generated_at = EXCLUDED.generated_at"#,
        )
        .bind(&prediction.id)
        .bind(&prediction.device_id)
        .bind(prediction.component.as_str())
        .bind(prediction.failure_probability)
        .bind(prediction.days_to_failure)
        .bind(prediction.confidence)
        .bind(prediction.generated_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
