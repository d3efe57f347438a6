use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use lumiwatch_engine::ingress::Ingress;
use lumiwatch_engine::lifecycle::LifecycleManager;
use lumiwatch_engine::metrics::EngineMetrics;
use lumiwatch_engine::notifier::DlqWriter;
use lumiwatch_engine::query::QueryService;
use lumiwatch_engine::rules::RuleStore;

use super::{anomalies, devices, health, metrics, predictions, readings, rules};

#[derive(Clone)]
pub struct AppState {
    pub ingress: Arc<Ingress>,
    pub rules: Arc<RuleStore>,
    pub lifecycle: Arc<LifecycleManager>,
    pub query: Arc<QueryService>,
    pub metrics: Arc<EngineMetrics>,
    pub db: Option<sqlx::PgPool>,
    pub dlq: Option<Arc<DlqWriter>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/ready", get(health::ready))
        .route("/metrics", get(metrics::exposition))
        .route("/v1/readings", post(readings::ingest_reading))
        .route("/v1/rules", get(rules::list_rules).post(rules::create_rule))
        .route(
            "/v1/rules/{rule_id}",
            get(rules::get_rule)
                .put(rules::update_rule)
                .delete(rules::delete_rule),
        )
        .route("/v1/rules/{rule_id}/disable", post(rules::disable_rule))
        .route("/v1/anomalies", get(anomalies::list_anomalies))
        .route("/v1/anomalies/{anomaly_id}", get(anomalies::get_anomaly))
        .route(
            "/v1/anomalies/{anomaly_id}/acknowledge",
            post(anomalies::acknowledge_anomaly),
        )
        .route(
            "/v1/anomalies/{anomaly_id}/investigate",
            post(anomalies::investigate_anomaly),
        )
        .route(
            "/v1/anomalies/{anomaly_id}/resolve",
            post(anomalies::resolve_anomaly),
        )
        .route("/v1/predictions", get(predictions::list_predictions))
        .route("/v1/devices", get(devices::list_devices))
        .route("/v1/devices/{device_id}/snapshot", get(devices::get_device))
        .route(
            "/v1/notifications/failed",
            get(devices::failed_notifications),
        )
        .route("/v1/notifications/dlq", get(devices::dead_letters))
        .route("/v1/stats/ingest", get(devices::ingest_stats))
        .with_state(state)
}
