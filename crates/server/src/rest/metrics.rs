use axum::extract::State;

use super::AppState;

pub async fn exposition(State(state): State<AppState>) -> String {
    let m = &state.metrics;
    let mut out = String::with_capacity(1024);

    write_counter(&mut out, "lumiwatch_engine_readings_ingested_total", m.readings_ingested_val());
    write_counter(&mut out, "lumiwatch_engine_readings_rejected_total", m.readings_rejected_val());
    write_counter(&mut out, "lumiwatch_engine_evaluator_dropped_total", m.evaluator_dropped_val());
    write_counter(&mut out, "lumiwatch_engine_scorer_dropped_total", m.scorer_dropped_val());
    write_counter(&mut out, "lumiwatch_engine_triggers_emitted_total", m.triggers_emitted_val());
    write_counter(&mut out, "lumiwatch_engine_clears_emitted_total", m.clears_emitted_val());
    write_counter(&mut out, "lumiwatch_engine_anomalies_opened_total", m.anomalies_opened_val());
    write_counter(&mut out, "lumiwatch_engine_anomalies_resolved_total", m.anomalies_resolved_val());
    write_counter(&mut out, "lumiwatch_engine_predictions_computed_total", m.predictions_computed_val());
    write_counter(&mut out, "lumiwatch_engine_scorer_cycles_total", m.scorer_cycles_val());
    write_counter(&mut out, "lumiwatch_engine_notifications_sent_total", m.notifications_sent_val());
    write_counter(&mut out, "lumiwatch_engine_notifications_failed_total", m.notifications_failed_val());

    out
}

fn write_counter(out: &mut String, name: &str, val: u64) {
    use std::fmt::Write;
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {val}");
}
