/// Fresh record id. Every anomaly, prediction and notification job gets one.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
