use metrics::counter;

pub const METRICS_NAMESPACE: &str = "PelotonWarehouse";

/// Error/Reliability Metrics - Success/Failure pairs
pub fn increment_peloton_api_success() {
    counter!("peloton_api_total", "result" => "success").increment(1);
}

pub fn increment_peloton_api_failure() {
    counter!("peloton_api_total", "result" => "failure").increment(1);
}

pub fn increment_warehouse_load_success() {
    counter!("warehouse_load_total", "result" => "success").increment(1);
}

pub fn increment_warehouse_load_failure() {
    counter!("warehouse_load_total", "result" => "failure").increment(1);
}

pub fn increment_lambda_success() {
    counter!("lambda_total", "result" => "success").increment(1);
}

pub fn increment_lambda_failure() {
    counter!("lambda_total", "result" => "failure").increment(1);
}

/// Business Logic Metrics
pub fn increment_rows_loaded(table: &str, count: u64) {
    counter!("rows_loaded", "table" => table.to_string()).increment(count);
}

pub fn increment_workouts_fetched(count: u64) {
    counter!("workouts_fetched").increment(count);
}
