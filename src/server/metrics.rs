use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all admin server metrics
const PREFIX: &str = "chathub_admin";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Maintenance Job Metrics
    pub static ref MAINTENANCE_JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_maintenance_jobs_total"), "Finished maintenance jobs by outcome"),
        &["status"]
    ).expect("Failed to create maintenance_jobs_total metric");

    pub static ref MAINTENANCE_JOB_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_maintenance_job_duration_seconds"),
            "Maintenance job duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 300.0])
    ).expect("Failed to create maintenance_job_duration_seconds metric");

    pub static ref MAINTENANCE_JOBS_RUNNING: Gauge = Gauge::new(
        format!("{PREFIX}_maintenance_jobs_running"),
        "Number of maintenance jobs currently running"
    ).expect("Failed to create maintenance_jobs_running metric");

    pub static ref MAINTENANCE_STEPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_maintenance_steps_total"), "Executed cleanup steps by outcome"),
        &["step", "status"]
    ).expect("Failed to create maintenance_steps_total metric");

    pub static ref MAINTENANCE_DELETED_BYTES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_maintenance_deleted_bytes_total"), "Bytes removed by cleanup steps"),
        &["step"]
    ).expect("Failed to create maintenance_deleted_bytes_total metric");

    // Security Metrics
    pub static ref RATE_LIMIT_HITS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_rate_limit_hits_total"), "Rate limit violations"),
        &["endpoint"]
    ).expect("Failed to create rate_limit_hits_total metric");

    pub static ref CSRF_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_csrf_failures_total"), "CSRF validation failures"),
        &["reason", "enforced"]
    ).expect("Failed to create csrf_failures_total metric");

    // Backup Metrics
    pub static ref BACKUP_OPERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_backup_operations_total"), "Backup registry operations"),
        &["operation", "entity_type"]
    ).expect("Failed to create backup_operations_total metric");

    pub static ref BACKUPS_PURGED_TOTAL: prometheus::Counter = prometheus::Counter::new(
        format!("{PREFIX}_backups_purged_total"),
        "Expired backups removed"
    ).expect("Failed to create backups_purged_total metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(MAINTENANCE_JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MAINTENANCE_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(MAINTENANCE_JOBS_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(MAINTENANCE_STEPS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(MAINTENANCE_DELETED_BYTES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RATE_LIMIT_HITS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CSRF_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKUP_OPERATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKUPS_PURGED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn set_maintenance_job_running(delta: f64) {
    MAINTENANCE_JOBS_RUNNING.add(delta);
}

/// Record a finished maintenance job ("completed" or "failed")
pub fn record_maintenance_job(status: &str, duration: Duration) {
    MAINTENANCE_JOBS_TOTAL.with_label_values(&[status]).inc();
    MAINTENANCE_JOB_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record one executed cleanup step
pub fn record_maintenance_step(step: &str, success: bool, bytes: u64) {
    let status = if success { "success" } else { "failure" };
    MAINTENANCE_STEPS_TOTAL
        .with_label_values(&[step, status])
        .inc();
    if bytes > 0 {
        MAINTENANCE_DELETED_BYTES_TOTAL
            .with_label_values(&[step])
            .inc_by(bytes as f64);
    }
}

/// Record a rate limit hit
pub fn record_rate_limit_hit(endpoint: &str) {
    RATE_LIMIT_HITS_TOTAL.with_label_values(&[endpoint]).inc();
}

pub fn record_csrf_failure(reason: &str, enforced: bool) {
    CSRF_FAILURES_TOTAL
        .with_label_values(&[reason, if enforced { "true" } else { "false" }])
        .inc();
}

/// Record a backup operation ("soft_delete" or "recover")
pub fn record_backup_operation(operation: &str, entity_type: &str) {
    BACKUP_OPERATIONS_TOTAL
        .with_label_values(&[operation, entity_type])
        .inc();
}

pub fn record_backups_purged(count: usize) {
    BACKUPS_PURGED_TOTAL.inc_by(count as f64);
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
