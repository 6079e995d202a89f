use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};

/// Prometheus Metrics für Batches, Deadletter und Job-Fortschritt
pub struct Metrics {
    pub registry: Registry,
    pub documents_attempted: IntCounterVec,
    pub documents_failed: IntCounterVec,
    pub write_conflicts_ignored: IntCounterVec,
    pub batches: IntCounterVec,
    pub batch_duration: HistogramVec,
    pub deadletter_exports: IntCounterVec,
    pub job_percentage: GaugeVec,
    pub job_eta_seconds: GaugeVec,
    pub job_average_rate: GaugeVec,
    pub progress_conflicts: CounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let documents_attempted = IntCounterVec::new(
            Opts::new(
                "migrator_documents_attempted_total",
                "Documents delivered to the batch handler",
            ),
            &["job"],
        )
        .expect("Failed to create documents_attempted metric");

        let documents_failed = IntCounterVec::new(
            Opts::new(
                "migrator_documents_failed_total",
                "Documents that could not be written to the destination",
            ),
            &["job"],
        )
        .expect("Failed to create documents_failed metric");

        let write_conflicts_ignored = IntCounterVec::new(
            Opts::new(
                "migrator_write_conflicts_ignored_total",
                "Insert-only writes skipped because the document already existed",
            ),
            &["job"],
        )
        .expect("Failed to create write_conflicts_ignored metric");

        let batches = IntCounterVec::new(
            Opts::new("migrator_batches_total", "Handled change batches"),
            &["job", "outcome"],
        )
        .expect("Failed to create batches metric");

        let batch_duration = HistogramVec::new(
            HistogramOpts::new(
                "migrator_batch_duration_seconds",
                "Wall time spent handling one batch",
            ),
            &["job"],
        )
        .expect("Failed to create batch_duration metric");

        let deadletter_exports = IntCounterVec::new(
            Opts::new(
                "migrator_deadletter_exports_total",
                "Deadletter objects written",
            ),
            &["job"],
        )
        .expect("Failed to create deadletter_exports metric");

        let job_percentage = GaugeVec::new(
            Opts::new("migrator_job_percentage", "Migration completion percentage"),
            &["job"],
        )
        .expect("Failed to create job_percentage metric");

        let job_eta_seconds = GaugeVec::new(
            Opts::new("migrator_job_eta_seconds", "Estimated seconds remaining"),
            &["job"],
        )
        .expect("Failed to create job_eta_seconds metric");

        let job_average_rate = GaugeVec::new(
            Opts::new(
                "migrator_job_average_rate",
                "Average documents per second since job start",
            ),
            &["job"],
        )
        .expect("Failed to create job_average_rate metric");

        let progress_conflicts = CounterVec::new(
            Opts::new(
                "migrator_progress_conflicts_total",
                "Job status updates rejected by a concurrent writer",
            ),
            &["job"],
        )
        .expect("Failed to create progress_conflicts metric");

        registry.register(Box::new(documents_attempted.clone())).ok();
        registry.register(Box::new(documents_failed.clone())).ok();
        registry.register(Box::new(write_conflicts_ignored.clone())).ok();
        registry.register(Box::new(batches.clone())).ok();
        registry.register(Box::new(batch_duration.clone())).ok();
        registry.register(Box::new(deadletter_exports.clone())).ok();
        registry.register(Box::new(job_percentage.clone())).ok();
        registry.register(Box::new(job_eta_seconds.clone())).ok();
        registry.register(Box::new(job_average_rate.clone())).ok();
        registry.register(Box::new(progress_conflicts.clone())).ok();

        Self {
            registry,
            documents_attempted,
            documents_failed,
            write_conflicts_ignored,
            batches,
            batch_duration,
            deadletter_exports,
            job_percentage,
            job_eta_seconds,
            job_average_rate,
            progress_conflicts,
        }
    }

    /// Text-Exposition für den /metrics Endpunkt
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
