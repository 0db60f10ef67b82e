//! Prometheus metrics for the orchestrator.
//!
//! [`OrchestratorMetrics`] owns a dedicated [`Registry`]; `GET /metrics`
//! encodes it in the text exposition format.

use ekyc_verification::VerificationService;
use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

pub struct OrchestratorMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Codes handed to the provider.
    pub codes_sent: IntCounter,
    /// Send requests refused by policy or the provider.
    pub send_rejections: IntCounter,
    pub verify_attempts: IntCounter,
    pub verifications_succeeded: IntCounter,
    /// Document submits that reached the reconciler, whatever the outcome.
    pub document_submits: IntCounter,
    pub face_matches_succeeded: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Sampled at scrape time.
    pub fully_verified_subjects: IntGauge,
    /// Status fetches that reached the backend, sampled at scrape time.
    pub status_fetches: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub request_duration_ms: Histogram,
}

impl OrchestratorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let codes_sent = register_int_counter_with_registry!(
            Opts::new("ekyc_codes_sent_total", "One-time codes delivered to the provider"),
            registry
        )?;
        let send_rejections = register_int_counter_with_registry!(
            Opts::new("ekyc_send_rejections_total", "Code requests refused"),
            registry
        )?;
        let verify_attempts = register_int_counter_with_registry!(
            Opts::new("ekyc_verify_attempts_total", "Code verification attempts"),
            registry
        )?;
        let verifications_succeeded = register_int_counter_with_registry!(
            Opts::new("ekyc_verifications_succeeded_total", "Codes verified successfully"),
            registry
        )?;
        let document_submits = register_int_counter_with_registry!(
            Opts::new("ekyc_document_submits_total", "Document confirmation submits"),
            registry
        )?;
        let face_matches_succeeded = register_int_counter_with_registry!(
            Opts::new("ekyc_face_matches_succeeded_total", "Face matches above threshold"),
            registry
        )?;

        let fully_verified_subjects = register_int_gauge_with_registry!(
            Opts::new("ekyc_fully_verified_subjects", "Subjects known to be fully verified"),
            registry
        )?;
        let status_fetches = register_int_gauge_with_registry!(
            Opts::new("ekyc_status_fetches", "Status fetches issued to the backend"),
            registry
        )?;

        // 1 ms → ~16 s
        let request_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new("ekyc_request_duration_ms", "HTTP handler latency in milliseconds")
                .buckets(prometheus::exponential_buckets(1.0, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            codes_sent,
            send_rejections,
            verify_attempts,
            verifications_succeeded,
            document_submits,
            face_matches_succeeded,
            fully_verified_subjects,
            status_fetches,
            request_duration_ms,
        })
    }

    /// Refresh sampled gauges and encode the registry.
    pub fn render(&self, service: &VerificationService) -> Result<String, prometheus::Error> {
        self.fully_verified_subjects
            .set(i64::try_from(service.fully_verified_count()).unwrap_or(i64::MAX));
        self.status_fetches
            .set(i64::try_from(service.status_fetches_issued()).unwrap_or(i64::MAX));

        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
