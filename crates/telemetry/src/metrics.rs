use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Engine Metrics ====
    pub static ref ENGINE_FRAMES_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "engine_frames_processed_total",
                "Total number of frames fed to the online recognizer",
            ),
            &["action", "outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ENGINE_REPS_COUNTED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "engine_reps_counted_total",
                "Total number of repetitions credited",
            ),
            &["action"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ENGINE_INFER_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "engine_infer_latency_seconds",
                "Per-frame inference latency",
            ),
            &["action"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ENGINE_FINALIZE_DURATION: Histogram = {
        let metric = Histogram::with_opts(HistogramOpts::new(
            "engine_finalize_duration_seconds",
            "Duration of the action learning pipeline",
        ))
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref ENGINE_ACTIVE_SESSIONS: IntGauge = {
        let metric = IntGauge::new(
            "engine_active_sessions",
            "Number of live recognizer sessions",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Encode the engine registry in Prometheus text format.
pub fn encode_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_and_encode() {
        ENGINE_FRAMES_PROCESSED
            .with_label_values(&["arm_raise", "success"])
            .inc();
        ENGINE_ACTIVE_SESSIONS.set(1);
        let text = encode_metrics().unwrap();
        assert!(text.contains("engine_frames_processed_total"));
        assert!(text.contains("engine_active_sessions"));
    }
}
