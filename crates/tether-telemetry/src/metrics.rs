//! Metric name constants and recording helpers
//!
//! Instruments are created from the global meter, so recording is a no-op
//! until [`crate::init`] installs an exporter.

use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::global;

// LLM metric names
pub const LLM_REQUEST_DURATION: &str = "llm.request.duration";
pub const LLM_REQUEST_COUNT: &str = "llm.request.count";
pub const LLM_TOKEN_USAGE: &str = "llm.token.usage";

// Vector store metric names
pub const VECTOR_QUERY_DURATION: &str = "vector.query.duration";

const METER_NAME: &str = "tether";

/// Record one finished LLM request
///
/// `operation` is the client call (`complete`, `chat`, `stream_chat`, ...).
pub fn record_llm_request(operation: &'static str, start: Instant, success: bool) {
    let meter = global::meter(METER_NAME);
    let attributes = [
        KeyValue::new("operation", operation),
        KeyValue::new("success", success),
    ];

    meter
        .f64_histogram(LLM_REQUEST_DURATION)
        .with_unit("s")
        .build()
        .record(start.elapsed().as_secs_f64(), &attributes);
    meter.u64_counter(LLM_REQUEST_COUNT).build().add(1, &attributes);
}

/// Record token counts reported by the backend
///
/// Only counters the backend actually reported are recorded.
pub fn record_token_usage(operation: &'static str, prompt: Option<u32>, completion: Option<u32>) {
    let counter = global::meter(METER_NAME).u64_counter(LLM_TOKEN_USAGE).build();

    for (kind, value) in [("prompt", prompt), ("completion", completion)] {
        if let Some(value) = value {
            counter.add(
                u64::from(value),
                &[KeyValue::new("operation", operation), KeyValue::new("token.type", kind)],
            );
        }
    }
}

/// Record the duration of a vector store query
pub fn record_vector_query(index: &str, start: Instant) {
    global::meter(METER_NAME)
        .f64_histogram(VECTOR_QUERY_DURATION)
        .with_unit("s")
        .build()
        .record(start.elapsed().as_secs_f64(), &[KeyValue::new("index", index.to_owned())]);
}
