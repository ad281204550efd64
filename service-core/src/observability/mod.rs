pub mod logging;
pub mod trace_context;

pub use logging::init_tracing;
pub use trace_context::{
    TRACEPARENT_HEADER, TRACESTATE_HEADER, TracedRequestExt, inject_trace_context,
};
