//! Logging setup, timing and event payloads.

mod subscriber;
mod wide_events;

pub use subscriber::{env_filter_directive, init_tracing, LogFormat, SpanTimer, LOG_ENV_VAR};
pub use wide_events::{agent_payload, pipeline_payload, transition_payload};
