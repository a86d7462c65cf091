/*!
 * Monitoring
 * Structured tracing setup
 */

pub mod tracer;

pub use tracer::{arena_span, init_tracing, pool_span};
