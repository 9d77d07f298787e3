//! Request payload construction.
//!
//! The payload for stage N is the entity profile plus the results of the
//! completed stages before N, and nothing else.

mod accumulator;
mod payload;

pub use accumulator::ContextAccumulator;
pub use payload::RequestPayload;
