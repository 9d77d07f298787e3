//! Cooperative cancellation for pipeline runs.
//!
//! Each run owns one [`CancellationToken`]. The stage executor races the
//! provider call against it so an external cancel drops the in-flight call.

mod token;

pub use token::CancellationToken;
