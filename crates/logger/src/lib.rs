//! Shared tracing setup for the poller binaries.

mod subscriber;

pub use subscriber::init_tracing;
