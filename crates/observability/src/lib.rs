//! Process-wide tracing setup shared by the matflow binaries and tests.

pub mod subscriber;

pub use subscriber::{LogFormat, init, init_with};
