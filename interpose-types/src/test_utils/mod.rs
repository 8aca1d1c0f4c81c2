//! In-memory runtimes and sinks for testing.
//!
//! Available behind the `test-utils` feature flag. None of these spawn
//! anything; they exist so the executor and coordinator can be exercised
//! without a real sandbox.

mod recording_runtime;
mod recording_sink;
mod sleep_runtime;
mod static_runtime;

pub use recording_runtime::RecordingRuntime;
pub use recording_sink::RecordingSink;
pub use sleep_runtime::SleepRuntime;
pub use static_runtime::StaticRuntime;
