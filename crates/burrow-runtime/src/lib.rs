//! Burrow Runtime
//!
//! Tokio runtime layer for the tunnel orchestrator: the serialized lifecycle
//! task, configuration deduplication, runtime assembly, and the in-memory
//! stub subsystem used for tests and demos.
//!
//! See `burrow-core` for the types, traits, and channel protocol this crate
//! builds on.

pub mod dedup;
pub mod orchestrator;
pub mod runtime;
pub mod stub;

pub use orchestrator::OrchestratorTask;
pub use runtime::{OrchestratorHandle, TunnelRuntime};
pub use stub::{MemorySettings, StubHandle, StubRegistry, StubSubsystem};
