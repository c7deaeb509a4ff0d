/*
[INPUT]:  Public API exports for deepcoin-stream crate
[OUTPUT]: Module declarations and public re-exports
[POS]:    Crate root - library entry point
[UPDATE]: When adding new modules or public exports
*/

pub mod config;
pub mod runner;

// Re-export main types for convenience
pub use config::{EndpointKind, StreamConfig, SubscriptionConfig, TopicKind};
pub use runner::StreamRunner;
