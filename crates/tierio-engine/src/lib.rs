//! Tierio engine
//!
//! Public entry point of the storage engine. The operation executor
//! validates inputs, throttles concurrent operations behind a counting
//! semaphore, records every operation for the metrics window, and delegates
//! to the mirrored store through the read-through cache. `StorageEngine`
//! wires all components together from a single configuration value.

pub mod backend;
pub mod engine;
pub mod executor;
pub mod metrics;

pub use backend::StorageBackend;
pub use engine::StorageEngine;
pub use executor::OperationExecutor;
pub use metrics::{MetricsTotals, OperationMetrics, OperationRecord};
