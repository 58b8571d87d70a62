//! Tierio drive pool
//!
//! This crate owns the set of primary/mirror drive pairs and answers two
//! questions for the rest of the engine: which pair should host N bytes, and
//! which tier a payload of a given size maps to. It also keeps per-drive
//! usage counters that are safe to update under true parallelism.

pub mod pool;
pub mod slot;

pub use pool::{DrivePairHandle, DrivePool, DriveUsage, UsageCounter};
pub use slot::DriveSlot;
