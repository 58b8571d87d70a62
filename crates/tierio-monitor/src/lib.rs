//! Tierio health monitor
//!
//! A background sampling loop that polls every configured drive for live
//! space figures, classifies each drive OK/Warning/Critical by usage
//! percentage, retains a bounded snapshot history per drive, and notifies
//! subscribers on every sample.

pub mod monitor;

pub use monitor::{
    HealthMonitor, HealthSnapshot, HealthStatus, HealthThresholds, SubscriptionHandle,
};
