//! Synchronization: upstream seams and the coordinator.

pub mod coordinator;
pub mod source;

pub use coordinator::{CoordinatorConfig, SyncCoordinator, SyncOutcome};
pub use source::{MacroSeriesProvider, PriceProvider};
