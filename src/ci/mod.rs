pub mod descriptor;
pub mod engine;
pub mod execution;

// Re-export main types that will be used by the application
pub use descriptor::{CIDescriptor, ResourceProfile};
pub use engine::{ExecutionEngine, ExecutionManager, ProviderEngine, SimulationEngine};
pub use execution::{Execution, ExecutionOptions, ExecutionStatus, LogEntry, LogLevel, Metrics};
