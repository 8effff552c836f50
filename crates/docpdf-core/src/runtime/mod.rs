//! Asynchronous task lifecycle: task records, the registry that owns them,
//! admission control for engine processes, and the orchestrator that ties a
//! stored upload to a conversion.

pub mod admission;
pub mod orchestrator;
pub mod registry;
pub mod task;
