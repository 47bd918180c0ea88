pub mod browser;
pub mod cache;
pub mod checkpoint;
pub mod delay_manager;
pub mod input_loader;
pub mod logger;
pub mod orchestrator;
pub mod resolver;

// Exporting types for convenience
pub use cache::ResultCache;
pub use checkpoint::CheckpointStore;
pub use input_loader::InputTable;
pub use orchestrator::{RunConfig, RunError, RunSummary};
pub use resolver::{ChromeFetcher, NameFetcher, Resolution, ResolveError};
