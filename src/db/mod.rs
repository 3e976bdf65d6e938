//! Storage layer
//!
//! The repository talks to storage only through [`PipelineExecutor`].
//! [`MongoClient`] runs pipelines on a live deployment; [`MemoryExecutor`]
//! interprets them in process.

mod executor;
pub mod memory;
pub mod mongo;
pub mod schemas;

pub use executor::PipelineExecutor;
pub use memory::MemoryExecutor;
pub use mongo::{IntoIndexes, MongoClient};
