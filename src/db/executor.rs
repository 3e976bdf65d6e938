//! Storage seam for pipeline execution

use async_trait::async_trait;
use bson::Document;
use mongodb::options::UpdateModifications;

use crate::query::Pipeline;
use crate::types::Result;

/// Executes aggregation pipelines and read-state updates against named collections
#[async_trait]
pub trait PipelineExecutor: Send + Sync {
    /// Run a read-only pipeline, returning the raw result documents in order
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Document>>;

    /// Apply `update` to every document matching `filter` as a single
    /// operation, returning the modified count
    ///
    /// `update` is either an operator document or an update pipeline.
    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: UpdateModifications,
    ) -> Result<u64>;
}
