//! MongoDB client wrapper
//!
//! Pattern adapted from holo-host/rust/util_libs/db/src/mongodb

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::{
    options::{IndexOptions, UpdateModifications},
    Client, IndexModel,
};
use tracing::{debug, info};

use crate::db::PipelineExecutor;
use crate::query::Pipeline;
use crate::types::{Result, StoreError};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri).await.map_err(|e| {
            StoreError::StorageUnavailable(format!("Failed to connect to MongoDB: {}", e))
        })?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::StorageUnavailable(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Apply schema-defined indexes to a collection
    pub async fn ensure_indexes<T: IntoIndexes>(&self, collection_name: &str) -> Result<usize> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(0);
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();
        let count = indices.len();

        self.client
            .database(&self.db_name)
            .collection::<Document>(collection_name)
            .create_indexes(indices)
            .await
            .map_err(|e| {
                StoreError::StorageUnavailable(format!("Failed to create indexes: {}", e))
            })?;

        info!("Applied {} index(es) to '{}'", count, collection_name);
        Ok(count)
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

#[async_trait]
impl PipelineExecutor for MongoClient {
    async fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Document>> {
        let stages = pipeline.to_documents();
        debug!(collection, ?stages, "Running aggregation");

        let cursor = self
            .client
            .database(&self.db_name)
            .collection::<Document>(collection)
            .aggregate(stages)
            .await?;

        Ok(cursor.try_collect::<Vec<Document>>().await?)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: UpdateModifications,
    ) -> Result<u64> {
        debug!(collection, ?filter, ?update, "Running update_many");

        let result = self
            .client
            .database(&self.db_name)
            .collection::<Document>(collection)
            .update_many(filter, update)
            .await?;

        Ok(result.modified_count)
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running MongoDB instance;
    // pipeline semantics are covered through MemoryExecutor
}
