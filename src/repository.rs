//! Notification repository
//!
//! Read-model over the notification and publish collections. Every query is
//! scoped by tenant; list queries are further scoped to one recipient.
//!
//! The count and page pipelines of a list request run concurrently and are
//! not transactionally linked: a write landing between them can make
//! `total_count` disagree with the rows actually retrievable.

use bson::{doc, oid::ObjectId};
use tracing::{debug, instrument};

use crate::db::schemas::{NotificationWithPublish, NOTIFICATION_COLLECTION, PUBLISH_COLLECTION};
use crate::db::PipelineExecutor;
use crate::query::criteria::owned_notifications_filter;
use crate::query::{
    single_notification_pipeline, Filter, FilterSet, ListPipelines, NotificationCriteria,
    PageRequest,
};
use crate::types::{Result, StoreError};
use crate::views::{assemble_page, decode_joined, PageResult};

/// Collection names the repository reads from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    pub notifications: String,
    pub publishes: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            notifications: NOTIFICATION_COLLECTION.to_string(),
            publishes: PUBLISH_COLLECTION.to_string(),
        }
    }
}

/// Read-state changes for one recipient
#[derive(Debug, Clone, Default)]
pub struct MarkRequest {
    pub mark_read_ids: Vec<String>,
    pub unmark_read_ids: Vec<String>,
}

/// Parse a notification id from its hex form
pub fn parse_notification_id(raw: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw.trim()).map_err(|e| {
        StoreError::InvalidArgument(format!("Invalid notification id '{}': {}", raw, e))
    })
}

fn parse_ids(raw: &[String]) -> Result<Vec<ObjectId>> {
    raw.iter().map(|id| parse_notification_id(id)).collect()
}

/// Notification read-model over any pipeline executor
pub struct NotificationRepository<E> {
    executor: E,
    collections: CollectionNames,
}

impl<E: PipelineExecutor> NotificationRepository<E> {
    pub fn new(executor: E) -> Self {
        Self::with_collections(executor, CollectionNames::default())
    }

    pub fn with_collections(executor: E, collections: CollectionNames) -> Self {
        Self {
            executor,
            collections,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn collections(&self) -> &CollectionNames {
        &self.collections
    }

    /// Fetch one notification joined with its publish
    ///
    /// A notification whose publish no longer exists is reported as
    /// `NotFound`, exactly like a missing notification.
    #[instrument(skip(self))]
    pub async fn find_notification_with_data(
        &self,
        tenant_id: &str,
        notification_id: ObjectId,
    ) -> Result<NotificationWithPublish> {
        let pipeline =
            single_notification_pipeline(tenant_id, notification_id, &self.collections.publishes);

        let rows = self
            .executor
            .aggregate(&self.collections.notifications, &pipeline)
            .await?;

        match rows.into_iter().next() {
            Some(row) => decode_joined(row),
            None => Err(StoreError::NotFound(format!(
                "notification {} in tenant {}",
                notification_id.to_hex(),
                tenant_id
            ))),
        }
    }

    /// One page of a user's notifications, newest first, plus the filtered total
    #[instrument(skip(self, filters))]
    pub async fn get_paged_notifications(
        &self,
        tenant_id: &str,
        user_id: &str,
        methods: &[String],
        filters: Option<&[Filter]>,
        page_size: i64,
        page_number: i64,
    ) -> Result<PageResult> {
        let page = PageRequest::new(page_size, page_number)?;
        let criteria = NotificationCriteria::new(
            tenant_id,
            user_id,
            methods.to_vec(),
            FilterSet::from_optional(filters),
        )?;

        let pipelines = ListPipelines::build(&criteria, page, &self.collections.publishes);
        debug!(skip = page.skip(), limit = page.page_size(), "Built list pipelines");

        let collection = self.collections.notifications.as_str();
        let (count_rows, paged_rows) = tokio::try_join!(
            self.executor.aggregate(collection, &pipelines.count),
            self.executor.aggregate(collection, &pipelines.paged),
        )?;

        let result = assemble_page(&count_rows, paged_rows)?;
        debug!(
            total = result.total_count,
            returned = result.items.len(),
            "Assembled notification page"
        );
        Ok(result)
    }

    /// Set or clear `readMarked` on the recipient's own notifications
    ///
    /// All ids are validated before anything is written, and an id may not
    /// appear in both lists. Both lists are applied by one update pipeline, so
    /// a failed call leaves no partial change. Returns the number of
    /// notifications whose state actually changed.
    #[instrument(skip(self, request))]
    pub async fn mark_notifications(
        &self,
        tenant_id: &str,
        user_id: &str,
        request: &MarkRequest,
    ) -> Result<u64> {
        if tenant_id.is_empty() || user_id.is_empty() {
            return Err(StoreError::InvalidArgument(
                "tenantId and userId are required".into(),
            ));
        }

        let mark_read = parse_ids(&request.mark_read_ids)?;
        let unmark_read = parse_ids(&request.unmark_read_ids)?;

        if let Some(id) = mark_read.iter().find(|id| unmark_read.contains(*id)) {
            return Err(StoreError::InvalidArgument(format!(
                "notification {} is both marked and unmarked",
                id.to_hex()
            )));
        }

        let targets: Vec<ObjectId> = mark_read.iter().chain(&unmark_read).copied().collect();
        if targets.is_empty() {
            return Ok(0);
        }

        // readMarked becomes membership in the mark list
        let update = vec![doc! {
            "$set": { "readMarked": { "$in": ["$_id", mark_read] } }
        }];

        let modified = self
            .executor
            .update_many(
                &self.collections.notifications,
                owned_notifications_filter(tenant_id, user_id, &targets),
                update.into(),
            )
            .await?;

        debug!(modified, "Updated read state");
        Ok(modified)
    }
}
