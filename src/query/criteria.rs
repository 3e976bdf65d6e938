//! Match criteria for the notification collection

use bson::{doc, oid::ObjectId, Document};

use super::filter::FilterSet;
use crate::types::{Result, StoreError};

/// Criteria for listing one user's notifications
#[derive(Debug, Clone)]
pub struct NotificationCriteria {
    tenant_id: String,
    user_id: String,
    methods: Vec<String>,
    filters: FilterSet,
}

impl NotificationCriteria {
    /// Validate and capture the scoping parameters
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        methods: Vec<String>,
        filters: FilterSet,
    ) -> Result<Self> {
        let tenant_id = tenant_id.into();
        let user_id = user_id.into();

        if tenant_id.is_empty() {
            return Err(StoreError::InvalidArgument("tenantId must not be empty".into()));
        }
        if user_id.is_empty() {
            return Err(StoreError::InvalidArgument("userId must not be empty".into()));
        }
        if methods.is_empty() {
            return Err(StoreError::InvalidArgument(
                "at least one delivery method is required".into(),
            ));
        }

        Ok(Self {
            tenant_id,
            user_id,
            methods,
            filters,
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Convert to a MongoDB filter document
    ///
    /// Scoping clauses go under `$and`; filter fragments sit beside it so the
    /// conjunction stays flat.
    pub fn to_filter(&self) -> Document {
        let mut filter = doc! {
            "$and": [
                { "tenantId": self.tenant_id.as_str() },
                { "recipient.userId": self.user_id.as_str() },
                { "recipient.method": { "$in": self.methods.clone() } },
            ]
        };

        for (key, value) in self.filters.to_fragments() {
            filter.insert(key, value);
        }

        filter
    }
}

/// Criteria for fetching a single notification within a tenant
pub fn single_notification_filter(tenant_id: &str, notification_id: ObjectId) -> Document {
    doc! {
        "$and": [
            { "tenantId": tenant_id },
            { "_id": notification_id },
        ]
    }
}

/// Criteria for read-state updates, scoped to the owning recipient
pub fn owned_notifications_filter(tenant_id: &str, user_id: &str, ids: &[ObjectId]) -> Document {
    doc! {
        "tenantId": tenant_id,
        "recipient.userId": user_id,
        "_id": { "$in": ids.to_vec() },
    }
}
