//! Notification document schema
//!
//! One record per recipient and delivery method. The payload itself lives
//! in the referenced publish document.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::PublishDoc;

/// Collection name for notifications
pub const NOTIFICATION_COLLECTION: &str = "opennoty.notifications";

/// Who a notification is addressed to, and over which channel
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: String,

    /// Delivery method (e.g. "EMAIL", "PUSH")
    pub method: String,
}

/// Notification document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDoc {
    /// MongoDB document ID; ordering doubles as creation order
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub tenant_id: String,

    pub recipient: Recipient,

    #[serde(default)]
    pub read_marked: bool,

    #[serde(default)]
    pub sent: bool,

    /// Foreign key into the publish collection
    pub publish_id: ObjectId,
}

impl NotificationDoc {
    /// Create a new unread, unsent notification
    pub fn new(
        tenant_id: impl Into<String>,
        recipient: Recipient,
        publish_id: ObjectId,
    ) -> Self {
        Self {
            id: ObjectId::new(),
            tenant_id: tenant_id.into(),
            recipient,
            read_marked: false,
            sent: false,
            publish_id,
        }
    }
}

impl IntoIndexes for NotificationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Serves the paged list query: equality prefix, then _id for the sort
            (
                doc! {
                    "tenantId": 1,
                    "recipient.userId": 1,
                    "recipient.method": 1,
                    "_id": -1,
                },
                Some(
                    IndexOptions::builder()
                        .name("tenant_recipient_id".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "publishId": 1 },
                Some(
                    IndexOptions::builder()
                        .name("publish_id_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

/// Notification joined with its publish document by the `$lookup`/`$unwind` stages
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationWithPublish {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub tenant_id: String,

    pub recipient: Recipient,

    #[serde(default)]
    pub read_marked: bool,

    #[serde(default)]
    pub sent: bool,

    pub publish_id: ObjectId,

    pub publish: PublishDoc,
}
