//! Publish document schema
//!
//! Shared payload fanned out to one or more notifications.

use bson::{oid::ObjectId, Bson};
use serde::{Deserialize, Serialize};

/// Collection name for publishes
pub const PUBLISH_COLLECTION: &str = "opennoty.publishes";

/// Publish document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bson>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_data: Option<Bson>,
}

impl PublishDoc {
    pub fn new(data: Option<Bson>, secure_data: Option<Bson>) -> Self {
        Self {
            id: ObjectId::new(),
            data,
            secure_data,
        }
    }
}
