//! Database schemas
//!
//! Defines MongoDB document structures for notifications and publishes.

mod notification;
mod publish;

pub use notification::{
    NotificationDoc, NotificationWithPublish, Recipient, NOTIFICATION_COLLECTION,
};
pub use publish::{PublishDoc, PUBLISH_COLLECTION};
