//! Configuration for the notification store CLI
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, Subcommand, ValueEnum};

use crate::db::schemas::{NOTIFICATION_COLLECTION, PUBLISH_COLLECTION};
use crate::query::Filter;
use crate::repository::CollectionNames;
use crate::types::StoreError;

/// Notification store - tenant-scoped notification read-model
#[derive(Parser, Debug, Clone)]
#[command(name = "notification-store")]
#[command(about = "Query and mark notifications stored in MongoDB")]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "opennoty")]
    pub mongodb_db: String,

    /// Collection holding notification records
    #[arg(long, env = "NOTIFICATION_COLLECTION", default_value = NOTIFICATION_COLLECTION)]
    pub notification_collection: String,

    /// Collection holding publish payloads
    #[arg(long, env = "PUBLISH_COLLECTION", default_value = PUBLISH_COLLECTION)]
    pub publish_collection: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Use an empty in-memory store instead of MongoDB
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch one notification with its publish payload
    Get {
        #[arg(long)]
        tenant: String,

        /// Notification id (24 hex chars)
        #[arg(long)]
        id: String,
    },

    /// List one page of a user's notifications
    List {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        user: String,

        /// Delivery method; repeat for several
        #[arg(long = "method", required = true)]
        methods: Vec<String>,

        /// READ_MARKED, READ_UNMARKED or UNSENT; repeat for several
        #[arg(long = "filter")]
        filters: Vec<Filter>,

        #[arg(long, default_value = "20", allow_negative_numbers = true)]
        page_size: i64,

        #[arg(long, default_value = "1", allow_negative_numbers = true)]
        page: i64,
    },

    /// Mark or unmark notifications as read
    Mark {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        user: String,

        #[arg(long = "read")]
        read_ids: Vec<String>,

        #[arg(long = "unread")]
        unread_ids: Vec<String>,
    },

    /// Create the indexes the list query relies on
    EnsureIndexes,
}

impl Args {
    pub fn collections(&self) -> CollectionNames {
        CollectionNames {
            notifications: self.notification_collection.clone(),
            publishes: self.publish_collection.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::types::Result<()> {
        if self.notification_collection.trim().is_empty() {
            return Err(StoreError::Config("NOTIFICATION_COLLECTION must not be empty".to_string()));
        }

        if self.publish_collection.trim().is_empty() {
            return Err(StoreError::Config("PUBLISH_COLLECTION must not be empty".to_string()));
        }

        if self.mongodb_db.trim().is_empty() {
            return Err(StoreError::Config("MONGODB_DB must not be empty".to_string()));
        }

        Ok(())
    }
}
