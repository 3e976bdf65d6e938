//! Query construction for the notification read-model
//!
//! Filter flags become predicate fragments, fragments and scoping become one
//! match criteria, and the criteria seeds the shared base pipeline from which
//! the page and count pipelines are derived.

pub mod criteria;
pub mod filter;
pub mod pipeline;

pub use criteria::NotificationCriteria;
pub use filter::{Filter, FilterSet};
pub use pipeline::{
    single_notification_pipeline, ListPipelines, PageRequest, Pipeline, SortDirection, Stage,
};
