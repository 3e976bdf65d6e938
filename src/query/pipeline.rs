//! Aggregation pipelines
//!
//! A [`Pipeline`] is an immutable, ordered list of [`Stage`] descriptors.
//! Deriving a pipeline copies the stages it extends, so the count and page
//! variants built from one base never share mutable state.

use bson::{doc, oid::ObjectId, Document};

use super::criteria::{single_notification_filter, NotificationCriteria};
use crate::types::{Result, StoreError};

/// Field the joined publish document lands in
pub const PUBLISH_FIELD: &str = "publish";

/// Field holding the total in the count pipeline's only document
pub const COUNT_FIELD: &str = "count";

/// Sort direction for a `$sort` stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// One aggregation stage
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Sort {
        field: String,
        direction: SortDirection,
    },
    Skip(u64),
    Limit(u64),
    /// Left outer join against another collection
    Lookup {
        from: String,
        local_field: String,
        foreign_field: String,
        as_field: String,
    },
    /// Flatten an array field into one row per element; empty arrays drop the row
    Unwind(String),
    /// Replace the stream with a single `{ <field>: n }` document (none if n is 0)
    Count(String),
}

impl Stage {
    /// Render as a MongoDB aggregation stage document
    pub fn to_document(&self) -> Document {
        match self {
            Self::Match(filter) => doc! { "$match": filter.clone() },
            Self::Sort { field, direction } => doc! {
                "$sort": { field.as_str(): direction.as_i32() }
            },
            Self::Skip(n) => doc! { "$skip": clamp_i64(*n) },
            Self::Limit(n) => doc! { "$limit": clamp_i64(*n) },
            Self::Lookup {
                from,
                local_field,
                foreign_field,
                as_field,
            } => doc! {
                "$lookup": {
                    "from": from.as_str(),
                    "localField": local_field.as_str(),
                    "foreignField": foreign_field.as_str(),
                    "as": as_field.as_str(),
                }
            },
            Self::Unwind(field) => doc! { "$unwind": format!("${}", field) },
            Self::Count(field) => doc! { "$count": field.as_str() },
        }
    }
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Immutable sequence of stages
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Derive a new pipeline with `extra` appended; `self` is left untouched
    pub fn then(&self, extra: impl IntoIterator<Item = Stage>) -> Self {
        let mut stages = self.stages.clone();
        stages.extend(extra);
        Self { stages }
    }

    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}

/// Validated 1-indexed page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page_size: u64,
    page_number: u64,
    skip: u64,
}

impl PageRequest {
    /// Rejects non-positive sizes and numbers, and windows whose offset overflows
    pub fn new(page_size: i64, page_number: i64) -> Result<Self> {
        if page_size <= 0 {
            return Err(StoreError::InvalidArgument(format!(
                "pageSize must be at least 1, got {}",
                page_size
            )));
        }
        if page_number <= 0 {
            return Err(StoreError::InvalidArgument(format!(
                "pageNumber must be at least 1, got {}",
                page_number
            )));
        }

        let overflow = || {
            StoreError::InvalidArgument(format!(
                "page window overflows: pageSize={} pageNumber={}",
                page_size, page_number
            ))
        };
        page_number.checked_mul(page_size).ok_or_else(overflow)?;
        let skip = (page_number - 1).checked_mul(page_size).ok_or_else(overflow)?;

        Ok(Self {
            page_size: page_size as u64,
            page_number: page_number as u64,
            skip: skip as u64,
        })
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn skip(&self) -> u64 {
        self.skip
    }
}

/// Join stages pulling the referenced publish into `publish`
///
/// `$unwind` drops rows whose `publishId` matches nothing.
pub fn publish_join(publish_collection: &str) -> [Stage; 2] {
    [
        Stage::Lookup {
            from: publish_collection.to_string(),
            local_field: "publishId".to_string(),
            foreign_field: "_id".to_string(),
            as_field: PUBLISH_FIELD.to_string(),
        },
        Stage::Unwind(PUBLISH_FIELD.to_string()),
    ]
}

/// Pipelines for one list request
#[derive(Debug, Clone)]
pub struct ListPipelines {
    /// Match and newest-first sort shared by both variants
    pub base: Pipeline,
    pub paged: Pipeline,
    pub count: Pipeline,
}

impl ListPipelines {
    pub fn build(
        criteria: &NotificationCriteria,
        page: PageRequest,
        publish_collection: &str,
    ) -> Self {
        // _id order stands in for creation order
        let base = Pipeline::new(vec![
            Stage::Match(criteria.to_filter()),
            Stage::Sort {
                field: "_id".to_string(),
                direction: SortDirection::Descending,
            },
        ]);

        let paged = base
            .then([Stage::Skip(page.skip()), Stage::Limit(page.page_size())])
            .then(publish_join(publish_collection));

        let count = base.then([Stage::Count(COUNT_FIELD.to_string())]);

        Self { base, paged, count }
    }
}

/// Pipeline fetching one notification with its publish
pub fn single_notification_pipeline(
    tenant_id: &str,
    notification_id: ObjectId,
    publish_collection: &str,
) -> Pipeline {
    Pipeline::new(vec![Stage::Match(single_notification_filter(tenant_id, notification_id))])
        .then(publish_join(publish_collection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filter::{Filter, FilterSet};

    fn criteria() -> NotificationCriteria {
        NotificationCriteria::new(
            "T1",
            "U1",
            vec!["EMAIL".to_string()],
            FilterSet::new(&[Filter::Unsent]),
        )
        .unwrap()
    }

    #[test]
    fn test_page_request_validation() {
        assert!(PageRequest::new(0, 1).is_err());
        assert!(PageRequest::new(10, 0).is_err());
        assert!(PageRequest::new(-5, 1).is_err());
        assert!(PageRequest::new(10, -1).is_err());
        assert!(PageRequest::new(i64::MAX, 2).is_err());

        let page = PageRequest::new(20, 3).unwrap();
        assert_eq!(page.skip(), 40);
        assert_eq!(page.page_size(), 20);
    }

    #[test]
    fn test_first_page_skips_nothing() {
        assert_eq!(PageRequest::new(25, 1).unwrap().skip(), 0);
    }

    #[test]
    fn test_list_pipelines_share_base() {
        let page = PageRequest::new(2, 2).unwrap();
        let pipelines = ListPipelines::build(&criteria(), page, "publishes");

        assert_eq!(pipelines.base.stages().len(), 2);
        assert_eq!(&pipelines.paged.stages()[..2], pipelines.base.stages());
        assert_eq!(&pipelines.count.stages()[..2], pipelines.base.stages());

        assert_eq!(
            &pipelines.paged.stages()[2..],
            &[
                Stage::Skip(2),
                Stage::Limit(2),
                Stage::Lookup {
                    from: "publishes".into(),
                    local_field: "publishId".into(),
                    foreign_field: "_id".into(),
                    as_field: "publish".into(),
                },
                Stage::Unwind("publish".into()),
            ]
        );
        assert_eq!(pipelines.count.stages()[2], Stage::Count("count".into()));
    }

    #[test]
    fn test_deriving_leaves_base_untouched() {
        let base = Pipeline::new(vec![Stage::Skip(1)]);
        let derived = base.then([Stage::Limit(5)]);
        assert_eq!(base.stages().len(), 1);
        assert_eq!(derived.stages().len(), 2);
    }

    #[test]
    fn test_stage_documents() {
        let docs = ListPipelines::build(&criteria(), PageRequest::new(10, 1).unwrap(), "p")
            .paged
            .to_documents();

        assert!(docs[0].get_document("$match").unwrap().contains_key("$and"));
        assert_eq!(docs[1].get_document("$sort").unwrap().get_i32("_id").unwrap(), -1);
        assert_eq!(docs[2].get_i64("$skip").unwrap(), 0);
        assert_eq!(docs[3].get_i64("$limit").unwrap(), 10);
        assert_eq!(
            docs[4].get_document("$lookup").unwrap().get_str("localField").unwrap(),
            "publishId"
        );
        assert_eq!(docs[5].get_str("$unwind").unwrap(), "$publish");
    }

    #[test]
    fn test_single_notification_pipeline() {
        let id = ObjectId::new();
        let pipeline = single_notification_pipeline("T1", id, "publishes");
        assert_eq!(pipeline.stages().len(), 3);
        assert!(matches!(pipeline.stages()[2], Stage::Unwind(_)));
    }
}
