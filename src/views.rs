//! Caller-facing views and the page assembler
//!
//! Raw pipeline output is decoded into schema types here and mapped to the
//! shapes the API layer serializes.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::db::schemas::NotificationWithPublish;
use crate::query::pipeline::COUNT_FIELD;
use crate::types::{Result, StoreError};

/// One notification as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    /// Hex form of the notification's ObjectId
    pub id: String,

    pub read_marked: bool,

    pub data: Option<JsonValue>,

    pub secure_data: Option<JsonValue>,

    /// Filled in downstream; always `None` from this layer
    pub consumable_data: Option<JsonValue>,
}

impl From<&NotificationWithPublish> for NotificationView {
    fn from(item: &NotificationWithPublish) -> Self {
        Self {
            id: item.id.to_hex(),
            read_marked: item.read_marked,
            data: item.publish.data.clone().map(to_json),
            secure_data: item.publish.secure_data.clone().map(to_json),
            consumable_data: None,
        }
    }
}

/// Count plus one page of notifications
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub total_count: u64,
    pub items: Vec<NotificationView>,
}

fn to_json(value: Bson) -> JsonValue {
    value.into_relaxed_extjson()
}

/// Decode one joined row
pub fn decode_joined(document: Document) -> Result<NotificationWithPublish> {
    Ok(bson::from_document(document)?)
}

/// Read the total from the count pipeline; no document means an empty set
pub fn read_total_count(rows: &[Document]) -> Result<u64> {
    let Some(row) = rows.first() else {
        return Ok(0);
    };

    let count = match row.get(COUNT_FIELD) {
        Some(Bson::Int32(n)) => i64::from(*n),
        Some(Bson::Int64(n)) => *n,
        Some(Bson::Double(n)) if n.fract() == 0.0 => *n as i64,
        other => {
            return Err(StoreError::Decode(format!(
                "Count result has no integer '{}' field: {:?}",
                COUNT_FIELD, other
            )))
        }
    };

    u64::try_from(count)
        .map_err(|_| StoreError::Decode(format!("Negative count {}", count)))
}

/// Merge count and page output into the caller's result
pub fn assemble_page(count_rows: &[Document], paged_rows: Vec<Document>) -> Result<PageResult> {
    let total_count = read_total_count(count_rows)?;
    let items = paged_rows
        .into_iter()
        .map(|row| decode_joined(row).map(|item| NotificationView::from(&item)))
        .collect::<Result<Vec<_>>>()?;

    Ok(PageResult { total_count, items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};

    fn joined_row(id: ObjectId) -> Document {
        let publish_id = ObjectId::new();
        doc! {
            "_id": id,
            "tenantId": "T1",
            "recipient": { "userId": "U1", "method": "EMAIL" },
            "readMarked": true,
            "publishId": publish_id,
            "publish": {
                "_id": publish_id,
                "data": { "title": "Hello", "count": 3 },
                "secureData": "token",
            },
        }
    }

    #[test]
    fn test_missing_count_is_zero() {
        assert_eq!(read_total_count(&[]).unwrap(), 0);
    }

    #[test]
    fn test_count_accepts_int_widths() {
        assert_eq!(read_total_count(&[doc! { "count": 7 }]).unwrap(), 7);
        assert_eq!(read_total_count(&[doc! { "count": 7_i64 }]).unwrap(), 7);
        assert!(read_total_count(&[doc! { "count": "seven" }]).is_err());
        assert!(read_total_count(&[doc! { "count": -1 }]).is_err());
    }

    #[test]
    fn test_view_mapping() {
        let id = ObjectId::new();
        let page = assemble_page(&[doc! { "count": 1 }], vec![joined_row(id)]).unwrap();

        assert_eq!(page.total_count, 1);
        let item = &page.items[0];
        assert_eq!(item.id, id.to_hex());
        assert_eq!(item.id.len(), 24);
        assert!(item.read_marked);
        assert_eq!(
            item.data,
            Some(serde_json::json!({ "title": "Hello", "count": 3 }))
        );
        assert_eq!(item.secure_data, Some(serde_json::json!("token")));
        assert_eq!(item.consumable_data, None);
    }

    #[test]
    fn test_row_without_publish_is_decode_error() {
        let mut row = joined_row(ObjectId::new());
        row.remove("publish");
        assert!(matches!(
            assemble_page(&[], vec![row]),
            Err(StoreError::Decode(_))
        ));
    }

    #[test]
    fn test_wire_shape() {
        let page = PageResult {
            total_count: 0,
            items: vec![],
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json, serde_json::json!({ "totalCount": 0, "items": [] }));
    }
}
