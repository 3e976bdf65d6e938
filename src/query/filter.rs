//! Client-supplied notification filters
//!
//! Flags are independent and may arrive duplicated or in any order. The
//! read-state pair is not an OR: asking for both marked and unmarked is an
//! over-specification and applies no read-state predicate at all.

use std::fmt;
use std::str::FromStr;

use bson::{doc, Document};
use serde::{Deserialize, Serialize};

use crate::types::StoreError;

/// A single filter flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Filter {
    ReadMarked,
    ReadUnmarked,
    Unsent,
}

impl Filter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadMarked => "READ_MARKED",
            Self::ReadUnmarked => "READ_UNMARKED",
            Self::Unsent => "UNSENT",
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filter {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "READ_MARKED" => Ok(Self::ReadMarked),
            "READ_UNMARKED" => Ok(Self::ReadUnmarked),
            "UNSENT" => Ok(Self::Unsent),
            other => Err(StoreError::InvalidArgument(format!(
                "Unknown filter '{}'",
                other
            ))),
        }
    }
}

/// Membership view over a list of filter flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterSet {
    read_marked: bool,
    read_unmarked: bool,
    unsent: bool,
}

impl FilterSet {
    pub fn new(filters: &[Filter]) -> Self {
        Self {
            read_marked: filters.contains(&Filter::ReadMarked),
            read_unmarked: filters.contains(&Filter::ReadUnmarked),
            unsent: filters.contains(&Filter::Unsent),
        }
    }

    /// Build from an optional client list; `None` means no filtering
    pub fn from_optional(filters: Option<&[Filter]>) -> Self {
        filters.map(Self::new).unwrap_or_default()
    }

    pub fn contains(&self, filter: Filter) -> bool {
        match filter {
            Filter::ReadMarked => self.read_marked,
            Filter::ReadUnmarked => self.read_unmarked,
            Filter::Unsent => self.unsent,
        }
    }

    /// Required value of `readMarked`, if exactly one read-state flag is set
    pub fn read_state(&self) -> Option<bool> {
        if self.read_marked != self.read_unmarked {
            Some(self.read_marked)
        } else {
            None
        }
    }

    /// Translate into predicate fragments for the notification collection
    pub fn to_fragments(&self) -> Document {
        let mut fragments = doc! {};

        if let Some(read_marked) = self.read_state() {
            fragments.insert("readMarked", read_marked);
        }

        if self.unsent {
            fragments.insert("sent", false);
        }

        fragments
    }

    pub fn is_empty(&self) -> bool {
        self.to_fragments().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filters_no_fragments() {
        assert!(FilterSet::from_optional(None).to_fragments().is_empty());
        assert!(FilterSet::new(&[]).to_fragments().is_empty());
    }

    #[test]
    fn test_single_read_state() {
        let marked = FilterSet::new(&[Filter::ReadMarked]).to_fragments();
        assert_eq!(marked, doc! { "readMarked": true });

        let unmarked = FilterSet::new(&[Filter::ReadUnmarked]).to_fragments();
        assert_eq!(unmarked, doc! { "readMarked": false });
    }

    #[test]
    fn test_contradictory_read_states_cancel() {
        let set = FilterSet::new(&[Filter::ReadUnmarked, Filter::ReadMarked, Filter::ReadMarked]);
        assert!(set.contains(Filter::ReadMarked));
        assert!(!set.contains(Filter::Unsent));
        assert_eq!(set.read_state(), None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_unsent_independent_of_read_state() {
        let set = FilterSet::new(&[Filter::ReadMarked, Filter::Unsent, Filter::ReadUnmarked]);
        assert_eq!(set.to_fragments(), doc! { "sent": false });

        let set = FilterSet::new(&[Filter::Unsent, Filter::ReadUnmarked]);
        assert_eq!(
            set.to_fragments(),
            doc! { "readMarked": false, "sent": false }
        );
    }

    #[test]
    fn test_parse_filter_names() {
        assert_eq!("READ_MARKED".parse::<Filter>().unwrap(), Filter::ReadMarked);
        assert_eq!("read-unmarked".parse::<Filter>().unwrap(), Filter::ReadUnmarked);
        assert_eq!(" unsent ".parse::<Filter>().unwrap(), Filter::Unsent);
        assert!("DELETED".parse::<Filter>().is_err());
    }

    #[test]
    fn test_serde_wire_names() {
        let json = serde_json::to_string(&Filter::ReadUnmarked).unwrap();
        assert_eq!(json, "\"READ_UNMARKED\"");
        let parsed: Filter = serde_json::from_str("\"UNSENT\"").unwrap();
        assert_eq!(parsed, Filter::Unsent);
    }
}
