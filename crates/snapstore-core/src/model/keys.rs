use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a snapshot, unique within its store
///
/// Ids arrive either as strings or as numbers from the identity collaborator;
/// both forms are kept distinct (`"1"` and `1` are different ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SnapshotId {
    Number(u64),
    Text(String),
}

impl SnapshotId {
    /// Text form of the id, if it is a string id
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SnapshotId::Text(s) => Some(s),
            SnapshotId::Number(_) => None,
        }
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotId::Number(n) => write!(f, "{}", n),
            SnapshotId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for SnapshotId {
    fn from(s: &str) -> Self {
        SnapshotId::Text(s.to_string())
    }
}

impl From<String> for SnapshotId {
    fn from(s: String) -> Self {
        SnapshotId::Text(s)
    }
}

impl From<u64> for SnapshotId {
    fn from(n: u64) -> Self {
        SnapshotId::Number(n)
    }
}

impl From<&SnapshotId> for SnapshotId {
    fn from(id: &SnapshotId) -> Self {
        id.clone()
    }
}

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&$name> for $name {
            fn from(v: &$name) -> Self {
                v.clone()
            }
        }
    };
}

string_key!(
    /// Identifier of one store inside a container (`tasks`, `teams`, ...)
    StoreId
);

string_key!(
    /// Category used for filtering and routing (`task`, `calendar_event`, ...)
    Category
);

/// Store-qualified address of a snapshot
///
/// Hierarchy links are kept as these keys rather than object references, so
/// a parent never holds its children and cycles can only be found by walking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub store_id: StoreId,
    pub id: SnapshotId,
}

impl SnapshotRef {
    pub fn new(store_id: impl Into<StoreId>, id: impl Into<SnapshotId>) -> Self {
        Self {
            store_id: store_id.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.store_id, self.id)
    }
}

/// Handle returned by the subscription registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_id_text_and_number_are_distinct() {
        assert_ne!(SnapshotId::from("1"), SnapshotId::from(1u64));
        assert_eq!(SnapshotId::from("1").to_string(), "1");
        assert_eq!(SnapshotId::from(1u64).to_string(), "1");
    }

    #[test]
    fn test_snapshot_id_untagged_serde() {
        let text: SnapshotId = serde_json::from_str("\"t1\"").unwrap();
        let number: SnapshotId = serde_json::from_str("42").unwrap();
        assert_eq!(text, SnapshotId::from("t1"));
        assert_eq!(number, SnapshotId::from(42u64));
    }

    #[test]
    fn test_snapshot_ref_display() {
        let r = SnapshotRef::new("tasks", "t1");
        assert_eq!(r.to_string(), "tasks/t1");
    }
}
