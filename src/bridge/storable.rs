//! # Storable Records
//!
//! Contract for domain records persisted through the bridge.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A domain record that can be persisted under a store-assigned id
///
/// Records are immutable once constructed: when the store assigns a
/// fresh identifier at insert, `with_id` produces a new instance
/// carrying it. An id assigned by the store is never rewritten for the
/// record's lifetime at that location.
pub trait Storable: Serialize + DeserializeOwned + Send + 'static {
    /// The record's identifier; empty before first persistence
    fn id(&self) -> &str;

    /// A copy of this record rebound to `id`
    fn with_id(self, id: &str) -> Self;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(default)]
        id: String,
        content: String,
    }

    impl Storable for Note {
        fn id(&self) -> &str {
            &self.id
        }

        fn with_id(self, id: &str) -> Self {
            Self {
                id: id.to_string(),
                ..self
            }
        }
    }

    #[test]
    fn test_with_id_rebinds() {
        let note = Note {
            id: String::new(),
            content: "hello".to_string(),
        };

        let bound = note.with_id("abc");
        assert_eq!(bound.id(), "abc");
        assert_eq!(bound.content, "hello");
    }
}
