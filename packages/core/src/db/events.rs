//! Domain Events for the category tree
//!
//! `TreeMutator` emits these events on a tokio broadcast channel after each
//! mutation commits. Subscribers (cache invalidation, UI sync, audit trails)
//! observe tree changes without coupling to the storage layer.
//!
//! # Event Flow
//!
//! 1. `TreeMutator` runs the mutation inside one write transaction
//! 2. The transaction commits
//! 3. The event is sent; subscribers receive it asynchronously
//!
//! A rolled-back mutation never produces an event.

use crate::models::{Category, CategoryId};
use serde::{Deserialize, Serialize};

/// Events emitted by `TreeMutator`
///
/// Every variant carries `source_client_id`, the client the mutation was
/// performed for (see `TreeMutator::with_client`), so a client can ignore
/// echoes of its own changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CategoryEvent {
    /// A category was created
    #[serde(rename_all = "camelCase")]
    Created {
        category: Category,
        source_client_id: Option<String>,
    },

    /// Name, description or flags of a category changed
    #[serde(rename_all = "camelCase")]
    Updated {
        category: Category,
        source_client_id: Option<String>,
    },

    /// A subtree moved; `affected_ids` lists the moved category and all its descendants
    #[serde(rename_all = "camelCase")]
    Moved {
        category: Category,
        old_parent_id: Option<CategoryId>,
        affected_ids: Vec<CategoryId>,
        source_client_id: Option<String>,
    },

    /// Categories were deleted, deepest first
    #[serde(rename_all = "camelCase")]
    Deleted {
        ids: Vec<CategoryId>,
        parent_id: Option<CategoryId>,
        source_client_id: Option<String>,
    },

    /// Children of `parent_id` received a new order
    #[serde(rename_all = "camelCase")]
    Reordered {
        parent_id: Option<CategoryId>,
        ordered_ids: Vec<CategoryId>,
        source_client_id: Option<String>,
    },

    /// The whole closure table was regenerated
    #[serde(rename_all = "camelCase")]
    IndexRebuilt {
        category_count: usize,
        source_client_id: Option<String>,
    },
}

impl CategoryEvent {
    /// String representation of the event type, for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            CategoryEvent::Created { .. } => "category:created",
            CategoryEvent::Updated { .. } => "category:updated",
            CategoryEvent::Moved { .. } => "category:moved",
            CategoryEvent::Deleted { .. } => "category:deleted",
            CategoryEvent::Reordered { .. } => "category:reordered",
            CategoryEvent::IndexRebuilt { .. } => "category:index-rebuilt",
        }
    }

    pub fn source_client_id(&self) -> Option<&str> {
        match self {
            CategoryEvent::Created {
                source_client_id, ..
            }
            | CategoryEvent::Updated {
                source_client_id, ..
            }
            | CategoryEvent::Moved {
                source_client_id, ..
            }
            | CategoryEvent::Deleted {
                source_client_id, ..
            }
            | CategoryEvent::Reordered {
                source_client_id, ..
            }
            | CategoryEvent::IndexRebuilt {
                source_client_id, ..
            } => source_client_id.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Contract test: the JSON shape is internally tagged with camelCase fields
    #[test]
    fn test_event_serialization_contract() {
        let event = CategoryEvent::Reordered {
            parent_id: Some(1),
            ordered_ids: vec![3, 2],
            source_client_id: Some("admin-ui".to_string()),
        };

        let parsed = serde_json::to_value(&event).unwrap();

        assert_eq!(parsed.get("type").unwrap(), "reordered");
        assert_eq!(parsed.get("parentId").unwrap(), 1);
        assert_eq!(parsed.get("orderedIds").unwrap(), &serde_json::json!([3, 2]));
        assert_eq!(parsed.get("sourceClientId").unwrap(), "admin-ui");
    }

    #[test]
    fn test_source_client_id_accessor() {
        let event = CategoryEvent::Deleted {
            ids: vec![4],
            parent_id: None,
            source_client_id: None,
        };
        assert_eq!(event.source_client_id(), None);
        assert_eq!(event.event_type(), "category:deleted");

        let event = CategoryEvent::IndexRebuilt {
            category_count: 3,
            source_client_id: Some("audit".into()),
        };
        assert_eq!(event.source_client_id(), Some("audit"));
    }
}
