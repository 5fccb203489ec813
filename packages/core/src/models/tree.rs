//! Nested tree materialization
//!
//! Trees are assembled per request from a flat list of categories: nodes are
//! grouped by `parent_id` into an id-keyed map, then each group is attached to
//! its parent. No node holds a reference to its parent, and no per-node
//! queries are issued.

use super::category::{Category, CategoryId};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A category together with its ordered children
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTreeNode {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryTreeNode>,
}

impl CategoryTreeNode {
    /// Number of categories in this subtree, including self
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(CategoryTreeNode::size).sum::<usize>()
    }

    /// Height of this subtree in levels (a leaf has height 1)
    pub fn height(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(CategoryTreeNode::height)
            .max()
            .unwrap_or(0)
    }

    pub fn find(&self, id: CategoryId) -> Option<&CategoryTreeNode> {
        if self.category.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

/// Build a forest from a flat list of categories
///
/// Categories whose parent is absent from the list become roots of the
/// result, so any ancestor-or-self slice of the table materializes into a
/// single tree. Siblings are ordered by `(sort_order, id)`.
///
/// Nodes that are only reachable through a parent cycle are never attached;
/// the grouping map is drained as it is walked, so each node is visited at
/// most once.
pub fn build_forest(categories: Vec<Category>) -> Vec<CategoryTreeNode> {
    let present: HashSet<CategoryId> = categories.iter().map(|c| c.id).collect();

    let mut children_by_parent: HashMap<CategoryId, Vec<Category>> = HashMap::new();
    let mut roots = Vec::new();

    for category in categories {
        match category.parent_id {
            Some(parent_id) if present.contains(&parent_id) => {
                children_by_parent.entry(parent_id).or_default().push(category);
            }
            _ => roots.push(category),
        }
    }

    for group in children_by_parent.values_mut() {
        sort_siblings(group);
    }
    sort_siblings(&mut roots);

    roots
        .into_iter()
        .map(|root| attach_children(root, &mut children_by_parent))
        .collect()
}

fn attach_children(
    category: Category,
    children_by_parent: &mut HashMap<CategoryId, Vec<Category>>,
) -> CategoryTreeNode {
    let children = children_by_parent
        .remove(&category.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach_children(child, children_by_parent))
        .collect();

    CategoryTreeNode { category, children }
}

fn sort_siblings(group: &mut [Category]) {
    group.sort_by_key(|c| (c.sort_order, c.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CategoryType;
    use chrono::Utc;

    fn category(id: CategoryId, parent_id: Option<CategoryId>, sort_order: i64) -> Category {
        Category {
            id,
            name: format!("Category {}", id),
            code: format!("C{}", id),
            category_type: CategoryType::Topic,
            level: 1,
            parent_id,
            sort_order,
            tree_path: "/".to_string(),
            description: None,
            is_active: true,
            allow_questions: true,
            version: 1,
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn test_build_forest_nests_and_orders_children() {
        let forest = build_forest(vec![
            category(3, Some(1), 1),
            category(1, None, 0),
            category(2, Some(1), 0),
            category(4, Some(2), 0),
            category(5, None, 1),
        ]);

        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].category.id, 1);
        assert_eq!(forest[1].category.id, 5);

        let children: Vec<_> = forest[0].children.iter().map(|c| c.category.id).collect();
        assert_eq!(children, vec![2, 3]);
        assert_eq!(forest[0].children[0].children[0].category.id, 4);
        assert_eq!(forest[0].size(), 4);
        assert_eq!(forest[0].height(), 3);
    }

    #[test]
    fn test_build_forest_treats_missing_parent_as_root() {
        // Slice of a larger tree: 10 hangs under 9, which is not in the list
        let forest = build_forest(vec![category(10, Some(9), 0), category(11, Some(10), 0)]);

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].category.id, 10);
        assert!(forest[0].find(11).is_some());
        assert!(forest[0].find(9).is_none());
    }

    #[test]
    fn test_build_forest_drops_parent_cycles() {
        let forest = build_forest(vec![
            category(1, None, 0),
            category(2, Some(3), 0),
            category(3, Some(2), 0),
        ]);

        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].size(), 1);
    }

    #[test]
    fn test_tree_node_serializes_flat_category_fields() {
        let forest = build_forest(vec![category(1, None, 0), category(2, Some(1), 0)]);
        let json = serde_json::to_value(&forest[0]).unwrap();

        assert_eq!(json["id"], 1);
        assert_eq!(json["type"], "TOPIC");
        assert_eq!(json["children"][0]["parentId"], 1);
    }
}
