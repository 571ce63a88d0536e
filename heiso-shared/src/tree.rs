//! Parent/child trees over flat rows
//!
//! Menus, navigation items and categories are stored flat with a nullable
//! `parent_id`. These helpers rebuild the hierarchy for responses and check
//! reorder requests before they are persisted.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// A row that takes part in a parent/child hierarchy
pub trait TreeNode {
    fn id(&self) -> &str;
    fn parent_id(&self) -> Option<&str>;

    /// Grouping label, used by dashboard menus
    fn group(&self) -> Option<&str> {
        None
    }

    /// Sort position among siblings
    fn order(&self) -> Option<i32> {
        None
    }
}

/// A node with its children attached
#[derive(Debug, Clone, Serialize)]
pub struct TreeItem<T> {
    #[serde(flatten)]
    pub item: T,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeItem<T>>,
}

/// Errors raised while validating a reorder request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Unknown parent: {0}")]
    UnknownParent(String),

    #[error("Item {0} cannot be its own ancestor")]
    Cycle(String),
}

/// New position for one item of a drag-and-drop reorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderItem {
    pub id: String,
    pub parent_id: Option<String>,
    pub order: i32,
}

/// Builds the forest rooted at items without a parent, keeping input order
/// among siblings.
pub fn build_tree<T: TreeNode + Clone>(items: &[T]) -> Vec<TreeItem<T>> {
    let mut by_parent: HashMap<Option<&str>, Vec<&T>> = HashMap::new();
    for item in items {
        by_parent.entry(item.parent_id()).or_default().push(item);
    }
    attach(&by_parent, None, &mut HashSet::new())
}

fn attach<'a, T: TreeNode + Clone>(
    by_parent: &HashMap<Option<&'a str>, Vec<&'a T>>,
    parent: Option<&'a str>,
    seen: &mut HashSet<&'a str>,
) -> Vec<TreeItem<T>> {
    let Some(children) = by_parent.get(&parent) else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(children.len());
    for &child in children {
        if !seen.insert(child.id()) {
            continue;
        }
        out.push(TreeItem {
            item: child.clone(),
            children: attach(by_parent, Some(child.id()), seen),
        });
    }
    out
}

/// Collects nodes by group name, walking the tree depth first. Groups appear
/// in the order they are first met.
pub fn group_by_items<T: TreeNode + Clone>(tree: &[TreeItem<T>]) -> Vec<(String, Vec<T>)> {
    fn walk<T: TreeNode + Clone>(node: &TreeItem<T>, groups: &mut Vec<(String, Vec<T>)>) {
        if let Some(group) = node.item.group() {
            match groups.iter_mut().find(|(name, _)| name == group) {
                Some((_, members)) => members.push(node.item.clone()),
                None => groups.push((group.to_string(), vec![node.item.clone()])),
            }
        }
        for child in &node.children {
            walk(child, groups);
        }
    }

    let mut groups = Vec::new();
    for node in tree {
        walk(node, &mut groups);
    }
    groups
}

/// Descendants of `root` (or of the top level when `None`).
///
/// With `level` set, only the first `level` generations are returned unless
/// `traverse` is true, in which case the whole subtree is.
pub fn find_descendants<'a, T: TreeNode>(
    items: &'a [T],
    root: Option<&str>,
    level: Option<usize>,
    traverse: bool,
) -> Vec<&'a T> {
    fn walk<'a, T: TreeNode>(
        items: &'a [T],
        parent: Option<&str>,
        depth: usize,
        level: Option<usize>,
        traverse: bool,
        seen: &mut HashSet<&'a str>,
        out: &mut Vec<&'a T>,
    ) {
        for child in items.iter().filter(|i| i.parent_id() == parent) {
            if !seen.insert(child.id()) {
                continue;
            }
            let within = level.map_or(true, |max| depth <= max);
            if within || traverse {
                out.push(child);
            }
            if traverse || level.map_or(true, |max| depth < max) {
                walk(items, Some(child.id()), depth + 1, level, traverse, seen, out);
            }
        }
    }

    let mut out = Vec::new();
    walk(items, root, 1, level, traverse, &mut HashSet::new(), &mut out);
    out
}

/// Ids of every node below `root`, excluding `root` itself
pub fn descendant_ids<T: TreeNode>(items: &[T], root: &str) -> Vec<String> {
    find_descendants(items, Some(root), None, true)
        .into_iter()
        .map(|n| n.id().to_string())
        .collect()
}

/// An ungrouped item or a group of items sharing a label
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MenuEntry<T> {
    Item(T),
    Group(Vec<T>),
}

impl<T: TreeNode> MenuEntry<T> {
    fn min_order(&self) -> i64 {
        let key = |n: &T| n.order().map_or(i64::MAX, i64::from);
        match self {
            MenuEntry::Item(n) => key(n),
            MenuEntry::Group(ns) => ns.iter().map(key).min().unwrap_or(i64::MAX),
        }
    }
}

/// Splits items into ungrouped entries and groups, sorts each group by order
/// and the whole list by the smallest order it contains. Missing orders sort last.
pub fn group_menu_items<T: TreeNode + Clone>(items: &[T]) -> Vec<MenuEntry<T>> {
    let mut groups: Vec<(String, Vec<T>)> = Vec::new();
    let mut entries: Vec<MenuEntry<T>> = Vec::new();

    for item in items {
        match item.group() {
            Some(group) => match groups.iter_mut().find(|(name, _)| name == group) {
                Some((_, members)) => members.push(item.clone()),
                None => groups.push((group.to_string(), vec![item.clone()])),
            },
            None => entries.push(MenuEntry::Item(item.clone())),
        }
    }

    for (_, mut members) in groups {
        members.sort_by_key(|n| n.order().map_or(i64::MAX, i64::from));
        entries.push(MenuEntry::Group(members));
    }

    entries.sort_by_key(MenuEntry::min_order);
    entries
}

/// Path from the top level down to `id`, inclusive. Empty when `id` is unknown.
pub fn find_breadcrumb<'a, T: TreeNode>(items: &'a [T], id: &str) -> Vec<&'a T> {
    let by_id: HashMap<&str, &T> = items.iter().map(|i| (i.id(), i)).collect();
    let mut path = Vec::new();
    let mut current = Some(id);

    while let Some(cur) = current {
        let Some(&node) = by_id.get(cur) else { break };
        if path.len() > items.len() {
            break;
        }
        path.push(node);
        current = node.parent_id();
    }

    path.reverse();
    path
}

/// Checks that applying `updates` to `items` leaves a valid forest.
pub fn validate_reorder<T: TreeNode>(items: &[T], updates: &[ReorderItem]) -> Result<(), TreeError> {
    let mut parents: HashMap<&str, Option<&str>> =
        items.iter().map(|i| (i.id(), i.parent_id())).collect();

    for update in updates {
        if !parents.contains_key(update.id.as_str()) {
            return Err(TreeError::UnknownItem(update.id.clone()));
        }
    }
    for update in updates {
        if let Some(parent) = update.parent_id.as_deref() {
            if !parents.contains_key(parent) {
                return Err(TreeError::UnknownParent(parent.to_string()));
            }
        }
        parents.insert(update.id.as_str(), update.parent_id.as_deref());
    }

    for update in updates {
        let mut steps = 0;
        let mut current = parents.get(update.id.as_str()).copied().flatten();
        while let Some(ancestor) = current {
            if ancestor == update.id || steps > parents.len() {
                return Err(TreeError::Cycle(update.id.clone()));
            }
            steps += 1;
            current = parents.get(ancestor).copied().flatten();
        }
    }

    Ok(())
}

/// Checks that re-parenting a single existing item keeps the forest valid.
pub fn validate_move<T: TreeNode>(items: &[T], id: &str, parent_id: Option<&str>) -> Result<(), TreeError> {
    let order = items
        .iter()
        .find(|i| i.id() == id)
        .and_then(|i| i.order())
        .unwrap_or(0);

    validate_reorder(
        items,
        &[ReorderItem {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            order,
        }],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Node {
        id: String,
        parent_id: Option<String>,
        group: Option<String>,
        order: Option<i32>,
    }

    impl TreeNode for Node {
        fn id(&self) -> &str {
            &self.id
        }
        fn parent_id(&self) -> Option<&str> {
            self.parent_id.as_deref()
        }
        fn group(&self) -> Option<&str> {
            self.group.as_deref()
        }
        fn order(&self) -> Option<i32> {
            self.order
        }
    }

    fn node(id: &str, parent: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            parent_id: parent.map(String::from),
            group: None,
            order: None,
        }
    }

    fn sample() -> Vec<Node> {
        vec![
            node("a", None),
            node("b", Some("a")),
            node("c", Some("b")),
            node("d", None),
            node("e", Some("a")),
        ]
    }

    #[test]
    fn test_build_tree() {
        let tree = build_tree(&sample());
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].item.id, "a");
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].children[0].item.id, "c");
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn test_build_tree_omits_empty_children_when_serialized() {
        let tree = build_tree(&[node("a", None)]);
        let json = serde_json::to_value(&tree).unwrap();
        assert!(json[0].get("children").is_none());
        assert_eq!(json[0]["id"], "a");
    }

    #[test]
    fn test_find_descendants_by_level() {
        let items = sample();
        let first: Vec<&str> = find_descendants(&items, Some("a"), Some(1), false)
            .iter()
            .map(|n| n.id())
            .collect();
        assert_eq!(first, vec!["b", "e"]);

        let all: Vec<&str> = find_descendants(&items, Some("a"), Some(1), true)
            .iter()
            .map(|n| n.id())
            .collect();
        assert_eq!(all, vec!["b", "c", "e"]);
    }

    #[test]
    fn test_descendant_ids() {
        let mut ids = descendant_ids(&sample(), "a");
        ids.sort();
        assert_eq!(ids, vec!["b", "c", "e"]);
        assert!(descendant_ids(&sample(), "d").is_empty());
    }

    #[test]
    fn test_group_menu_items_orders_by_minimum() {
        let mut items = vec![
            node("x", None),
            node("y", None),
            node("z", None),
            node("w", None),
        ];
        items[0].order = Some(5);
        items[1].group = Some("content".into());
        items[1].order = Some(9);
        items[2].group = Some("content".into());
        items[2].order = Some(2);
        items[3].order = None;

        let entries = group_menu_items(&items);
        assert_eq!(entries.len(), 3);
        match &entries[0] {
            MenuEntry::Group(members) => {
                assert_eq!(members[0].id, "z");
                assert_eq!(members[1].id, "y");
            }
            other => panic!("expected group, got {:?}", other),
        }
        assert_eq!(entries[1], MenuEntry::Item(items[0].clone()));
        assert_eq!(entries[2], MenuEntry::Item(items[3].clone()));
    }

    #[test]
    fn test_group_by_items_walks_depth_first() {
        let mut items = sample();
        items[0].group = Some("main".into());
        items[2].group = Some("main".into());
        items[3].group = Some("side".into());

        let groups = group_by_items(&build_tree(&items));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "main");
        let ids: Vec<&str> = groups[0].1.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(groups[1].0, "side");
    }

    #[test]
    fn test_find_breadcrumb() {
        let items = sample();
        let path: Vec<&str> = find_breadcrumb(&items, "c").iter().map(|n| n.id()).collect();
        assert_eq!(path, vec!["a", "b", "c"]);
        assert!(find_breadcrumb(&items, "missing").is_empty());
    }

    #[test]
    fn test_validate_reorder_accepts_move() {
        let updates = vec![ReorderItem {
            id: "c".into(),
            parent_id: Some("d".into()),
            order: 0,
        }];
        assert!(validate_reorder(&sample(), &updates).is_ok());
    }

    #[test]
    fn test_validate_reorder_rejects_cycle() {
        let updates = vec![ReorderItem {
            id: "a".into(),
            parent_id: Some("c".into()),
            order: 0,
        }];
        assert_eq!(
            validate_reorder(&sample(), &updates),
            Err(TreeError::Cycle("a".into()))
        );
    }

    #[test]
    fn test_validate_move() {
        let items = sample();
        assert!(validate_move(&items, "c", Some("d")).is_ok());
        assert!(validate_move(&items, "b", None).is_ok());
        assert_eq!(validate_move(&items, "a", Some("a")), Err(TreeError::Cycle("a".into())));
        assert_eq!(validate_move(&items, "a", Some("c")), Err(TreeError::Cycle("a".into())));
        assert_eq!(
            validate_move(&items, "a", Some("ghost")),
            Err(TreeError::UnknownParent("ghost".into()))
        );
    }

    #[test]
    fn test_validate_reorder_rejects_unknown() {
        let unknown_item = vec![ReorderItem {
            id: "nope".into(),
            parent_id: None,
            order: 0,
        }];
        assert_eq!(
            validate_reorder(&sample(), &unknown_item),
            Err(TreeError::UnknownItem("nope".into()))
        );

        let unknown_parent = vec![ReorderItem {
            id: "a".into(),
            parent_id: Some("ghost".into()),
            order: 0,
        }];
        assert_eq!(
            validate_reorder(&sample(), &unknown_parent),
            Err(TreeError::UnknownParent("ghost".into()))
        );
    }
}
