use std::collections::HashSet;

use serde::Serialize;

use crate::manifest::MenuEntry;

/// A menu entry with its children, siblings ordered by `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuNode {
    #[serde(flatten)]
    pub entry: MenuEntry,
    pub children: Vec<MenuNode>,
}

fn children_of(
    parent: &str,
    entries: &[MenuEntry],
    visited: &mut HashSet<usize>,
) -> Vec<MenuNode> {
    let mut idx: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(i, e)| !visited.contains(i) && e.parent.as_deref() == Some(parent))
        .map(|(i, _)| i)
        .collect();
    idx.sort_by_key(|&i| entries[i].sequence);
    visited.extend(idx.iter().copied());

    idx.into_iter()
        .map(|i| MenuNode {
            entry: entries[i].clone(),
            children: children_of(&entries[i].id, entries, visited),
        })
        .collect()
}

/// Build the menu forest from the flat, aggregated entry list.
///
/// Entries whose parent is unknown are promoted to roots. Duplicate ids
/// (an addon registered twice) are kept as separate nodes.
pub fn build_menu_tree(entries: &[MenuEntry]) -> Vec<MenuNode> {
    let ids: HashSet<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    let mut visited = HashSet::new();

    let mut roots: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| match e.parent.as_deref() {
            None => true,
            Some(p) if !ids.contains(p) => {
                tracing::warn!(menu = %e.id, parent = %p, "menu parent not found, showing as root");
                true
            }
            Some(_) => false,
        })
        .map(|(i, _)| i)
        .collect();
    roots.sort_by_key(|&i| entries[i].sequence);
    visited.extend(roots.iter().copied());

    let mut tree: Vec<MenuNode> = roots
        .into_iter()
        .map(|i| MenuNode {
            entry: entries[i].clone(),
            children: children_of(&entries[i].id, entries, &mut visited),
        })
        .collect();

    // Entries only reachable through a parent cycle.
    for (i, entry) in entries.iter().enumerate() {
        if !visited.contains(&i) {
            tracing::warn!(menu = %entry.id, "menu entry is part of a parent cycle");
            visited.insert(i);
            tree.push(MenuNode {
                entry: entry.clone(),
                children: Vec::new(),
            });
        }
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, sequence: i32, parent: Option<&str>) -> MenuEntry {
        MenuEntry {
            id: id.into(),
            name: id.to_uppercase(),
            sequence,
            route: None,
            icon: None,
            parent: parent.map(Into::into),
        }
    }

    fn ids(nodes: &[MenuNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.entry.id.as_str()).collect()
    }

    #[test]
    fn test_forest_with_sequence_order() {
        let entries = vec![
            entry("sales", 20, None),
            entry("hr_leave", 30, Some("hr")),
            entry("hr", 5, None),
            entry("hr_employees", 10, Some("hr")),
        ];
        let tree = build_menu_tree(&entries);
        assert_eq!(ids(&tree), vec!["hr", "sales"]);
        assert_eq!(ids(&tree[0].children), vec!["hr_employees", "hr_leave"]);
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn test_orphans_become_roots() {
        let tree = build_menu_tree(&[entry("lost", 1, Some("gone"))]);
        assert_eq!(ids(&tree), vec!["lost"]);
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let entries = vec![entry("a", 1, Some("b")), entry("b", 2, Some("a"))];
        let tree = build_menu_tree(&entries);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_serializes_flat_entry_fields() {
        let tree = build_menu_tree(&[entry("hr", 1, None)]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json[0]["id"], "hr");
        assert_eq!(json[0]["children"], serde_json::json!([]));
    }
}
