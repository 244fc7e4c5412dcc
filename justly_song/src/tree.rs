// The song tree: an arena of nodes three levels deep.
//
// Level 0 is the root (a pure container with no interval), level 1 holds
// groups (chords), level 2 holds leaves (notes). Every node lives in a slot of
// `SongTree::slots` and is addressed by `NodeId`; parents point at children
// through ordered `Vec<NodeId>`s and children point back with a plain
// `NodeId`. A node's row is found by a linear scan of its parent's children,
// which is cheap at the sizes a hand-edited song reaches.
//
// Nodes that leave the tree become `Subtree`s: owned, parent-less values that
// carry an item and their own children. Undo payloads and the clipboard are
// `Vec<Subtree>`. Moving a subtree back in re-allocates slots, so `NodeId`s
// are not stable across remove/insert; anything that must survive that (the
// command layer) addresses nodes by `TreePath` instead.
//
// All mutating operations validate first and mutate second. A call that
// returns `Err` has not touched the tree, and `insert_subtrees` leaves its
// source vector untouched on error.
//
// See also: `item.rs` for the per-node interval data, `record.rs` for the
// persisted form, `song.rs` for the document that wraps this tree and emits
// change notifications.
//
// **Critical constraint: shape.** The children of a node all have level
// `node.level + 1`, and leaves have no children. Every path into this module
// that adds nodes checks this before allocating anything.

use crate::error::SongError;
use crate::item::IntervalItem;
use crate::record::{NodeRecord, record_to_subtree, subtree_to_record};
use crate::types::{CellValue, Field, Level, NodeId, Role, TreePath};

/// One slot-resident node.
#[derive(Clone, Debug)]
pub struct TreeNode {
    /// Fixed at construction.
    pub level: Level,
    /// `None` only for the root.
    pub item: Option<IntervalItem>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// A detached, owned subtree (a group with its leaves, or a single leaf).
#[derive(Clone, Debug, PartialEq)]
pub struct Subtree {
    pub item: IntervalItem,
    pub children: Vec<Subtree>,
}

impl Subtree {
    /// A blank childless node at `level`. `None` for the root level.
    pub fn blank(level: Level) -> Option<Subtree> {
        Some(Subtree {
            item: IntervalItem::blank(level)?,
            children: Vec::new(),
        })
    }

    pub fn level(&self) -> Level {
        self.item.level()
    }

    pub fn to_record(&self) -> NodeRecord {
        subtree_to_record(self)
    }

    /// Check that this subtree could sit at `path` with level `expected`.
    fn check_shape(&self, expected: Level, path: &TreePath) -> Result<(), SongError> {
        let found = self.level();
        if found != expected {
            return Err(SongError::LevelMismatch { expected, found });
        }
        match expected.child() {
            Some(child_level) => {
                for (row, child) in self.children.iter().enumerate() {
                    child.check_shape(child_level, &path.child(row))?;
                }
            }
            None if !self.children.is_empty() => {
                return Err(SongError::LeafHasNoChildren { path: path.clone() });
            }
            None => {}
        }
        Ok(())
    }
}

/// Build detached subtrees from records destined for children of `parent`.
pub fn subtrees_from_records(
    records: &[NodeRecord],
    level: Level,
    parent: &TreePath,
) -> Result<Vec<Subtree>, SongError> {
    records
        .iter()
        .enumerate()
        .map(|(row, record)| record_to_subtree(record, level, &parent.child(row)))
        .collect()
}

/// Arena-backed song tree. Always has a root.
#[derive(Clone, Debug)]
pub struct SongTree {
    slots: Vec<Option<TreeNode>>,
    free: Vec<NodeId>,
    root: NodeId,
}

impl Default for SongTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SongTree {
    /// A tree with an empty root.
    pub fn new() -> Self {
        SongTree {
            slots: vec![Some(TreeNode {
                level: Level::Root,
                item: None,
                parent: None,
                children: Vec::new(),
            })],
            free: Vec::new(),
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes, root included.
    pub fn node_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn node(&self, id: NodeId) -> Result<&TreeNode, SongError> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(SongError::StaleNode(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut TreeNode, SongError> {
        self.slots
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(SongError::StaleNode(id.0))
    }

    pub fn level(&self, id: NodeId) -> Result<Level, SongError> {
        Ok(self.node(id)?.level)
    }

    pub fn child_count(&self, id: NodeId) -> Result<usize, SongError> {
        Ok(self.node(id)?.children.len())
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], SongError> {
        Ok(&self.node(id)?.children)
    }

    pub fn child(&self, id: NodeId, row: usize) -> Result<NodeId, SongError> {
        let node = self.node(id)?;
        match node.children.get(row) {
            Some(&child) => Ok(child),
            None => Err(SongError::RowOutOfRange {
                path: self.path_of(id)?.child(row),
                row,
                child_count: node.children.len(),
            }),
        }
    }

    /// The interval item of a non-root node.
    pub fn item(&self, id: NodeId) -> Result<&IntervalItem, SongError> {
        self.node(id)?.item.as_ref().ok_or(SongError::IsRoot)
    }

    /// Walk `path` down from the root.
    pub fn resolve(&self, path: &TreePath) -> Result<NodeId, SongError> {
        let mut id = self.root;
        for &row in path.rows() {
            let node = self.node(id)?;
            id = match node.children.get(row) {
                Some(&child) => child,
                None => {
                    return Err(SongError::RowOutOfRange {
                        path: path.clone(),
                        row,
                        child_count: node.children.len(),
                    });
                }
            };
        }
        Ok(id)
    }

    pub fn path_of(&self, id: NodeId) -> Result<TreePath, SongError> {
        let mut rows = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            rows.push(self.row_in(parent, current)?);
            current = parent;
        }
        rows.reverse();
        Ok(TreePath::new(&rows))
    }

    /// Row within the parent; `None` for the root.
    pub fn row_of(&self, id: NodeId) -> Result<Option<usize>, SongError> {
        match self.node(id)?.parent {
            Some(parent) => self.row_in(parent, id).map(Some),
            None => Ok(None),
        }
    }

    fn row_in(&self, parent: NodeId, id: NodeId) -> Result<usize, SongError> {
        self.node(parent)?
            .children
            .iter()
            .position(|&child| child == id)
            .ok_or(SongError::StaleNode(id.0))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check that children may be inserted at `position` under `parent`, and
    /// return the level they must have.
    pub fn check_insertable(&self, parent: NodeId, position: usize) -> Result<Level, SongError> {
        let node = self.node(parent)?;
        let Some(child_level) = node.level.child() else {
            return Err(SongError::LeafHasNoChildren {
                path: self.path_of(parent)?,
            });
        };
        if position > node.children.len() {
            return Err(SongError::PositionOutOfRange {
                parent: self.path_of(parent)?,
                position,
                child_count: node.children.len(),
            });
        }
        for &child in &node.children {
            let found = self.node(child)?.level;
            if found != child_level {
                return Err(SongError::LevelMismatch {
                    expected: child_level,
                    found,
                });
            }
        }
        Ok(child_level)
    }

    /// Check that `position..position + count` is a non-empty range of
    /// existing children of `parent`.
    pub fn check_range(
        &self,
        parent: NodeId,
        position: usize,
        count: usize,
    ) -> Result<(), SongError> {
        let node = self.node(parent)?;
        if count == 0 {
            return Err(SongError::EmptyRange {
                parent: self.path_of(parent)?,
            });
        }
        let end = position.saturating_add(count);
        if end > node.children.len() {
            return Err(SongError::RangeOutOfBounds {
                parent: self.path_of(parent)?,
                position,
                end,
                child_count: node.children.len(),
            });
        }
        Ok(())
    }

    pub fn check_subtree_insertion(
        &self,
        parent: NodeId,
        position: usize,
        subtrees: &[Subtree],
    ) -> Result<(), SongError> {
        let child_level = self.check_insertable(parent, position)?;
        let parent_path = self.path_of(parent)?;
        if subtrees.is_empty() {
            return Err(SongError::EmptyRange {
                parent: parent_path,
            });
        }
        for (offset, subtree) in subtrees.iter().enumerate() {
            subtree.check_shape(child_level, &parent_path.child(position + offset))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Structural mutation
    // -----------------------------------------------------------------------

    fn alloc(&mut self, node: TreeNode) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id.index()] = Some(node);
                id
            }
            None => {
                let id = NodeId(self.slots.len() as u32);
                self.slots.push(Some(node));
                id
            }
        }
    }

    /// Insert `count` blank children at `position`.
    pub fn insert_blank(
        &mut self,
        parent: NodeId,
        position: usize,
        count: usize,
    ) -> Result<(), SongError> {
        let child_level = self.check_insertable(parent, position)?;
        if count == 0 {
            return Err(SongError::EmptyRange {
                parent: self.path_of(parent)?,
            });
        }
        let ids: Vec<NodeId> = (0..count)
            .map(|_| {
                self.alloc(TreeNode {
                    level: child_level,
                    item: IntervalItem::blank(child_level),
                    parent: Some(parent),
                    children: Vec::new(),
                })
            })
            .collect();
        self.node_mut(parent)?.children.splice(position..position, ids);
        Ok(())
    }

    /// Move every subtree out of `subtrees` and splice them in at `position`.
    /// Returns how many were inserted. On error `subtrees` is left intact.
    pub fn insert_subtrees(
        &mut self,
        parent: NodeId,
        position: usize,
        subtrees: &mut Vec<Subtree>,
    ) -> Result<usize, SongError> {
        self.check_subtree_insertion(parent, position, subtrees)?;
        let count = subtrees.len();
        let ids: Vec<NodeId> = subtrees
            .drain(..)
            .map(|subtree| self.attach(subtree, parent))
            .collect();
        self.node_mut(parent)?.children.splice(position..position, ids);
        Ok(count)
    }

    fn attach(&mut self, subtree: Subtree, parent: NodeId) -> NodeId {
        let Subtree { item, children } = subtree;
        let id = self.alloc(TreeNode {
            level: item.level(),
            item: Some(item),
            parent: Some(parent),
            children: Vec::new(),
        });
        let child_ids: Vec<NodeId> = children
            .into_iter()
            .map(|child| self.attach(child, id))
            .collect();
        if let Some(Some(node)) = self.slots.get_mut(id.index()) {
            node.children = child_ids;
        }
        id
    }

    /// Detach `count` children starting at `position`. With a sink they are
    /// appended to it in order; otherwise they are destroyed.
    pub fn remove_range(
        &mut self,
        parent: NodeId,
        position: usize,
        count: usize,
        sink: Option<&mut Vec<Subtree>>,
    ) -> Result<(), SongError> {
        self.check_range(parent, position, count)?;
        let removed: Vec<NodeId> = self
            .node_mut(parent)?
            .children
            .drain(position..position + count)
            .collect();
        match sink {
            Some(sink) => {
                for id in removed {
                    sink.push(self.detach(id)?);
                }
            }
            None => {
                for id in removed {
                    self.release(id);
                }
            }
        }
        Ok(())
    }

    fn detach(&mut self, id: NodeId) -> Result<Subtree, SongError> {
        let node = self
            .slots
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(SongError::StaleNode(id.0))?;
        self.free.push(id);
        let item = node.item.ok_or(SongError::IsRoot)?;
        let mut children = Vec::with_capacity(node.children.len());
        for child in node.children {
            children.push(self.detach(child)?);
        }
        Ok(Subtree { item, children })
    }

    // Iterative so arbitrarily wide removals never recurse.
    fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.slots.get_mut(id.index()).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(id);
            }
        }
    }

    /// Independent copies of `count` children starting at `position`.
    pub fn deep_copy_range(
        &self,
        parent: NodeId,
        position: usize,
        count: usize,
    ) -> Result<Vec<Subtree>, SongError> {
        self.check_range(parent, position, count)?;
        self.node(parent)?.children[position..position + count]
            .iter()
            .map(|&id| self.to_subtree(id))
            .collect()
    }

    /// Copy of one non-root node with all its descendants.
    pub fn to_subtree(&self, id: NodeId) -> Result<Subtree, SongError> {
        let node = self.node(id)?;
        let item = node.item.clone().ok_or(SongError::IsRoot)?;
        let children = node
            .children
            .iter()
            .map(|&child| self.to_subtree(child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Subtree { item, children })
    }

    /// Replace every child of `parent`. Validates the incoming subtrees before
    /// the old children are dropped.
    pub fn replace_children(
        &mut self,
        parent: NodeId,
        mut subtrees: Vec<Subtree>,
    ) -> Result<(), SongError> {
        if !subtrees.is_empty() {
            self.check_subtree_insertion(parent, 0, &subtrees)?;
        }
        let old_count = self.child_count(parent)?;
        if old_count > 0 {
            self.remove_range(parent, 0, old_count, None)?;
        }
        if !subtrees.is_empty() {
            self.insert_subtrees(parent, 0, &mut subtrees)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Field access
    // -----------------------------------------------------------------------

    pub fn field_get(
        &self,
        id: NodeId,
        field: Field,
        role: Role,
    ) -> Result<Option<CellValue>, SongError> {
        Ok(self.item(id)?.data(field, role))
    }

    /// Returns `Ok(false)` when the item refuses the value.
    pub fn field_set(
        &mut self,
        id: NodeId,
        field: Field,
        value: &CellValue,
        role: Role,
    ) -> Result<bool, SongError> {
        let item = self.node_mut(id)?.item.as_mut().ok_or(SongError::IsRoot)?;
        Ok(item.set_data(field, value, role))
    }

    pub fn is_editable(&self, id: NodeId, field: Field) -> Result<bool, SongError> {
        Ok(self.item(id)?.is_editable(field))
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    /// Record for one non-root node, children included.
    pub fn serialize(&self, id: NodeId) -> Result<NodeRecord, SongError> {
        Ok(self.to_subtree(id)?.to_record())
    }

    /// Records for every child of `id` (for the root: the song's groups).
    pub fn serialize_children(&self, id: NodeId) -> Result<Vec<NodeRecord>, SongError> {
        self.node(id)?
            .children
            .iter()
            .map(|&child| self.serialize(child))
            .collect()
    }

    /// Replace the children of `parent` with nodes built from `records`.
    pub fn deserialize_children(
        &mut self,
        parent: NodeId,
        records: &[NodeRecord],
    ) -> Result<(), SongError> {
        let level = self.level(parent)?;
        let Some(child_level) = level.child() else {
            if records.is_empty() {
                return Ok(());
            }
            return Err(SongError::LeafHasNoChildren {
                path: self.path_of(parent)?,
            });
        };
        let subtrees = subtrees_from_records(records, child_level, &self.path_of(parent)?)?;
        self.replace_children(parent, subtrees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Root with `groups` groups, each holding `leaves` leaves.
    fn tree_with(groups: usize, leaves: usize) -> SongTree {
        let mut tree = SongTree::new();
        let root = tree.root();
        tree.insert_blank(root, 0, groups).unwrap();
        if leaves > 0 {
            for row in 0..groups {
                let group = tree.child(root, row).unwrap();
                tree.insert_blank(group, 0, leaves).unwrap();
            }
        }
        tree
    }

    fn snapshot(tree: &SongTree) -> String {
        serde_json::to_string(&tree.serialize_children(tree.root()).unwrap()).unwrap()
    }

    #[test]
    fn blank_children_take_the_next_level() {
        let tree = tree_with(2, 3);
        let group = tree.resolve(&TreePath::group(1)).unwrap();
        let leaf = tree.resolve(&TreePath::leaf(1, 2)).unwrap();
        assert_eq!(tree.level(group).unwrap(), Level::Group);
        assert_eq!(tree.level(leaf).unwrap(), Level::Leaf);
        assert_eq!(tree.item(leaf).unwrap().instrument(), Some("default"));
        assert_eq!(tree.path_of(leaf).unwrap(), TreePath::leaf(1, 2));
        assert_eq!(tree.row_of(leaf).unwrap(), Some(2));
        assert_eq!(tree.row_of(tree.root()).unwrap(), None);
        assert_eq!(tree.node_count(), 1 + 2 + 6);
    }

    #[test]
    fn insert_blank_rejects_bad_requests() {
        let mut tree = tree_with(1, 1);
        let root = tree.root();
        let leaf = tree.resolve(&TreePath::leaf(0, 0)).unwrap();
        assert!(matches!(
            tree.insert_blank(root, 2, 1),
            Err(SongError::PositionOutOfRange { .. })
        ));
        assert!(matches!(
            tree.insert_blank(root, 0, 0),
            Err(SongError::EmptyRange { .. })
        ));
        assert!(matches!(
            tree.insert_blank(leaf, 0, 1),
            Err(SongError::LeafHasNoChildren { .. })
        ));
        assert_eq!(tree.child_count(root).unwrap(), 1);
    }

    #[test]
    fn resolve_out_of_range_is_a_lookup_error() {
        let tree = tree_with(1, 1);
        let err = tree.resolve(&TreePath::leaf(0, 3)).unwrap_err();
        assert!(err.is_lookup());
        assert!(tree.resolve(&TreePath::new(&[0, 0, 0])).is_err());
    }

    #[test]
    fn level_mismatch_leaves_tree_and_source_untouched() {
        let mut tree = tree_with(2, 2);
        let before = snapshot(&tree);
        let group = tree.resolve(&TreePath::group(0)).unwrap();

        // Groups cannot go under a group.
        let mut groups = tree.deep_copy_range(tree.root(), 0, 1).unwrap();
        let err = tree.insert_subtrees(group, 0, &mut groups).unwrap_err();
        assert!(matches!(
            err,
            SongError::LevelMismatch {
                expected: Level::Leaf,
                found: Level::Group
            }
        ));
        assert_eq!(groups.len(), 1);
        assert_eq!(snapshot(&tree), before);
    }

    #[test]
    fn remove_then_insert_restores_state() {
        let mut tree = tree_with(3, 2);
        let root = tree.root();
        let group = tree.resolve(&TreePath::group(1)).unwrap();
        tree.field_set(group, Field::Numerator, &CellValue::Int(3), Role::Edit)
            .unwrap();
        let before = snapshot(&tree);

        let mut removed = Vec::new();
        tree.remove_range(root, 1, 2, Some(&mut removed)).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].item.interval().numerator, 3);
        assert_eq!(removed[0].children.len(), 2);
        assert_eq!(tree.child_count(root).unwrap(), 1);

        assert_eq!(tree.insert_subtrees(root, 1, &mut removed).unwrap(), 2);
        assert!(removed.is_empty());
        assert_eq!(snapshot(&tree), before);
    }

    #[test]
    fn remove_without_sink_recycles_slots() {
        let mut tree = tree_with(2, 4);
        let root = tree.root();
        let slots = tree.slots.len();
        tree.remove_range(root, 0, 1, None).unwrap();
        assert_eq!(tree.node_count(), 1 + 1 + 4);
        tree.insert_blank(root, 0, 1).unwrap();
        assert_eq!(tree.slots.len(), slots);
    }

    #[test]
    fn remove_range_bounds() {
        let mut tree = tree_with(2, 0);
        let root = tree.root();
        assert!(matches!(
            tree.remove_range(root, 1, 2, None),
            Err(SongError::RangeOutOfBounds { .. })
        ));
        assert!(matches!(
            tree.remove_range(root, 0, 0, None),
            Err(SongError::EmptyRange { .. })
        ));
        assert_eq!(tree.child_count(root).unwrap(), 2);
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut tree = tree_with(1, 2);
        let root = tree.root();
        let copies = tree.deep_copy_range(root, 0, 1).unwrap();
        let leaf = tree.resolve(&TreePath::leaf(0, 0)).unwrap();
        tree.field_set(leaf, Field::Words, &CellValue::from("changed"), Role::Edit)
            .unwrap();
        assert_eq!(copies[0].children[0].item.interval().words, "");
        assert_eq!(tree.child_count(root).unwrap(), 1);
    }

    #[test]
    fn root_has_no_fields() {
        let mut tree = tree_with(1, 0);
        let root = tree.root();
        assert!(matches!(
            tree.field_get(root, Field::Numerator, Role::Display),
            Err(SongError::IsRoot)
        ));
        assert!(matches!(
            tree.field_set(root, Field::Numerator, &CellValue::Int(2), Role::Edit),
            Err(SongError::IsRoot)
        ));
    }

    #[test]
    fn serialize_deserialize_roundtrip() {
        let mut tree = tree_with(2, 2);
        let leaf = tree.resolve(&TreePath::leaf(1, 0)).unwrap();
        tree.field_set(leaf, Field::Instrument, &CellValue::from("organ"), Role::Edit)
            .unwrap();
        let records = tree.serialize_children(tree.root()).unwrap();

        let mut other = SongTree::new();
        let root = other.root();
        other.deserialize_children(root, &records).unwrap();
        assert_eq!(snapshot(&other), snapshot(&tree));
    }

    #[test]
    fn childless_nodes_serialize_without_children_key() {
        let tree = tree_with(1, 1);
        let json = serde_json::to_value(tree.serialize_children(tree.root()).unwrap()).unwrap();
        assert!(json[0].get("children").is_some());
        assert!(json[0]["children"][0].get("children").is_none());
    }

    #[test]
    fn failed_deserialize_keeps_old_children() {
        let mut tree = tree_with(2, 1);
        let before = snapshot(&tree);
        let bad = vec![NodeRecord {
            denominator: 0,
            ..NodeRecord::default()
        }];
        let root = tree.root();
        assert!(tree.deserialize_children(root, &bad).is_err());
        assert_eq!(snapshot(&tree), before);
    }
}
