//! Arena-backed B+Tree mapping lower-cased names to every value stored under them.
//!
//! All nodes live in one `Vec` owned by the tree and are addressed by [`NodeId`].
//! Internal nodes own their children through id slots (each child id appears in
//! exactly one parent), while the leaf forward link is a plain `Option<NodeId>`
//! used only for traversal. Nothing is ever removed: the structure grows by
//! splitting and the root is replaced only when the old root itself splits.
//!
//! Keys are normalized with [`normalize_key`] on insertion, so lookups through
//! [`BPlusTree::get`] are case-insensitive. The raw navigation helpers
//! ([`BPlusTree::find_leaf`], [`BPlusTree::first_leaf`]) expect keys that are
//! already normalized.

#![allow(missing_docs)]

use std::collections::HashSet;

use crate::core::errors::{FidxError, Result};

/// Default maximum fan-out of internal nodes (leaves hold at most `order - 1` entries).
pub const DEFAULT_ORDER: usize = 4;

/// Smallest order for which both split rules leave two non-empty halves.
pub const MIN_ORDER: usize = 3;

/// Lower-case a raw file name into its index key.
#[must_use]
pub fn normalize_key(name: &str) -> String {
    name.to_lowercase()
}

/// Handle to a node slot inside the tree arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One key together with every value inserted under it, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<V> {
    key: String,
    values: Vec<V>,
}

impl<V> Entry<V> {
    fn new(key: String, value: V) -> Self {
        Self {
            key,
            values: vec![value],
        }
    }

    /// Normalized key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Values stored under the key. Never empty.
    pub fn values(&self) -> &[V] {
        &self.values
    }
}

/// Leaf node: sorted entries plus the link to the next leaf in key order.
#[derive(Debug)]
pub struct LeafNode<V> {
    entries: Vec<Entry<V>>,
    next: Option<NodeId>,
}

impl<V> LeafNode<V> {
    const fn empty() -> Self {
        Self {
            entries: Vec::new(),
            next: None,
        }
    }

    /// Entries in strictly ascending key order.
    pub fn entries(&self) -> &[Entry<V>] {
        &self.entries
    }

    /// Next leaf in global key order, `None` for the last leaf.
    pub const fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Binary-search an already normalized key within this leaf.
    pub fn get(&self, key: &str) -> Option<&Entry<V>> {
        self.search(key).ok().map(|pos| &self.entries[pos])
    }

    fn search(&self, key: &str) -> std::result::Result<usize, usize> {
        self.entries
            .binary_search_by(|entry| entry.key.as_str().cmp(key))
    }

    /// Move the upper half into a new leaf that takes over this leaf's link.
    ///
    /// With `n` entries the left half keeps `ceil((n + 1) / 2)` of them.
    fn split(&mut self, new_id: NodeId) -> Self {
        let mid = (self.entries.len() + 1).div_ceil(2);
        let right = Self {
            entries: self.entries.split_off(mid),
            next: self.next.take(),
        };
        self.next = Some(new_id);
        right
    }
}

/// Routing node: `keys.len() + 1` children, child `i + 1` holds keys `>= keys[i]`.
#[derive(Debug)]
struct InternalNode {
    keys: Vec<String>,
    children: Vec<NodeId>,
}

impl InternalNode {
    /// Index of the unique child whose key range contains `key`.
    fn child_index(&self, key: &str) -> usize {
        self.keys.partition_point(|sep| sep.as_str() <= key)
    }

    /// Split an overflowing node; the middle key moves up and is kept by neither half.
    fn split(&mut self) -> (String, Self) {
        let mid = self.keys.len() / 2;
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        // After split_off the middle key is the last one left on this side.
        let promoted = self.keys.pop().unwrap_or_default();
        (
            promoted,
            Self {
                keys: right_keys,
                children: right_children,
            },
        )
    }
}

#[derive(Debug)]
enum Node<V> {
    Leaf(LeafNode<V>),
    Internal(InternalNode),
}

/// Result of a child split that the parent has to absorb.
struct Split {
    promoted: String,
    right: NodeId,
}

/// Structural summary used by diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeShape {
    pub height: usize,
    pub leaf_count: usize,
    pub internal_count: usize,
    pub keys: usize,
    pub values: usize,
}

/// Ordered multimap from normalized name to values.
#[derive(Debug)]
pub struct BPlusTree<V> {
    nodes: Vec<Node<V>>,
    root: NodeId,
    order: usize,
    len: usize,
    value_count: usize,
}

impl<V> Default for BPlusTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> BPlusTree<V> {
    /// Empty tree of [`DEFAULT_ORDER`]: a single empty leaf as root.
    #[must_use]
    pub fn new() -> Self {
        Self::empty(DEFAULT_ORDER)
    }

    /// Empty tree with a custom order.
    pub fn with_order(order: usize) -> Result<Self> {
        if order < MIN_ORDER {
            return Err(FidxError::InvalidConfig {
                details: format!("tree order must be >= {MIN_ORDER}, got {order}"),
            });
        }
        Ok(Self::empty(order))
    }

    fn empty(order: usize) -> Self {
        Self {
            nodes: vec![Node::Leaf(LeafNode::empty())],
            root: NodeId(0),
            order,
            len: 0,
            value_count: 0,
        }
    }

    /// Maximum children per internal node.
    pub const fn order(&self) -> usize {
        self.order
    }

    /// Number of distinct keys.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of stored values across all keys.
    pub const fn value_count(&self) -> usize {
        self.value_count
    }

    /// Insert `value` under `normalize_key(key)`, appending when the key exists.
    pub fn insert(&mut self, key: &str, value: V) {
        let key = normalize_key(key);
        if let Some(split) = self.insert_into(self.root, key, value) {
            let old_root = self.root;
            self.root = self.alloc(Node::Internal(InternalNode {
                keys: vec![split.promoted],
                children: vec![old_root, split.right],
            }));
        }
    }

    fn insert_into(&mut self, id: NodeId, key: String, value: V) -> Option<Split> {
        let descend = match &self.nodes[id.0] {
            Node::Internal(node) => {
                let slot = node.child_index(&key);
                Some((slot, node.children[slot]))
            }
            Node::Leaf(_) => None,
        };

        match descend {
            Some((slot, child)) => {
                let split = self.insert_into(child, key, value)?;
                self.absorb_split(id, slot, split)
            }
            None => self.insert_into_leaf(id, key, value),
        }
    }

    fn insert_into_leaf(&mut self, id: NodeId, key: String, value: V) -> Option<Split> {
        let max_entries = self.order - 1;
        let new_id = NodeId(self.nodes.len());

        let Node::Leaf(leaf) = &mut self.nodes[id.0] else {
            unreachable!("insert_into_leaf called on internal node {id:?}");
        };
        match leaf.search(&key) {
            Ok(pos) => {
                leaf.entries[pos].values.push(value);
                self.value_count += 1;
                return None;
            }
            Err(pos) => {
                leaf.entries.insert(pos, Entry::new(key, value));
                self.len += 1;
                self.value_count += 1;
            }
        }
        if leaf.entries.len() <= max_entries {
            return None;
        }

        let right = leaf.split(new_id);
        let promoted = right.entries[0].key.clone();
        let right = self.alloc(Node::Leaf(right));
        debug_assert_eq!(right, new_id);
        Some(Split { promoted, right })
    }

    fn absorb_split(&mut self, id: NodeId, slot: usize, split: Split) -> Option<Split> {
        let max_keys = self.order - 1;
        let Node::Internal(node) = &mut self.nodes[id.0] else {
            unreachable!("child split reported to leaf {id:?}");
        };
        node.keys.insert(slot, split.promoted);
        node.children.insert(slot + 1, split.right);
        if node.keys.len() <= max_keys {
            return None;
        }

        let (promoted, right) = node.split();
        let right = self.alloc(Node::Internal(right));
        Some(Split { promoted, right })
    }

    fn alloc(&mut self, node: Node<V>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Values stored under `name` (case-insensitive), if any.
    pub fn get(&self, name: &str) -> Option<&[V]> {
        let key = normalize_key(name);
        self.find_leaf(&key).get(&key).map(Entry::values)
    }

    /// The unique leaf whose key range contains the normalized `key`.
    pub fn find_leaf(&self, key: &str) -> &LeafNode<V> {
        let mut id = self.root;
        loop {
            match &self.nodes[id.0] {
                Node::Leaf(leaf) => return leaf,
                Node::Internal(node) => id = node.children[node.child_index(key)],
            }
        }
    }

    /// Leftmost leaf: the head of the leaf chain.
    pub fn first_leaf(&self) -> &LeafNode<V> {
        let mut id = self.root;
        loop {
            match &self.nodes[id.0] {
                Node::Leaf(leaf) => return leaf,
                Node::Internal(node) => id = node.children[0],
            }
        }
    }

    /// Resolve a leaf handle, e.g. one obtained from [`LeafNode::next`].
    pub fn leaf(&self, id: NodeId) -> Option<&LeafNode<V>> {
        match self.nodes.get(id.0) {
            Some(Node::Leaf(leaf)) => Some(leaf),
            _ => None,
        }
    }

    /// Walk the leaf chain from the first leaf.
    pub fn leaves(&self) -> LeafChain<'_, V> {
        LeafChain {
            tree: self,
            current: Some(self.first_leaf()),
        }
    }

    /// All entries in ascending key order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry<V>> + '_ {
        self.leaves().flat_map(|leaf| leaf.entries.iter())
    }

    pub fn root_is_leaf(&self) -> bool {
        matches!(self.nodes[self.root.0], Node::Leaf(_))
    }

    /// Separator keys of the root (empty while the root is a leaf).
    pub fn root_keys(&self) -> Vec<&str> {
        match &self.nodes[self.root.0] {
            Node::Internal(node) => node.keys.iter().map(String::as_str).collect(),
            Node::Leaf(_) => Vec::new(),
        }
    }

    /// Number of levels from root to leaves (1 for a leaf root).
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = self.root;
        while let Node::Internal(node) = &self.nodes[id.0] {
            height += 1;
            id = node.children[0];
        }
        height
    }

    pub fn shape(&self) -> TreeShape {
        let leaf_count = self
            .nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf(_)))
            .count();
        TreeShape {
            height: self.height(),
            leaf_count,
            internal_count: self.nodes.len() - leaf_count,
            keys: self.len,
            values: self.value_count,
        }
    }

    /// Check every structural invariant, reporting the first violation found.
    pub fn validate(&self) -> Result<()> {
        let mut walk = ValidationWalk::default();
        self.validate_node(self.root, None, None, 1, &mut walk)?;

        if walk.keys != self.len {
            return Err(FidxError::invariant(format!(
                "tree reports {} keys but leaves hold {}",
                self.len, walk.keys
            )));
        }
        if walk.values != self.value_count {
            return Err(FidxError::invariant(format!(
                "tree reports {} values but leaves hold {}",
                self.value_count, walk.values
            )));
        }

        // The chain must visit exactly the leaves found by descent, in the same order.
        let mut chain = Vec::with_capacity(walk.leaves.len());
        let mut seen = HashSet::new();
        let mut current = Some(self.first_leaf_id());
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(FidxError::invariant(format!("leaf chain cycles at {id:?}")));
            }
            chain.push(id);
            current = self.leaf(id).and_then(LeafNode::next);
        }
        if chain != walk.leaves {
            return Err(FidxError::invariant(format!(
                "leaf chain visits {} leaves, descent found {}",
                chain.len(),
                walk.leaves.len()
            )));
        }
        Ok(())
    }

    fn validate_node(
        &self,
        id: NodeId,
        lower: Option<&str>,
        upper: Option<&str>,
        depth: usize,
        walk: &mut ValidationWalk,
    ) -> Result<()> {
        let max_keys = self.order - 1;
        let in_range =
            |key: &str| lower.is_none_or(|lo| key >= lo) && upper.is_none_or(|hi| key < hi);

        match &self.nodes[id.0] {
            Node::Leaf(leaf) => {
                if leaf.entries.len() > max_keys {
                    return Err(FidxError::invariant(format!(
                        "leaf {id:?} holds {} entries, max {max_keys}",
                        leaf.entries.len()
                    )));
                }
                if leaf.entries.windows(2).any(|w| w[0].key >= w[1].key) {
                    return Err(FidxError::invariant(format!(
                        "leaf {id:?} keys are not strictly increasing"
                    )));
                }
                if let Some(entry) = leaf.entries.iter().find(|e| !in_range(&e.key)) {
                    return Err(FidxError::invariant(format!(
                        "key {:?} in leaf {id:?} lies outside its separator range",
                        entry.key
                    )));
                }
                if leaf.entries.iter().any(|e| e.values.is_empty()) {
                    return Err(FidxError::invariant(format!(
                        "leaf {id:?} holds an entry without values"
                    )));
                }
                match walk.leaf_depth {
                    Some(expected) if expected != depth => {
                        return Err(FidxError::invariant(format!(
                            "leaf {id:?} at depth {depth}, expected {expected}"
                        )));
                    }
                    _ => walk.leaf_depth = Some(depth),
                }
                walk.keys += leaf.entries.len();
                walk.values += leaf.entries.iter().map(|e| e.values.len()).sum::<usize>();
                walk.leaves.push(id);
            }
            Node::Internal(node) => {
                if node.keys.is_empty() || node.keys.len() > max_keys {
                    return Err(FidxError::invariant(format!(
                        "internal node {id:?} holds {} keys, allowed 1..={max_keys}",
                        node.keys.len()
                    )));
                }
                if node.children.len() != node.keys.len() + 1 {
                    return Err(FidxError::invariant(format!(
                        "internal node {id:?} has {} keys but {} children",
                        node.keys.len(),
                        node.children.len()
                    )));
                }
                if node.keys.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(FidxError::invariant(format!(
                        "internal node {id:?} separators are not strictly increasing"
                    )));
                }
                if let Some(key) = node.keys.iter().find(|k| !in_range(k)) {
                    return Err(FidxError::invariant(format!(
                        "separator {key:?} in node {id:?} lies outside its parent range"
                    )));
                }
                for (slot, &child) in node.children.iter().enumerate() {
                    let child_lower = if slot == 0 {
                        lower
                    } else {
                        Some(node.keys[slot - 1].as_str())
                    };
                    let child_upper = node.keys.get(slot).map(String::as_str).or(upper);
                    self.validate_node(child, child_lower, child_upper, depth + 1, walk)?;
                }
            }
        }
        Ok(())
    }

    fn first_leaf_id(&self) -> NodeId {
        let mut id = self.root;
        while let Node::Internal(node) = &self.nodes[id.0] {
            id = node.children[0];
        }
        id
    }
}

#[derive(Default)]
struct ValidationWalk {
    leaf_depth: Option<usize>,
    leaves: Vec<NodeId>,
    keys: usize,
    values: usize,
}

/// Iterator over leaves following the forward links.
pub struct LeafChain<'a, V> {
    tree: &'a BPlusTree<V>,
    current: Option<&'a LeafNode<V>>,
}

impl<'a, V> Iterator for LeafChain<'a, V> {
    type Item = &'a LeafNode<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let leaf = self.current?;
        let tree = self.tree;
        self.current = leaf.next.and_then(|id| tree.leaf(id));
        Some(leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<V>(tree: &BPlusTree<V>) -> Vec<String> {
        tree.entries().map(|e| e.key().to_string()).collect()
    }

    #[test]
    fn new_tree_is_single_empty_leaf() {
        let tree: BPlusTree<String> = BPlusTree::new();
        assert!(tree.is_empty());
        assert!(tree.root_is_leaf());
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.leaves().count(), 1);
        assert!(tree.first_leaf().is_empty());
        tree.validate().unwrap();
    }

    #[test]
    fn order_below_minimum_rejected() {
        let err = BPlusTree::<String>::with_order(2).unwrap_err();
        assert_eq!(err.code(), "FIDX-1001");
        assert!(BPlusTree::<String>::with_order(3).is_ok());
    }

    #[test]
    fn insert_lowercases_and_merges_case_variants() {
        let mut tree = BPlusTree::new();
        tree.insert("Report.PDF", "/a/Report.PDF".to_string());
        tree.insert("report.pdf", "/b/report.pdf".to_string());

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.value_count(), 2);
        assert_eq!(
            tree.get("REPORT.pdf").unwrap(),
            ["/a/Report.PDF".to_string(), "/b/report.pdf".to_string()]
        );
    }

    #[test]
    fn duplicate_pairs_keep_multiplicity() {
        let mut tree = BPlusTree::new();
        tree.insert("a.txt", "/x/a.txt");
        tree.insert("a.txt", "/x/a.txt");
        assert_eq!(tree.get("a.txt").unwrap(), ["/x/a.txt", "/x/a.txt"]);
    }

    #[test]
    fn fourth_key_splits_root_leaf() {
        let mut tree = BPlusTree::new();
        for name in ["d", "a", "c", "b"] {
            tree.insert(name, ());
        }

        assert!(!tree.root_is_leaf());
        assert_eq!(tree.root_keys(), ["d"]);
        let shape = tree.shape();
        assert_eq!(shape.height, 2);
        assert_eq!(shape.leaf_count, 2);
        assert_eq!(shape.internal_count, 1);
        assert_eq!(keys(&tree), ["a", "b", "c", "d"]);
        tree.validate().unwrap();
    }

    #[test]
    fn leaf_split_keeps_promoted_key_in_right_leaf() {
        let mut tree = BPlusTree::new();
        for name in ["a", "b", "c", "d"] {
            tree.insert(name, ());
        }
        let leaves: Vec<Vec<&str>> = tree
            .leaves()
            .map(|leaf| leaf.entries().iter().map(Entry::key).collect())
            .collect();
        assert_eq!(leaves, vec![vec!["a", "b", "c"], vec!["d"]]);
        assert_eq!(tree.root_keys(), ["d"]);
    }

    #[test]
    fn internal_split_promotes_middle_key_without_duplicating() {
        let mut tree = BPlusTree::new();
        // Enough ascending keys to overflow the root's separator list.
        for i in 0..20 {
            tree.insert(&format!("k{i:02}"), i);
        }
        tree.validate().unwrap();
        assert!(tree.height() >= 3);

        let root = tree.root_keys();
        assert!(!root.is_empty());
        for sep in root {
            // Promoted internal keys never reappear in the child separator lists.
            let Node::Internal(node) = &tree.nodes[tree.root.0] else {
                panic!("root must be internal");
            };
            for child in &node.children {
                if let Node::Internal(inner) = &tree.nodes[child.0] {
                    assert!(!inner.keys.iter().any(|k| k == sep));
                }
            }
        }
    }

    #[test]
    fn descending_and_interleaved_inserts_stay_ordered() {
        let mut tree = BPlusTree::with_order(3).unwrap();
        for i in (0..50).rev() {
            tree.insert(&format!("file{i:03}"), i);
        }
        for i in (0..50).step_by(7) {
            tree.insert(&format!("file{i:03}"), i + 1000);
        }
        tree.validate().unwrap();

        let got = keys(&tree);
        let mut expected: Vec<String> = (0..50).map(|i| format!("file{i:03}")).collect();
        expected.sort();
        assert_eq!(got, expected);
        assert_eq!(tree.value_count(), 50 + 8);
        assert_eq!(tree.get("FILE007").unwrap(), [7, 1007]);
    }

    #[test]
    fn find_leaf_returns_leaf_containing_key() {
        let mut tree = BPlusTree::new();
        for i in 0..40 {
            tree.insert(&format!("n{i:02}"), i);
        }
        for i in 0..40 {
            let key = format!("n{i:02}");
            assert_eq!(tree.find_leaf(&key).get(&key).unwrap().values(), [i]);
        }
        assert!(tree.find_leaf("zzz").get("zzz").is_none());
    }

    #[test]
    fn leaf_handle_rejects_internal_ids() {
        let mut tree = BPlusTree::new();
        for name in ["a", "b", "c", "d"] {
            tree.insert(name, ());
        }
        assert!(tree.leaf(tree.root).is_none());
        assert!(tree.leaf(NodeId(999)).is_none());
    }
}
