use smallvec::SmallVec;

use crate::{
    error::{error_corruption, error_validation},
    node::{Node, NodeKind},
    options::TreeOptions,
    repr::{PageId, NULL_PAGE},
    split::split3,
    store::PageStore,
    utils::EscapedBytes,
    Error, MAX_KEY_SIZE, MAX_VALUE_SIZE,
};

/// Trees can only grow one level per root split, so anything deeper is a page cycle.
const MAX_TREE_DEPTH: usize = 64;

/// A copy-on-write B+tree on top of a [PageStore].
///
/// Inserts never modify pages, they build new nodes along the path from the root to the
/// affected leaf, free the superseded non-root nodes and install the new root id.
/// The previous root *is not* freed, it's returned from [BTree::insert] so the caller can keep
/// it alive until the new root is durably committed.
#[derive(Debug)]
pub struct BTree<S: PageStore> {
    root: PageId,
    store: S,
    options: TreeOptions,
}

impl<S: PageStore> BTree<S> {
    /// Creates an empty tree.
    pub fn new(store: S) -> Self {
        Self::with_options(store, TreeOptions::default())
    }

    /// Creates an empty tree with the given options.
    pub fn with_options(store: S, options: TreeOptions) -> Self {
        Self {
            root: NULL_PAGE,
            store,
            options,
        }
    }

    /// Opens a tree rooted at `root`, which must be a page in `store` or [NULL_PAGE].
    /// The root page is read and checked.
    pub fn open(store: S, root: PageId, options: TreeOptions) -> Result<Self, Error> {
        let tree = Self {
            root,
            store,
            options,
        };
        if root != NULL_PAGE {
            tree.read_node(root)?;
        }
        Ok(tree)
    }

    /// The current root page id, [NULL_PAGE] if the tree is empty.
    #[inline]
    pub fn root(&self) -> PageId {
        self.root
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root == NULL_PAGE
    }

    #[inline]
    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    fn set_root(&mut self, root: PageId) {
        if self.root != root {
            trace!("set_root {} -> {}", self.root, root);
            self.root = root;
        }
    }

    fn read_node(&self, page_id: PageId) -> Result<Node, Error> {
        let page = self.store.read(page_id)?;
        Node::from_page(page, self.options.verify_key_order)
    }

    fn allocate_node(&mut self, node: &Node) -> Result<PageId, Error> {
        debug_assert_eq!(node.span(), 1);
        self.store.allocate(node.data())
    }

    /// Returns the value corresponding to the key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if self.root == NULL_PAGE || key.is_empty() || key.len() > MAX_KEY_SIZE {
            return Ok(None);
        }
        let mut node = self.read_node(self.root)?;
        for _ in 0..MAX_TREE_DEPTH {
            match node.kind()? {
                NodeKind::Leaf => {
                    return Ok(node.search_keys(key).ok().map(|i| node.value_at(i).to_vec()));
                }
                NodeKind::Internal => {
                    let child_id = node.pointer_at(node.lookup_le(key));
                    node = self.read_node(child_id)?;
                }
            }
        }
        Err(error_corruption!("Tree deeper than {MAX_TREE_DEPTH} levels"))
    }

    /// Inserts a key-value pair into the tree, updating the value if the key is already present.
    ///
    /// On success the tree points to a new root and the previous root id is returned
    /// ([NULL_PAGE] for the first insert). The previous root isn't freed.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<PageId, Error> {
        Self::validate_key_value_lengths(key, value)?;
        let old_root = self.root;
        let new_root = if old_root == NULL_PAGE {
            let mut root = Node::new(NodeKind::Leaf, 2, 1);
            root.append_kv(0, 0, b"", b"");
            root.append_kv(1, 0, key, value);
            self.allocate_node(&root)?
        } else {
            let root = self.read_node(old_root)?;
            let root = self.node_insert(&root, key, value, 0)?;
            let split = split3(root)?;
            if let [root] = &split[..] {
                self.allocate_node(root)?
            } else {
                trace!("root split into {} nodes", split.len());
                let mut root = Node::new(NodeKind::Internal, split.len(), 1);
                for (i, node) in split.iter().enumerate() {
                    let child_id = self.allocate_node(node)?;
                    root.append_kv(i, child_id, node.key_at(0), b"");
                }
                self.allocate_node(&root)?
            }
        };
        self.set_root(new_root);
        Ok(old_root)
    }

    /// Returns a new, possibly oversized, node with the key-value pair inserted in `node`'s subtree.
    fn node_insert(
        &mut self,
        node: &Node,
        key: &[u8],
        value: &[u8],
        depth: usize,
    ) -> Result<Node, Error> {
        if depth >= MAX_TREE_DEPTH {
            return Err(error_corruption!("Tree deeper than {MAX_TREE_DEPTH} levels"));
        }
        match node.kind()? {
            NodeKind::Leaf => Ok(match node.search_keys(key) {
                Ok(idx) => Node::leaf_update(node, idx, key, value),
                Err(idx) => Node::leaf_insert(node, idx, key, value),
            }),
            NodeKind::Internal => {
                let idx = node.lookup_le(key);
                let child_id = node.pointer_at(idx);
                let child = self.read_node(child_id)?;
                let child = self.node_insert(&child, key, value, depth + 1)?;
                let split = split3(child)?;
                self.store.free(child_id)?;
                let mut kids = SmallVec::<(PageId, &[u8]), 3>::new();
                for kid in split.iter() {
                    kids.push((self.allocate_node(kid)?, kid.key_at(0)));
                }
                if kids.len() > 1 {
                    trace!(
                        "child {child_id} at {idx} split into {} nodes, first key {}",
                        kids.len(),
                        EscapedBytes(kids[0].1)
                    );
                }
                Ok(Node::replace_children(node, idx, &kids))
            }
        }
    }

    fn validate_key_value_lengths(key: &[u8], value: &[u8]) -> Result<(), Error> {
        if key.is_empty() {
            return Err(error_validation!("Keys must not be empty"));
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(error_validation!(
                "Key length ({}) exceeds maximum key length {MAX_KEY_SIZE}",
                key.len()
            ));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(error_validation!(
                "Value length ({}) exceeds maximum value length {MAX_VALUE_SIZE}",
                value.len()
            ));
        }
        Ok(())
    }

    /// Visits every node reachable from the root, children before their parents.
    #[cfg(any(fuzzing, test))]
    pub fn iter_nodes(&self, cb: &mut dyn FnMut(PageId, &Node)) -> Result<(), Error> {
        fn recurse<S: PageStore>(
            tree: &BTree<S>,
            page_id: PageId,
            cb: &mut dyn FnMut(PageId, &Node),
        ) -> Result<(), Error> {
            let node = tree.read_node(page_id)?;
            if node.kind()? == NodeKind::Internal {
                for i in 0..node.num_keys() {
                    recurse(tree, node.pointer_at(i), cb)?;
                }
            }
            cb(page_id, &node);
            Ok(())
        }

        if self.root == NULL_PAGE {
            return Ok(());
        }
        recurse(self, self.root, cb)
    }

    /// All user key-value pairs in key order.
    #[cfg(any(fuzzing, test))]
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let mut entries = Vec::new();
        self.iter_nodes(&mut |_, node| {
            if matches!(node.kind(), Ok(NodeKind::Leaf)) {
                for i in 0..node.num_keys() {
                    if !node.key_at(i).is_empty() {
                        entries.push((node.key_at(i).to_vec(), node.value_at(i).to_vec()));
                    }
                }
            }
        })?;
        Ok(entries)
    }

    /// Checks the structure of the whole tree, returns the number of reachable pages.
    #[cfg(any(fuzzing, test))]
    pub fn validate(&self) -> Result<usize, Error> {
        struct Validator<'a, S: PageStore> {
            tree: &'a BTree<S>,
            leaf_depth: Option<usize>,
            num_pages: usize,
        }

        impl<S: PageStore> Validator<'_, S> {
            fn recurse(
                &mut self,
                page_id: PageId,
                lower: &[u8],
                upper: Option<&[u8]>,
                depth: usize,
            ) -> Result<(), Error> {
                if depth >= MAX_TREE_DEPTH {
                    return Err(error_corruption!("Tree deeper than {MAX_TREE_DEPTH} levels"));
                }
                let page = self.tree.store.read(page_id)?;
                let node = Node::from_page(page, true)?;
                self.num_pages += 1;
                if node.key_at(0) != lower {
                    return Err(error_corruption!(
                        "Node {page_id} first key {} doesn't match separator {}",
                        EscapedBytes(node.key_at(0)),
                        EscapedBytes(lower)
                    ));
                }
                let last_key = node.key_at(node.num_keys() - 1);
                if upper.is_some_and(|upper| last_key >= upper) {
                    return Err(error_corruption!(
                        "Node {page_id} last key {} out of range",
                        EscapedBytes(last_key)
                    ));
                }
                match node.kind()? {
                    NodeKind::Leaf => match self.leaf_depth {
                        Some(leaf_depth) if leaf_depth != depth => Err(error_corruption!(
                            "Leaf {page_id} at depth {depth}, expected {leaf_depth}"
                        )),
                        _ => {
                            self.leaf_depth = Some(depth);
                            Ok(())
                        }
                    },
                    NodeKind::Internal => {
                        for i in 0..node.num_keys() {
                            let child_upper = if i + 1 < node.num_keys() {
                                Some(node.key_at(i + 1))
                            } else {
                                upper
                            };
                            self.recurse(node.pointer_at(i), node.key_at(i), child_upper, depth + 1)?;
                        }
                        Ok(())
                    }
                }
            }
        }

        if self.root == NULL_PAGE {
            return Ok(0);
        }
        let mut validator = Validator {
            tree: self,
            leaf_depth: None,
            num_pages: 0,
        };
        validator.recurse(self.root, b"", None, 0)?;
        Ok(validator.num_pages)
    }
}
