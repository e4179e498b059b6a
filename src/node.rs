//! Page codec for B+tree nodes.
//!
//! Leaves and internal nodes share one physical format:
//!
//! ```text
//! | type | nkeys |  pointers  |   offsets  | key-values | unused |
//! |  2B  |   2B  | nkeys * 8B | nkeys * 2B |     ...    |        |
//!
//! key-value: | klen | vlen | key | val |
//!            |  2B  |  2B  | ... | ... |
//! ```
//!
//! Offsets are cumulative positions of entries `1..=nkeys` in the key-value region, entry 0
//! always starts at offset 0. Internal nodes use the pointer array and store empty values,
//! leaves leave the pointers zeroed.
//!
//! Nodes are never edited in place. New nodes are built by appending entries in order, copying
//! ranges of an old node around the changed entries.
use std::cmp::Ordering;

use zerocopy::byteorder::little_endian::{U16, U64};

use crate::{
    error::error_corruption,
    page::Page,
    repr::{header_cast, header_cast_mut, KvHeader, NodeHeader, PageId, NODE_TYPE_INTERNAL, NODE_TYPE_LEAF},
    utils::EscapedBytes,
    Error, HEADER_SIZE, KV_HEADER_SIZE, MAX_KEY_SIZE, MAX_VALUE_SIZE, OFFSET_SIZE, PAGE_SIZE,
    POINTER_SIZE,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Separator keys with child pointers, no values.
    Internal,
    /// Keys with values.
    Leaf,
}

impl NodeKind {
    #[inline]
    pub fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            NODE_TYPE_INTERNAL => Some(Self::Internal),
            NODE_TYPE_LEAF => Some(Self::Leaf),
            _ => None,
        }
    }

    #[inline]
    pub fn tag(self) -> u16 {
        match self {
            Self::Internal => NODE_TYPE_INTERNAL,
            Self::Leaf => NODE_TYPE_LEAF,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Deref)]
pub struct Node {
    #[deref]
    page: Page,
}

impl Node {
    /// Creates an empty node buffer spanning `span` pages with the header already set.
    pub fn new(kind: NodeKind, num_keys: usize, span: usize) -> Self {
        let mut node = Node {
            page: Page::new(span),
        };
        node.set_header(kind, num_keys);
        node
    }

    /// Decodes a page read from storage.
    ///
    /// Pages aren't trusted: everything the accessors rely on is checked here so that they can't
    /// read out of bounds later. Key order is only checked if `verify_key_order` is set.
    pub fn from_page(page: Page, verify_key_order: bool) -> Result<Self, Error> {
        let node = Node { page };
        node.verify(verify_key_order)?;
        Ok(node)
    }

    fn verify(&self, verify_key_order: bool) -> Result<(), Error> {
        let kind = self.kind()?;
        let num_keys = self.num_keys();
        if num_keys == 0 {
            return Err(error_corruption!("Node has no keys"));
        }
        let head_size = Self::head_size(num_keys);
        let page_size = self.data().len();
        if head_size > page_size {
            return Err(error_corruption!(
                "Node with {num_keys} keys doesn't fit in {page_size} bytes"
            ));
        }
        let mut expected_offset = 0usize;
        for i in 0..num_keys {
            if self.offset_at(i) != expected_offset {
                return Err(error_corruption!(
                    "Bad offset for entry {i}: {} (expected {expected_offset})",
                    self.offset_at(i)
                ));
            }
            let pos = head_size + expected_offset;
            if pos + KV_HEADER_SIZE > page_size {
                return Err(error_corruption!("Entry {i} out of bounds"));
            }
            let kv_header = header_cast::<KvHeader>(&self.data()[pos..]);
            let (key_len, value_len) = (
                kv_header.key_len.get() as usize,
                kv_header.value_len.get() as usize,
            );
            if key_len > MAX_KEY_SIZE || value_len > MAX_VALUE_SIZE {
                return Err(error_corruption!(
                    "Entry {i} has key len {key_len} value len {value_len}"
                ));
            }
            if kind == NodeKind::Internal && value_len != 0 {
                return Err(error_corruption!("Internal node entry {i} has a value"));
            }
            if pos + kv_header.entry_len() > page_size {
                return Err(error_corruption!("Entry {i} out of bounds"));
            }
            expected_offset += kv_header.entry_len();
        }
        if self.offset_at(num_keys) != expected_offset {
            return Err(error_corruption!(
                "Bad end offset {} (expected {expected_offset})",
                self.offset_at(num_keys)
            ));
        }
        if verify_key_order {
            for i in 1..num_keys {
                if self.key_at(i - 1) >= self.key_at(i) {
                    return Err(error_corruption!(
                        "Keys out of order at {i}: {:?} >= {:?}",
                        EscapedBytes(self.key_at(i - 1)),
                        EscapedBytes(self.key_at(i))
                    ));
                }
            }
        }
        Ok(())
    }

    #[inline]
    fn header(&self) -> &NodeHeader {
        header_cast(self.page.data())
    }

    /// The node type, a corrupt tag is reported as an error.
    #[inline]
    pub fn kind(&self) -> Result<NodeKind, Error> {
        let tag = self.header().node_type.get();
        NodeKind::from_tag(tag).ok_or_else(|| error_corruption!("Bad node type {tag}"))
    }

    #[inline]
    pub fn num_keys(&self) -> usize {
        self.header().num_keys.get() as usize
    }

    pub fn set_header(&mut self, kind: NodeKind, num_keys: usize) {
        assert!(Self::head_size(num_keys) <= self.page.data().len());
        *header_cast_mut::<NodeHeader>(self.page.data_mut()) = NodeHeader {
            node_type: U16::new(kind.tag()),
            num_keys: U16::new(num_keys as u16),
        };
    }

    /// Size of the header plus the pointer and offset arrays.
    #[inline]
    fn head_size(num_keys: usize) -> usize {
        HEADER_SIZE + (POINTER_SIZE + OFFSET_SIZE) * num_keys
    }

    #[inline]
    pub fn pointer_at(&self, i: usize) -> PageId {
        assert!(i < self.num_keys(), "pointer {i} out of range");
        let pos = HEADER_SIZE + POINTER_SIZE * i;
        header_cast::<U64>(&self.page.data()[pos..]).get()
    }

    #[inline]
    pub fn set_pointer_at(&mut self, i: usize, child: PageId) {
        assert!(i < self.num_keys(), "pointer {i} out of range");
        let pos = HEADER_SIZE + POINTER_SIZE * i;
        header_cast_mut::<U64>(&mut self.page.data_mut()[pos..]).set(child);
    }

    #[inline]
    fn offset_pos(&self, i: usize) -> usize {
        debug_assert!(i >= 1 && i <= self.num_keys());
        HEADER_SIZE + POINTER_SIZE * self.num_keys() + OFFSET_SIZE * (i - 1)
    }

    /// Offset of entry `i` into the key-value region, `i` may be `num_keys()`.
    #[inline]
    pub(crate) fn offset_at(&self, i: usize) -> usize {
        assert!(i <= self.num_keys(), "offset {i} out of range");
        if i == 0 {
            return 0;
        }
        header_cast::<U16>(&self.page.data()[self.offset_pos(i)..]).get() as usize
    }

    #[inline]
    fn set_offset_at(&mut self, i: usize, offset: usize) {
        let pos = self.offset_pos(i);
        header_cast_mut::<U16>(&mut self.page.data_mut()[pos..]).set(offset as u16);
    }

    #[inline]
    fn kv_pos(&self, i: usize) -> usize {
        Self::head_size(self.num_keys()) + self.offset_at(i)
    }

    #[inline]
    fn kv_header(&self, i: usize) -> (usize, &KvHeader) {
        assert!(i < self.num_keys(), "entry {i} out of range");
        let pos = self.kv_pos(i);
        (pos, header_cast(&self.page.data()[pos..]))
    }

    #[inline]
    pub fn key_at(&self, i: usize) -> &[u8] {
        let (pos, kv_header) = self.kv_header(i);
        let start = pos + KV_HEADER_SIZE;
        &self.page.data()[start..][..kv_header.key_len.get() as usize]
    }

    #[inline]
    pub fn value_at(&self, i: usize) -> &[u8] {
        let (pos, kv_header) = self.kv_header(i);
        let start = pos + KV_HEADER_SIZE + kv_header.key_len.get() as usize;
        &self.page.data()[start..][..kv_header.value_len.get() as usize]
    }

    /// Encoded size of the node, what has to fit in a page.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.kv_pos(self.num_keys())
    }

    /// Writes entry `i`. Entries must be appended in order since the position of entry `i`
    /// comes from the offset written by the previous append.
    pub fn append_kv(&mut self, i: usize, pointer: PageId, key: &[u8], value: &[u8]) {
        debug_assert!(key.len() <= MAX_KEY_SIZE && value.len() <= MAX_VALUE_SIZE);
        self.set_pointer_at(i, pointer);
        let pos = self.kv_pos(i);
        let data = self.page.data_mut();
        *header_cast_mut::<KvHeader>(&mut data[pos..]) = KvHeader {
            key_len: U16::new(key.len() as u16),
            value_len: U16::new(value.len() as u16),
        };
        let key_start = pos + KV_HEADER_SIZE;
        data[key_start..][..key.len()].copy_from_slice(key);
        data[key_start + key.len()..][..value.len()].copy_from_slice(value);
        let next_offset = self.offset_at(i) + KV_HEADER_SIZE + key.len() + value.len();
        self.set_offset_at(i + 1, next_offset);
    }

    /// Copies `count` entries (pointer, key and value) of `src` starting at `src_start`.
    pub fn append_range(&mut self, src: &Node, dst_start: usize, src_start: usize, count: usize) {
        assert!(src_start + count <= src.num_keys());
        for i in 0..count {
            let (dst, src_i) = (dst_start + i, src_start + i);
            self.append_kv(dst, src.pointer_at(src_i), src.key_at(src_i), src.value_at(src_i));
        }
    }

    /// Binary search for `key`, `Ok` with its index if present, `Err` with the insertion point otherwise.
    pub fn search_keys(&self, key: &[u8]) -> Result<usize, usize> {
        let mut left = 0;
        let mut right = self.num_keys();
        while left < right {
            let mid = left + (right - left) / 2;
            match self.key_at(mid).cmp(key) {
                Ordering::Less => left = mid + 1,
                Ordering::Greater => right = mid,
                Ordering::Equal => return Ok(mid),
            }
        }
        Err(left)
    }

    /// Index of the last key `<= key`, i.e. the child whose range covers `key`.
    /// Saturates at 0, which the empty sentinel key makes exact in practice.
    #[inline]
    pub fn lookup_le(&self, key: &[u8]) -> usize {
        match self.search_keys(key) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        }
    }

    /// New leaf with `(key, value)` inserted at `idx`.
    pub fn leaf_insert(old: &Node, idx: usize, key: &[u8], value: &[u8]) -> Node {
        let mut new = Node::new(NodeKind::Leaf, old.num_keys() + 1, 2);
        new.append_range(old, 0, 0, idx);
        new.append_kv(idx, 0, key, value);
        new.append_range(old, idx + 1, idx, old.num_keys() - idx);
        new
    }

    /// New leaf with the entry at `idx` replaced by `(key, value)`.
    pub fn leaf_update(old: &Node, idx: usize, key: &[u8], value: &[u8]) -> Node {
        let mut new = Node::new(NodeKind::Leaf, old.num_keys(), 2);
        new.append_range(old, 0, 0, idx);
        new.append_kv(idx, 0, key, value);
        new.append_range(old, idx + 1, idx + 1, old.num_keys() - (idx + 1));
        new
    }

    /// New internal node with the child at `idx` replaced by `kids`, given as
    /// `(page id, first key)` in key order.
    pub fn replace_children(old: &Node, idx: usize, kids: &[(PageId, &[u8])]) -> Node {
        debug_assert!(!kids.is_empty());
        let inc = kids.len();
        let mut new = Node::new(NodeKind::Internal, old.num_keys() + inc - 1, 2);
        new.append_range(old, 0, 0, idx);
        for (i, &(child, key)) in kids.iter().enumerate() {
            new.append_kv(idx + i, child, key, b"");
        }
        new.append_range(old, idx + inc, idx + 1, old.num_keys() - (idx + 1));
        new
    }

    /// Shrinks the buffer to a single page, the node must fit.
    pub fn finalize(&mut self) {
        assert!(self.byte_size() <= PAGE_SIZE, "node doesn't fit in a page");
        self.page.shrink_to_page();
    }

    pub fn into_page(self) -> Page {
        self.page
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut df = f.debug_struct("Node");
        df.field("page", &self.page);
        let kind = self.kind();
        df.field("kind", &kind);
        let Ok(kind) = kind else {
            return df.finish();
        };
        df.field("byte_size", &self.byte_size());
        for i in 0..self.num_keys() {
            if kind == NodeKind::Internal {
                df.field(
                    &format!("kp {i}"),
                    &(EscapedBytes(self.key_at(i)), self.pointer_at(i)),
                );
            } else {
                df.field(
                    &format!("kv {i}"),
                    &(EscapedBytes(self.key_at(i)), EscapedBytes(self.value_at(i))),
                );
            }
        }
        df.finish()
    }
}
