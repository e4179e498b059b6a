//! Copy-on-write B+tree core.
//!
//! Keys and values are byte strings stored in fixed size pages of [PAGE_SIZE] bytes.
//! Pages are never modified in place: every insert builds new nodes from the old ones,
//! hands them to a [PageStore], frees the superseded children and finally installs a new
//! root page id on the [BTree]. Persisting a committed root is done by the caller,
//! usually with a [RootRecord] written through [write_file_atomic].
//!
//! ```
//! use cowbtree::{BTree, MemPageStore};
//!
//! let mut tree = BTree::new(MemPageStore::default());
//! tree.insert(b"foo", b"bar").unwrap();
//! assert_eq!(tree.get(b"foo").unwrap().as_deref(), Some(&b"bar"[..]));
//! ```
#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate log;

mod error;
mod fs;
mod meta;
pub mod node;
mod options;
mod page;
mod repr;
pub mod split;
mod store;
mod tree;
pub mod utils;


pub use error::Error;
pub use fs::{sync_dir, write_file_atomic, write_file_direct};
pub use meta::RootRecord;
pub use node::{Node, NodeKind};
pub use options::{TreeOptions, WriteOptions};
pub use page::Page;
pub use repr::{PageId, NULL_PAGE};
pub use store::{MemPageStore, PageStore};
pub use tree::BTree;

type HashMap<K, V> = hashbrown::HashMap<K, V, foldhash::fast::RandomState>;

/// Size of every stored page, in bytes.
pub const PAGE_SIZE: usize = 4096;
/// Size of the node header (type tag + key count), in bytes.
pub const HEADER_SIZE: usize = 4;
/// Largest accepted key.
pub const MAX_KEY_SIZE: usize = 1000;
/// Largest accepted value.
pub const MAX_VALUE_SIZE: usize = 3000;

pub(crate) const POINTER_SIZE: usize = std::mem::size_of::<u64>();
pub(crate) const OFFSET_SIZE: usize = std::mem::size_of::<u16>();
pub(crate) const KV_HEADER_SIZE: usize = 2 * std::mem::size_of::<u16>();

// A branch with a single maximum sized separator must fit in a page.
const _: () =
    assert!(HEADER_SIZE + POINTER_SIZE + OFFSET_SIZE + KV_HEADER_SIZE + MAX_KEY_SIZE <= PAGE_SIZE);
// Same for a leaf holding a single maximum sized pair, otherwise splitting wouldn't terminate.
const _: () = assert!(
    HEADER_SIZE + POINTER_SIZE + OFFSET_SIZE + KV_HEADER_SIZE + MAX_KEY_SIZE + MAX_VALUE_SIZE
        <= PAGE_SIZE
);
// Offsets are u16 and working nodes may temporarily take 2 pages.
const _: () = assert!(2 * PAGE_SIZE <= u16::MAX as usize);
const _: () = assert!(HEADER_SIZE == std::mem::size_of::<repr::NodeHeader>());
const _: () = assert!(KV_HEADER_SIZE == std::mem::size_of::<repr::KvHeader>());
