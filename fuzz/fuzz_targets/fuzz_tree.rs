#![no_main]
use arbitrary::Arbitrary;
use cowbtree::{utils::EscapedBytes, BTree, Error, MemPageStore, PageStore, MAX_KEY_SIZE, NULL_PAGE};
use libfuzzer_sys::fuzz_target;
use std::collections::BTreeMap;

#[macro_use]
extern crate log;

#[derive(Clone, Default, PartialEq, PartialOrd, Eq, Ord, Hash)]
struct BytesN<const MIN: usize, const MAX: usize>(Vec<u8>);

impl<const MIN: usize, const MAX: usize> std::fmt::Debug for BytesN<MIN, MAX> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{:?}`", &EscapedBytes(&self.0))
    }
}

impl<'a, const MIN: usize, const MAX: usize> Arbitrary<'a> for BytesN<MIN, MAX> {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let prefix_len = u.int_in_range(MIN.min(8) as u8..=MAX.min(8) as u8)? as usize;
        let mut bytes = Vec::with_capacity(prefix_len);
        for _ in 0..prefix_len {
            bytes.push(u.int_in_range(b'a'..=b'd')?);
        }
        // long tails make entries big enough to split nodes with few operations
        let len = u.int_in_range(MIN as u16..=MAX as u16)? as usize;
        bytes.resize(len.max(prefix_len), 0);
        Ok(BytesN(bytes))
    }

    fn size_hint(depth: usize) -> (usize, Option<usize>) {
        arbitrary::size_hint::and(
            <u8 as Arbitrary>::size_hint(depth),
            <u16 as Arbitrary>::size_hint(depth),
        )
    }
}

type Key = BytesN<0, MAX_KEY_SIZE>;
// slightly over the value limit to exercise validation
type Value = BytesN<0, 3010>;

#[derive(Debug, Arbitrary)]
enum Op {
    Insert(Key, Value),
    Update(usize, Value),
    Get(Key),
    Validate,
}

#[derive(Debug)]
struct Input {
    free_old_roots: bool,
    ops: Vec<Op>,
}

impl<'a> Arbitrary<'a> for Input {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(Input {
            free_old_roots: u.arbitrary()?,
            ops: u.arbitrary_iter()?.collect::<Result<_, _>>()?,
        })
    }
}

fuzz_target!(|input: Input| {
    let _ = env_logger::try_init();
    let mut tree = BTree::new(MemPageStore::default());
    let mut model = BTreeMap::<Vec<u8>, Vec<u8>>::new();
    for op in input.ops {
        debug!("{op:?}");
        let (key, value) = match op {
            Op::Insert(key, value) => (key.0, value.0),
            Op::Update(idx, value) => {
                let Some(key) = model.keys().nth(idx % model.len().max(1)).cloned() else {
                    continue;
                };
                (key, value.0)
            }
            Op::Get(key) => {
                assert_eq!(tree.get(&key.0).unwrap().as_ref(), model.get(&key.0));
                continue;
            }
            Op::Validate => {
                let reachable = tree.validate().unwrap();
                if input.free_old_roots {
                    assert_eq!(reachable, tree.store().len());
                }
                continue;
            }
        };
        match tree.insert(&key, &value) {
            Ok(old_root) => {
                if input.free_old_roots && old_root != NULL_PAGE {
                    tree.store_mut().free(old_root).unwrap();
                }
                model.insert(key, value);
            }
            Err(Error::Validation(_)) => {
                assert!(key.is_empty() || value.len() > cowbtree::MAX_VALUE_SIZE);
            }
            Err(e) => panic!("{e}"),
        }
    }
    tree.validate().unwrap();
    let entries = tree.entries().unwrap();
    assert_eq!(entries, model.into_iter().collect::<Vec<_>>());
});
