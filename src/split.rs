//! Splitting of oversized working nodes into page sized siblings.
use smallvec::SmallVec;

use crate::{
    error::error_corruption,
    node::Node,
    Error, HEADER_SIZE, OFFSET_SIZE, PAGE_SIZE, POINTER_SIZE,
};

/// Splits `old` in two, the right node always fits in a page while the left one may not.
///
/// The split point starts at the middle and moves left until the left half fits, then right
/// until the right half fits.
pub fn split2(old: &Node) -> Result<(Node, Node), Error> {
    let num_keys = old.num_keys();
    if num_keys < 2 {
        return Err(error_corruption!("Can't split a node with {num_keys} keys"));
    }
    let kind = old.kind()?;
    let left_bytes = |nleft: usize| {
        HEADER_SIZE + (POINTER_SIZE + OFFSET_SIZE) * nleft + old.offset_at(nleft)
    };
    let right_bytes = |nleft: usize| old.byte_size() - left_bytes(nleft) + HEADER_SIZE;

    let mut nleft = num_keys / 2;
    while nleft > 0 && left_bytes(nleft) > PAGE_SIZE {
        nleft -= 1;
    }
    while nleft < num_keys && right_bytes(nleft) > PAGE_SIZE {
        nleft += 1;
    }
    if nleft == 0 || nleft >= num_keys {
        return Err(error_corruption!(
            "No valid split point for node with {num_keys} keys and {} bytes",
            old.byte_size()
        ));
    }

    let nright = num_keys - nleft;
    let mut right = Node::new(kind, nright, 1);
    right.append_range(old, 0, nleft, nright);
    let mut left = Node::new(kind, nleft, 2);
    left.append_range(old, 0, 0, nleft);
    debug_assert!(right.byte_size() <= PAGE_SIZE);
    trace!(
        "split2 {num_keys} keys {} bytes into {nleft} keys {} bytes and {nright} keys {} bytes",
        old.byte_size(),
        left.byte_size(),
        right.byte_size()
    );
    Ok((left, right))
}

/// Splits `old` into 1 to 3 nodes, in key order, each finalized to a single page.
///
/// A node that already fits is returned unchanged.
pub fn split3(mut old: Node) -> Result<SmallVec<Node, 3>, Error> {
    let mut result = SmallVec::new();
    if old.byte_size() <= PAGE_SIZE {
        old.finalize();
        result.push(old);
        return Ok(result);
    }

    let (mut left, right) = split2(&old)?;
    if left.byte_size() <= PAGE_SIZE {
        left.finalize();
        result.push(left);
        result.push(right);
        return Ok(result);
    }

    let (mut leftleft, middle) = split2(&left)?;
    if leftleft.byte_size() > PAGE_SIZE {
        return Err(error_corruption!(
            "Node with {} bytes doesn't fit in 3 pages",
            old.byte_size()
        ));
    }
    trace!("split3 {} bytes into 3 nodes", old.byte_size());
    leftleft.finalize();
    result.push(leftleft);
    result.push(middle);
    result.push(right);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeKind, MAX_KEY_SIZE, MAX_VALUE_SIZE};
    use proptest::prelude::*;

    /// Builds a 2 page leaf with entries of the given key and value lengths.
    /// Keys are the big endian index followed by padding so they sort by index.
    fn leaf(lens: &[(usize, usize)]) -> Node {
        let mut node = Node::new(NodeKind::Leaf, lens.len(), 2);
        for (i, &(key_len, value_len)) in lens.iter().enumerate() {
            let mut key = (i as u32).to_be_bytes().to_vec();
            key.resize(key_len.max(4), b'k');
            node.append_kv(i, 0, &key, &vec![b'v'; value_len]);
        }
        node
    }

    fn all_keys(nodes: &[Node]) -> Vec<Vec<u8>> {
        nodes
            .iter()
            .flat_map(|n| (0..n.num_keys()).map(|i| n.key_at(i).to_vec()))
            .collect()
    }

    fn check_split(old: &Node, split: &[Node]) {
        assert!(!split.is_empty() && split.len() <= 3);
        for node in split {
            assert!(node.byte_size() <= PAGE_SIZE);
            assert_eq!(node.span(), 1);
            assert_eq!(node.kind().unwrap(), old.kind().unwrap());
            assert!(node.num_keys() >= 1);
        }
        assert_eq!(all_keys(split), all_keys(std::slice::from_ref(old)));
    }

    #[test]
    fn fitting_node_is_kept() {
        let old = leaf(&[(4, 10), (4, 20), (4, 30)]);
        let split = split3(old.clone()).unwrap();
        assert_eq!(split.len(), 1);
        check_split(&old, &split);
        assert_eq!(split[0].byte_size(), old.byte_size());
    }

    #[test]
    fn two_way() {
        let old = leaf(&[(4, 2000), (4, 2000), (4, 2000)]);
        assert!(old.byte_size() > PAGE_SIZE);
        let (left, right) = split2(&old).unwrap();
        assert_eq!((left.num_keys(), right.num_keys()), (1, 2));
        let split = split3(old.clone()).unwrap();
        assert_eq!(split.len(), 2);
        check_split(&old, &split);
    }

    #[test]
    fn three_way() {
        // a maximum sized entry between two big ones can't share a page with either
        let max = (MAX_KEY_SIZE, MAX_VALUE_SIZE);
        let old = leaf(&[(4, 2000), max, (4, 2000)]);
        let (left, right) = split2(&old).unwrap();
        assert_eq!((left.num_keys(), right.num_keys()), (2, 1));
        assert!(left.byte_size() > PAGE_SIZE);
        let split = split3(old.clone()).unwrap();
        assert_eq!(split.len(), 3);
        check_split(&old, &split);
        assert_eq!(split.iter().map(|n| n.num_keys()).collect::<Vec<_>>(), [1, 1, 1]);
    }

    fn pointers(nodes: &[Node]) -> Vec<u64> {
        nodes
            .iter()
            .flat_map(|n| (0..n.num_keys()).map(|i| n.pointer_at(i)))
            .collect()
    }

    #[test]
    fn internal_nodes() {
        let mut old = Node::new(NodeKind::Internal, 300, 2);
        for i in 0..300 {
            old.append_kv(i, i as u64 + 1, &(i as u32).to_be_bytes(), b"");
        }
        assert_eq!(old.byte_size(), 5404);
        let split = split3(old.clone()).unwrap();
        assert_eq!(split.len(), 2);
        assert_eq!((split[0].num_keys(), split[1].num_keys()), (150, 150));
        check_split(&old, &split);
        assert_eq!(pointers(&split), (1..=300).collect::<Vec<_>>());
    }

    #[test]
    fn internal_three_way() {
        // sentinel, 5 maximum sized separators and 59 small ones
        let max_key = |tag: u8| {
            let mut key = vec![1, tag];
            key.resize(MAX_KEY_SIZE, 0);
            key
        };
        let mut keys = vec![Vec::new()];
        keys.extend([10, 20, 30, 40, 50].map(max_key));
        keys.extend((0..59u8).map(|i| vec![2, 0, 0, i]));
        let mut old = Node::new(NodeKind::Internal, keys.len(), 2);
        for (i, key) in keys.iter().enumerate() {
            old.append_kv(i, i as u64 + 1, key, b"");
        }

        // the child behind separator 30 split into 3
        let kids = [(100, max_key(30)), (101, max_key(31)), (102, max_key(32))];
        let kids = kids
            .iter()
            .map(|(ptr, key)| (*ptr, &key[..]))
            .collect::<Vec<(u64, &[u8])>>();
        let new = Node::replace_children(&old, 3, &kids);
        assert_eq!(new.num_keys(), 67);
        assert_eq!(new.byte_size(), 8178);

        let (left, right) = split2(&new).unwrap();
        assert!(left.byte_size() > PAGE_SIZE);
        assert!(right.byte_size() <= PAGE_SIZE);
        let split = split3(new.clone()).unwrap();
        assert_eq!(split.len(), 3);
        check_split(&new, &split);
        let mut expected = vec![1, 2, 3, 100, 101, 102];
        expected.extend(5..=65);
        assert_eq!(pointers(&split), expected);
        assert_eq!(pointers(std::slice::from_ref(&new)), expected);
    }

    #[test]
    fn split2_needs_two_keys() {
        let old = leaf(&[(4, 10)]);
        assert!(split2(&old).unwrap_err().is_corruption());
    }

    proptest! {
        #[test]
        fn split3_covers_input(
            lens in prop::collection::vec((4usize..=MAX_KEY_SIZE, 0usize..=MAX_VALUE_SIZE), 1..200),
            extra in (4usize..=MAX_KEY_SIZE, 0usize..=MAX_VALUE_SIZE),
            extra_at in any::<prop::sample::Index>(),
        ) {
            // a fitting node plus one more entry, like the ones produced by inserts
            let mut fitting = Vec::new();
            for len in lens {
                fitting.push(len);
                if leaf(&fitting).byte_size() > PAGE_SIZE {
                    fitting.pop();
                    break;
                }
            }
            fitting.insert(extra_at.index(fitting.len() + 1), extra);
            let old = leaf(&fitting);
            let split = split3(old.clone()).unwrap();
            check_split(&old, &split);
            prop_assert_eq!(split.len() == 1, old.byte_size() <= PAGE_SIZE);
        }
    }
}
