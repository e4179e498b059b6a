use zerocopy::{
    byteorder::little_endian::{U16, U32, U64},
    FromBytes, Immutable, IntoBytes, KnownLayout, Ref, Unaligned,
};

pub type PageId = u64;

/// Root id of an empty tree. Page stores never hand it out.
pub const NULL_PAGE: PageId = 0;

pub const ROOT_RECORD_MAGIC: u64 = 0x3C0B_7EE0_5A1D_C0DE;

pub const NODE_TYPE_INTERNAL: u16 = 1;
pub const NODE_TYPE_LEAF: u16 = 2;

/// | type | nkeys |  pointers  |   offsets  | key-values | unused |
/// |  2B  |   2B  | nkeys * 8B | nkeys * 2B |     ...    |        |
#[derive(Default, Copy, Clone, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct NodeHeader {
    pub node_type: U16,
    pub num_keys: U16,
}

/// | klen | vlen | key | val |
/// |  2B  |  2B  | ... | ... |
#[derive(Default, Copy, Clone, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct KvHeader {
    pub key_len: U16,
    pub value_len: U16,
}

impl KvHeader {
    #[inline]
    pub fn entry_len(&self) -> usize {
        crate::KV_HEADER_SIZE + self.key_len.get() as usize + self.value_len.get() as usize
    }
}

#[derive(Default, Copy, Clone, Debug, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct RootRecordRepr {
    pub magic: U64,
    pub root: U64,
    pub generation: U64,
    /// xxh3 of all the preceding fields, truncated
    pub checksum: U32,
}

/// Casts the start of `bytes` to `T`, panics if `bytes` is too short.
#[inline(always)]
pub(crate) fn header_cast<T: FromBytes + KnownLayout + Immutable + Unaligned>(bytes: &[u8]) -> &T {
    Ref::into_ref(Ref::<_, T>::from_prefix(bytes).unwrap().0)
}

#[inline(always)]
pub(crate) fn header_cast_mut<T: FromBytes + IntoBytes + KnownLayout + Immutable + Unaligned>(
    bytes: &mut [u8],
) -> &mut T {
    Ref::into_mut(Ref::<_, T>::from_prefix(bytes).unwrap().0)
}
