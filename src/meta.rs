use std::{io, path::Path};

use zerocopy::{
    byteorder::little_endian::{U32, U64},
    FromBytes, IntoBytes,
};

use crate::{
    error::error_corruption,
    fs::write_file_atomic,
    options::WriteOptions,
    repr::{PageId, RootRecordRepr, ROOT_RECORD_MAGIC},
    Error,
};

/// The committed root of a tree, stored in a small checksummed file.
///
/// Saving goes through [write_file_atomic], so a reader observes either the previous record or
/// the new one. `generation` is incremented by the caller on every commit.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RootRecord {
    pub root: PageId,
    pub generation: u64,
}

impl RootRecord {
    pub const ENCODED_LEN: usize = std::mem::size_of::<RootRecordRepr>();

    fn checksum(repr: &RootRecordRepr) -> u32 {
        let bytes = &repr.as_bytes()[..Self::ENCODED_LEN - std::mem::size_of::<U32>()];
        match xxhash_rust::xxh3::xxh3_64(bytes) as u32 {
            0 => !0,
            c => c,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut repr = RootRecordRepr {
            magic: U64::new(ROOT_RECORD_MAGIC),
            root: U64::new(self.root),
            generation: U64::new(self.generation),
            checksum: U32::ZERO,
        };
        repr.checksum.set(Self::checksum(&repr));
        repr.as_bytes().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        let Ok(repr) = RootRecordRepr::read_from_bytes(bytes) else {
            return Err(error_corruption!(
                "Root record has {} bytes, expected {}",
                bytes.len(),
                Self::ENCODED_LEN
            ));
        };
        if repr.magic.get() != ROOT_RECORD_MAGIC {
            return Err(error_corruption!("Bad root record magic {:#x}", repr.magic.get()));
        }
        let checksum = Self::checksum(&repr);
        if repr.checksum.get() != checksum {
            return Err(error_corruption!(
                "Root record checksum mismatch {:#x} (expected {checksum:#x})",
                repr.checksum.get()
            ));
        }
        Ok(Self {
            root: repr.root.get(),
            generation: repr.generation.get(),
        })
    }

    pub fn save(&self, path: &Path, options: &WriteOptions) -> Result<(), Error> {
        trace!("Saving {self:?} to {}", path.display());
        write_file_atomic(path, &self.encode(), options)
    }

    /// Loads the record at `path`, `None` if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, Error> {
        match std::fs::read(path) {
            Ok(bytes) => Self::decode(&bytes).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fail_scenario;

    #[test]
    fn encode_decode() {
        let record = RootRecord {
            root: 1234,
            generation: 7,
        };
        let bytes = record.encode();
        assert_eq!(bytes.len(), RootRecord::ENCODED_LEN);
        assert_eq!(bytes.len(), 28);
        assert_eq!(&bytes[..8], &ROOT_RECORD_MAGIC.to_le_bytes());
        assert_eq!(&bytes[8..16], &1234u64.to_le_bytes());
        assert_eq!(RootRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn decode_rejects_damage() {
        let bytes = RootRecord {
            root: 99,
            generation: 3,
        }
        .encode();
        for i in 0..bytes.len() {
            let mut damaged = bytes.clone();
            damaged[i] ^= 0x10;
            let err = RootRecord::decode(&damaged).unwrap_err();
            assert!(err.is_corruption(), "byte {i}: {err}");
        }
        assert!(RootRecord::decode(&bytes[..27]).unwrap_err().is_corruption());
        assert!(RootRecord::decode(&[]).unwrap_err().is_corruption());
    }

    #[test]
    fn save_load() {
        let _scenario = fail_scenario(&[]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ROOT");
        assert_eq!(RootRecord::load(&path).unwrap(), None);

        let mut record = RootRecord {
            root: 5,
            generation: 1,
        };
        record.save(&path, &WriteOptions::default()).unwrap();
        assert_eq!(RootRecord::load(&path).unwrap(), Some(record));

        record.root = 9;
        record.generation += 1;
        record.save(&path, &WriteOptions::default()).unwrap();
        assert_eq!(RootRecord::load(&path).unwrap(), Some(record));

        std::fs::write(&path, b"garbage").unwrap();
        assert!(RootRecord::load(&path).unwrap_err().is_corruption());
    }

    #[test]
    fn failed_save_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ROOT");
        let record = RootRecord {
            root: 5,
            generation: 1,
        };
        {
            let _scenario = fail_scenario(&[]);
            record.save(&path, &WriteOptions::default()).unwrap();
        }
        let _scenario = fail_scenario(&[("frename", "return")]);
        let next = RootRecord {
            root: 6,
            generation: 2,
        };
        assert!(next.save(&path, &WriteOptions::default()).is_err());
        assert_eq!(RootRecord::load(&path).unwrap(), Some(record));
    }
}
