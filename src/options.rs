use crate::error::{error_validation, Error};

/// Options for a [crate::BTree]
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TreeOptions {
    /// Whether to also check that keys are strictly ascending when decoding pages read from the
    /// [crate::PageStore]. Structural checks (lengths, offsets and bounds) are always performed.
    ///
    /// Enabling this makes every page read proportional to the number of keys in the page.
    ///
    /// Default: `false`
    pub verify_key_order: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            verify_key_order: false,
        }
    }
}

impl TreeOptions {
    /// A new default TreeOptions
    pub fn new() -> Self {
        Self::default()
    }
}

/// Options for [crate::write_file_direct] and [crate::write_file_atomic]
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct WriteOptions {
    /// Disables all calls to `fsync`.
    ///
    /// Use cases include speeding up tests or throw away files.
    ///
    /// Default: `false`
    pub disable_fsync: bool,
    /// Whether to also `fsync` the parent directory after an atomic write, which makes the rename
    /// itself durable. Without it a crash shortly after the write may expose the previous contents.
    ///
    /// Default: `false`
    pub sync_dir: bool,
    /// Permission bits of newly created files. Only used on unix.
    ///
    /// Default: `0o664`
    pub file_mode: u32,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            disable_fsync: false,
            sync_dir: false,
            file_mode: 0o664,
        }
    }
}

impl WriteOptions {
    /// A new default WriteOptions
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.file_mode & !0o7777 != 0 {
            return Err(error_validation!(
                "file_mode {:#o} has bits outside 0o7777",
                self.file_mode
            ));
        }
        Ok(())
    }
}
