//! Whole file writers used to persist small files such as the [crate::RootRecord].
use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
};

use crate::{
    error::error_validation,
    options::WriteOptions,
    utils::{ByteSize, FnTrap},
    Error,
};

/// Writes `data` to `path` in place, creating or truncating it.
///
/// This isn't crash safe: a crash midway may leave the file truncated or partially written.
pub fn write_file_direct(path: &Path, data: &[u8], options: &WriteOptions) -> Result<(), Error> {
    options.validate()?;
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    let file = open_file(&mut opts, path, options)?;
    write_and_sync(file, data, options)?;
    debug!("Wrote {} directly to {}", ByteSize(data.len() as u64), path.display());
    Ok(())
}

/// Atomically replaces `path` with `data`.
///
/// The data is written and fsynced into a uniquely named sibling file, which is then renamed
/// over `path`. Readers observe either the previous contents or the new ones. On failures before
/// the rename `path` is untouched and the temporary file is removed.
///
/// If [WriteOptions::sync_dir] is set the parent directory is also fsynced, an error there is
/// returned even though `path` was already replaced.
pub fn write_file_atomic(path: &Path, data: &[u8], options: &WriteOptions) -> Result<(), Error> {
    options.validate()?;
    let tmp_path = temp_path(path)?;
    let mut opts = fs::OpenOptions::new();
    // fails if the temporary file exists, e.g. another writer picked the same name
    opts.write(true).create_new(true);
    let file = open_file(&mut opts, &tmp_path, options)?;
    let cleanup = FnTrap::new(|| {
        if let Err(e) = fs::remove_file(&tmp_path) {
            warn!(
                "Failed to remove temporary file {}: {e}",
                tmp_path.display()
            );
        }
    });
    write_and_sync(file, data, options)?;
    rename(&tmp_path, path)?;
    cleanup.disarm();
    debug!("Wrote {} atomically to {}", ByteSize(data.len() as u64), path.display());

    if options.sync_dir && !options.disable_fsync {
        sync_dir(parent_dir(path))?;
    }
    Ok(())
}

/// Fsyncs a directory, which makes changes to its entries (e.g. renames) durable.
pub fn sync_dir(path: &Path) -> io::Result<()> {
    fail::fail_point!("fsync", |s| Err(io::Error::new(
        io::ErrorKind::Other,
        format!("failpoint fsync {:?}", s)
    )));
    #[cfg(unix)]
    {
        // On unix directory opens must be read only.
        File::open(path)?.sync_all()
    }
    #[cfg(not(unix))]
    {
        // On windows we must use FILE_FLAG_BACKUP_SEMANTICS to get a handle to the file
        // From: https://docs.microsoft.com/en-us/windows/win32/api/fileapi/nf-fileapi-createfilea
        const FILE_FLAG_BACKUP_SEMANTICS: u32 = 0x02000000;
        use std::os::windows::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(FILE_FLAG_BACKUP_SEMANTICS)
            .open(path)?
            .sync_all()
    }
}

/// `<name>.tmp.<random>` in the same directory as `path`, so the final rename doesn't cross
/// filesystems.
fn temp_path(path: &Path) -> Result<PathBuf, Error> {
    let Some(file_name) = path.file_name() else {
        return Err(error_validation!("Path {} has no file name", path.display()));
    };
    let mut tmp_name = OsString::from(file_name);
    tmp_name.push(format!(".tmp.{}", rand::random::<u64>()));
    Ok(path.with_file_name(tmp_name))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[allow(unused_variables)]
fn open_file(opts: &mut fs::OpenOptions, path: &Path, options: &WriteOptions) -> io::Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(options.file_mode);
    }
    opts.open(path)
}

/// Takes ownership of the file so it's closed once this returns.
fn write_and_sync(mut file: File, data: &[u8], options: &WriteOptions) -> io::Result<()> {
    fail::fail_point!("fwrite", |s| Err(io::Error::new(
        io::ErrorKind::Other,
        format!("failpoint fwrite {:?}", s)
    )));
    file.write_all(data)?;
    if !options.disable_fsync {
        fail::fail_point!("fsync", |s| Err(io::Error::new(
            io::ErrorKind::Other,
            format!("failpoint fsync {:?}", s)
        )));
        file.sync_all()?;
    }
    Ok(())
}

fn rename(from: &Path, to: &Path) -> io::Result<()> {
    fail::fail_point!("frename", |s| Err(io::Error::new(
        io::ErrorKind::Other,
        format!("failpoint frename {:?}", s)
    )));
    fs::rename(from, to)
}
