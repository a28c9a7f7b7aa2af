//! File helpers shared by the ledger, the page file and the log.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// `base` with `suffix` appended to the file name (`db` + `.log` = `db.log`).
pub fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Create a new read/write file.
///
/// # Errors
/// `Error::FileExists` if something is already at `path`.
pub fn create_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => Error::FileExists(path.to_path_buf()),
            _ => Error::Io(e),
        })
}

/// Open an existing file for reading and writing.
///
/// # Errors
/// `Error::FileNotExists` if nothing is at `path`.
pub fn open_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::FileNotExists(path.to_path_buf()),
            _ => Error::Io(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_with_suffix() {
        let path = with_suffix(Path::new("/tmp/mydb"), ".log");
        assert_eq!(path, PathBuf::from("/tmp/mydb.log"));
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.db");

        create_file(&path).unwrap();
        assert!(matches!(create_file(&path), Err(Error::FileExists(p)) if p == path));
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.db");

        assert!(matches!(open_file(&path), Err(Error::FileNotExists(_))));
    }
}
