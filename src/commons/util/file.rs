use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::trace;
use tempfile::NamedTempFile;

use crate::commons::error::CaIoError;

pub fn create_dir(dir: &Path) -> Result<(), CaIoError> {
    if !dir.is_dir() {
        fs::create_dir_all(dir).map_err(|e| CaIoError::for_path("could not create dir", dir, e))?;
    }
    Ok(())
}

/// Who may read a saved file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visibility {
    /// Readable by the owner only.
    Private,

    /// Readable by everyone.
    Public,
}

/// Saves a file, replacing any existing file at the path.
///
/// The content goes to a temporary file in the target directory first
/// which is then renamed into place, so readers never see a half-written
/// file even if the process stops mid-write.
pub fn save(content: &[u8], full_path: &Path, visibility: Visibility) -> Result<(), CaIoError> {
    let tmp_file = write_tmp(content, full_path, visibility)?;
    tmp_file.persist(full_path).map_err(|e| {
        CaIoError::new(
            format!(
                "Cannot rename temp file {} to {}",
                e.file.path().display(),
                full_path.display()
            ),
            e.error,
        )
    })?;

    trace!("Saved file: {}", full_path.display());
    Ok(())
}

/// Saves several files, replacing any existing files at their paths.
///
/// Every file is written to a temporary file before the first one is
/// renamed into place. If any content cannot be written, no file is
/// changed.
pub fn save_all(files: &[(&[u8], &Path)], visibility: Visibility) -> Result<(), CaIoError> {
    let mut staged = Vec::with_capacity(files.len());
    for (content, full_path) in files {
        staged.push((write_tmp(content, full_path, visibility)?, *full_path));
    }

    for (tmp_file, full_path) in staged {
        tmp_file.persist(full_path).map_err(|e| {
            CaIoError::new(
                format!(
                    "Cannot rename temp file {} to {}",
                    e.file.path().display(),
                    full_path.display()
                ),
                e.error,
            )
        })?;
        trace!("Saved file: {}", full_path.display());
    }
    Ok(())
}

/// Saves a file that must not exist yet.
pub fn save_new(content: &[u8], full_path: &Path, visibility: Visibility) -> Result<(), CaIoError> {
    let tmp_file = write_tmp(content, full_path, visibility)?;
    tmp_file.persist_noclobber(full_path).map_err(|e| {
        CaIoError::new(format!("Cannot create new file {}", full_path.display()), e.error)
    })?;

    trace!("Saved new file: {}", full_path.display());
    Ok(())
}

fn write_tmp(content: &[u8], full_path: &Path, visibility: Visibility) -> Result<NamedTempFile, CaIoError> {
    let dir = match full_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    create_dir(&dir)?;

    let mut tmp_file = NamedTempFile::new_in(&dir).map_err(|e| {
        CaIoError::new(
            format!(
                "Issue creating tmp file for {}. Check permissions and space on disk.",
                full_path.display()
            ),
            e,
        )
    })?;

    tmp_file
        .as_file_mut()
        .write_all(content)
        .and_then(|_| tmp_file.as_file().sync_all())
        .map_err(|e| {
            CaIoError::new(
                format!(
                    "Issue writing tmp file {} for {}. Check permissions and space on disk.",
                    tmp_file.path().display(),
                    full_path.display()
                ),
                e,
            )
        })?;

    set_visibility(tmp_file.path(), visibility)?;
    Ok(tmp_file)
}

#[cfg(unix)]
fn set_visibility(path: &Path, visibility: Visibility) -> Result<(), CaIoError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = match visibility {
        Visibility::Private => 0o600,
        Visibility::Public => 0o644,
    };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| CaIoError::for_path("Could not set permissions on", path, e))
}

#[cfg(not(unix))]
fn set_visibility(_path: &Path, _visibility: Visibility) -> Result<(), CaIoError> {
    Ok(())
}

/// Reads a file to bytes.
pub fn read(path: &Path) -> Result<Vec<u8>, CaIoError> {
    fs::read(path).map_err(|e| CaIoError::for_path("Could not read", path, e))
}

/// Reads a file to bytes, returns `None` if there is no such file.
pub fn read_opt(path: &Path) -> Result<Option<Vec<u8>>, CaIoError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CaIoError::for_path("Could not read", path, e)),
    }
}

/// Moves a file within the same file system.
pub fn move_file(from: &Path, to: &Path) -> Result<(), CaIoError> {
    trace!("Moving file: {} -> {}", from.display(), to.display());
    fs::rename(from, to).map_err(|e| {
        CaIoError::new(
            format!("Could not move {} to {}", from.display(), to.display()),
            e,
        )
    })
}

/// Deletes a file, but does not touch the parent directories.
pub fn delete_file(full_path: &Path) -> Result<(), CaIoError> {
    trace!("Removing file: {}", full_path.display());
    fs::remove_file(full_path).map_err(|e| CaIoError::for_path("Could not remove file", full_path, e))
}

/// Returns the names of all files in a directory ending in `suffix`.
///
/// A missing directory is treated as empty. The names come back in no
/// particular order.
pub fn list_files(dir: &Path, suffix: &str) -> Result<Vec<String>, CaIoError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CaIoError::for_path("Could not read directory", dir, e)),
    };

    let mut res = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CaIoError::for_path("Could not read directory", dir, e))?;
        let is_file = entry
            .file_type()
            .map_err(|e| CaIoError::for_path("Could not read directory", dir, e))?
            .is_file();
        if !is_file {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            if name.ends_with(suffix) {
                res.push(name);
            }
        }
    }
    Ok(res)
}

//------------ Tests ---------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commons::test;

    #[test]
    fn save_replaces_and_save_new_refuses() {
        test::test_under_tmp(|dir| {
            let path = dir.join("sub/file.txt");
            save(b"one", &path, Visibility::Public).unwrap();
            save(b"two", &path, Visibility::Public).unwrap();
            assert_eq!(read(&path).unwrap(), b"two");

            let err = save_new(b"three", &path, Visibility::Public).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
            assert_eq!(read(&path).unwrap(), b"two");
        });
    }

    #[test]
    fn save_all_changes_nothing_unless_all_can_be_written() {
        test::test_under_tmp(|dir| {
            let first = dir.join("first.pem");
            let second = dir.join("second.der");
            save(b"old", &first, Visibility::Public).unwrap();

            save(b"", &dir.join("blocker"), Visibility::Public).unwrap();
            let unwritable = dir.join("blocker").join("third.der");
            let files: [(&[u8], &Path); 2] = [(b"new", &first), (b"new", &unwritable)];
            assert!(save_all(&files, Visibility::Public).is_err());
            assert_eq!(read(&first).unwrap(), b"old");

            let files: [(&[u8], &Path); 2] = [(b"new", &first), (b"new too", &second)];
            save_all(&files, Visibility::Public).unwrap();
            assert_eq!(read(&first).unwrap(), b"new");
            assert_eq!(read(&second).unwrap(), b"new too");
        });
    }

    #[cfg(unix)]
    #[test]
    fn private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        test::test_under_tmp(|dir| {
            let path = dir.join("secret.key.pem");
            save_new(b"key", &path, Visibility::Private).unwrap();
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        });
    }

    #[test]
    fn list_files_filters_on_suffix() {
        test::test_under_tmp(|dir| {
            save(b"", &dir.join("a.cert.pem"), Visibility::Public).unwrap();
            save(b"", &dir.join("a.key.pem"), Visibility::Private).unwrap();
            create_dir(&dir.join("archive.cert.pem")).unwrap();

            assert_eq!(list_files(&dir, ".cert.pem").unwrap(), vec!["a.cert.pem".to_string()]);
            assert!(list_files(&dir.join("missing"), ".cert.pem").unwrap().is_empty());
            assert_eq!(read_opt(&dir.join("missing.pem")).unwrap(), None);
        });
    }
}
