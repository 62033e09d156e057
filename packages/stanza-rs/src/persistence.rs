//! Reading and replacing stanza files on disk.
//!
//! Writes go through a temporary file in the target's directory followed by
//! a rename, so readers see either the old or the new content.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::buffer::LineBuffer;
use crate::error::StanzaError;

/// Permissions given to files this crate creates.
pub const NEW_FILE_MODE: u32 = 0o644;

const BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d@%H:%M:%S~";

/// Loads `path` into a line buffer. A missing file is `Ok(None)`.
pub fn load(path: &Path) -> Result<Option<LineBuffer>, StanzaError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(LineBuffer::from_text(&text))),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StanzaError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Creates the parent directory of `path` when it does not exist yet.
/// Returns whether a directory was created.
pub fn ensure_parent_directory(path: &Path) -> Result<bool, StanzaError> {
    let Some(parent) = parent_dir(path) else {
        return Ok(false);
    };
    if parent.exists() {
        return Ok(false);
    }

    fs::create_dir_all(parent).map_err(|source| StanzaError::CreateDirectory {
        path: parent.to_path_buf(),
        source,
    })?;
    debug!(dir = %parent.display(), "created parent directory");
    Ok(true)
}

/// Copies `path` to `<path>.<pid>.<timestamp>~` and returns the copy's path.
pub fn backup(path: &Path) -> Result<PathBuf, StanzaError> {
    let stamp = Local::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
    let backup = backup_path(path, std::process::id(), &stamp);
    fs::copy(path, &backup).map_err(|source| StanzaError::Backup {
        path: path.to_path_buf(),
        backup: backup.clone(),
        source,
    })?;
    info!(backup = %backup.display(), "backup created");
    Ok(backup)
}

fn backup_path(path: &Path, pid: u32, stamp: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(format!(".{}.{}", pid, stamp));
    PathBuf::from(name)
}

/// Replaces `path` with the contents of `buffer`.
///
/// An existing target keeps its permissions; a new one gets
/// [`NEW_FILE_MODE`]. Nothing is visible at `path` until the final rename.
pub fn atomic_write(path: &Path, buffer: &LineBuffer) -> Result<(), StanzaError> {
    let dir = parent_dir(path).unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(|source| StanzaError::TempCreate {
        dir: dir.to_path_buf(),
        source,
    })?;
    let temp_path = temp.path().to_path_buf();
    let write_error = |source| StanzaError::TempWrite {
        temp: temp_path.clone(),
        source,
    };

    temp.write_all(buffer.to_text().as_bytes()).map_err(write_error)?;
    temp.flush().map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;

    let permissions = match fs::metadata(path) {
        Ok(metadata) => Some(metadata.permissions()),
        Err(_) => new_file_permissions(),
    };
    if let Some(permissions) = permissions {
        fs::set_permissions(&temp_path, permissions).map_err(write_error)?;
    }

    temp.persist(path).map_err(|err| StanzaError::Rename {
        temp: temp_path.clone(),
        target: path.to_path_buf(),
        source: err.error,
    })?;

    info!(path = %path.display(), lines = buffer.len(), "stanza file written");
    Ok(())
}

#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(NEW_FILE_MODE))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|parent| !parent.as_os_str().is_empty())
}

/// Ownership and permission bits to enforce after a write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub mode: Option<u32>,
    pub owner: Option<u32>,
    pub group: Option<u32>,
}

impl FileAttributes {
    pub fn is_empty(&self) -> bool {
        self.mode.is_none() && self.owner.is_none() && self.group.is_none()
    }
}

/// Parses an octal permission string such as `0644`, `644` or `0o600`.
pub fn parse_mode(value: &str) -> Result<u32, StanzaError> {
    let digits = value.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    match u32::from_str_radix(digits, 8) {
        Ok(mode) if !digits.is_empty() && mode <= 0o7777 => Ok(mode),
        _ => Err(StanzaError::InvalidMode(value.to_string())),
    }
}

/// Applies `attributes` to `path` where they differ from the current state.
/// Returns whether anything was changed.
#[cfg(unix)]
pub fn reconcile_attributes(path: &Path, attributes: &FileAttributes) -> Result<bool, StanzaError> {
    use std::os::unix::fs::{chown, MetadataExt, PermissionsExt};

    if attributes.is_empty() {
        return Ok(false);
    }

    let to_error = |source| StanzaError::Attributes {
        path: path.to_path_buf(),
        source,
    };
    let metadata = fs::metadata(path).map_err(to_error)?;
    let mut changed = false;

    if let Some(mode) = attributes.mode {
        if metadata.mode() & 0o7777 != mode {
            fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(to_error)?;
            debug!(path = %path.display(), mode = %format!("{:04o}", mode), "mode updated");
            changed = true;
        }
    }

    let owner = attributes.owner.filter(|uid| *uid != metadata.uid());
    let group = attributes.group.filter(|gid| *gid != metadata.gid());
    if owner.is_some() || group.is_some() {
        chown(path, owner, group).map_err(to_error)?;
        debug!(path = %path.display(), ?owner, ?group, "ownership updated");
        changed = true;
    }

    Ok(changed)
}

#[cfg(not(unix))]
pub fn reconcile_attributes(_path: &Path, _attributes: &FileAttributes) -> Result<bool, StanzaError> {
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_file_is_none() {
        let temp = TempDir::new().expect("tempdir");
        let result = load(&temp.path().join("absent")).expect("load");
        assert!(result.is_none());
    }

    #[test]
    fn load_splits_lines() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("filesystems");
        fs::write(&path, "fs1:\n\tdev = /dev/hd1").expect("write");

        let buffer = load(&path).expect("load").expect("present");
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.to_text(), "fs1:\n\tdev = /dev/hd1");
    }

    #[test]
    fn ensure_parent_directory_creates_missing_dirs() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("etc").join("security").join("user");

        assert!(ensure_parent_directory(&path).expect("create"));
        assert!(path.parent().expect("parent").is_dir());
        assert!(!ensure_parent_directory(&path).expect("second call"));
        assert!(!ensure_parent_directory(Path::new("relative")).expect("bare name"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("filesystems");
        fs::write(&path, "old:\n").expect("write");

        let buffer = LineBuffer::from_text("new:\n\tdev = /dev/hd2\n");
        atomic_write(&path, &buffer).expect("atomic write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "new:\n\tdev = /dev/hd2\n");
        let leftovers: Vec<_> = fs::read_dir(temp.path()).expect("read dir").collect();
        assert_eq!(leftovers.len(), 1, "temporary file left behind");
    }

    #[test]
    fn atomic_write_into_missing_directory_names_it() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("missing").join("file");
        let error = atomic_write(&path, &LineBuffer::from_text("a:\n")).expect_err("should fail");
        assert!(matches!(error, StanzaError::TempCreate { .. }));
        assert!(error.to_string().contains("missing"));
    }

    #[test]
    fn atomic_write_failed_rename_names_paths_and_keeps_target() {
        let temp = TempDir::new().expect("tempdir");
        let target = temp.path().join("filesystems");
        fs::create_dir(&target).expect("mkdir");
        fs::write(target.join("keep"), "untouched\n").expect("write");

        let error = atomic_write(&target, &LineBuffer::from_text("fs1:\n")).expect_err("should fail");
        let StanzaError::Rename { temp: temp_path, target: reported, .. } = &error else {
            panic!("expected rename error, got {error:?}");
        };
        assert_eq!(reported, &target);
        assert_eq!(temp_path.parent(), Some(temp.path()));
        let message = error.to_string();
        assert!(message.contains(&temp_path.display().to_string()));
        assert!(message.contains(&target.display().to_string()));

        assert!(target.is_dir());
        assert_eq!(fs::read_to_string(target.join("keep")).expect("read"), "untouched\n");
        let entries: Vec<_> = fs::read_dir(temp.path()).expect("read dir").collect();
        assert_eq!(entries.len(), 1, "temporary file left behind");
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_preserves_and_sets_modes() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().expect("tempdir");
        let existing = temp.path().join("user");
        fs::write(&existing, "root:\n").expect("write");
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o640)).expect("chmod");
        atomic_write(&existing, &LineBuffer::from_text("root:\n\tadmin = true\n")).expect("write");
        let mode = fs::metadata(&existing).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o640);

        let created = temp.path().join("limits");
        atomic_write(&created, &LineBuffer::from_text("default:\n")).expect("write");
        let mode = fs::metadata(&created).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, NEW_FILE_MODE);
    }

    #[test]
    fn backup_copies_content() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("filesystems");
        fs::write(&path, "fs1:\n").expect("write");

        let copy = backup(&path).expect("backup");
        assert_ne!(copy, path);
        assert!(copy.to_string_lossy().ends_with('~'));
        assert_eq!(fs::read_to_string(&copy).expect("read"), "fs1:\n");
    }

    #[test]
    fn backup_path_format() {
        let path = backup_path(Path::new("/etc/filesystems"), 4242, "2024-01-02@03:04:05~");
        assert_eq!(path, PathBuf::from("/etc/filesystems.4242.2024-01-02@03:04:05~"));
    }

    #[test]
    fn parse_mode_accepts_octal_forms() {
        assert_eq!(parse_mode("0644").expect("mode"), 0o644);
        assert_eq!(parse_mode("600").expect("mode"), 0o600);
        assert_eq!(parse_mode("0o1777").expect("mode"), 0o1777);
        assert!(parse_mode("rw-r--r--").is_err());
        assert!(parse_mode("0888").is_err());
        assert!(parse_mode("").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn reconcile_attributes_updates_mode_once() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("user");
        fs::write(&path, "root:\n").expect("write");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        let attributes = FileAttributes {
            mode: Some(0o600),
            ..FileAttributes::default()
        };
        assert!(reconcile_attributes(&path, &attributes).expect("reconcile"));
        assert!(!reconcile_attributes(&path, &attributes).expect("reconcile again"));
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn reconcile_without_attributes_is_noop() {
        let temp = TempDir::new().expect("tempdir");
        let path = temp.path().join("user");
        assert!(!reconcile_attributes(&path, &FileAttributes::default()).expect("noop"));
    }
}
