//! Persisted grant set.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Errors from the grant store.
#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    /// Callers are identified by a non-empty package name.
    #[error("Caller package name must not be empty")]
    EmptyCaller,

    /// Reading or writing the grant file failed.
    #[error("Failed to access grant file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Modification time and length of the grant file as last read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        Some(Self { modified: metadata.modified().ok(), len: metadata.len() })
    }
}

/// The set of callers a plugin has granted access to.
///
/// Backed by a text file with one caller package per line. Writes are
/// persisted before they become visible, and visible to every reader as
/// soon as the write returns. Changes made to the file by another process
/// (a separate grant flow) are picked up on the next read.
pub struct PermissionManager {
    path: Option<PathBuf>,
    grants: watch::Sender<BTreeSet<String>>,
    stamp: Mutex<Option<FileStamp>>,
    write_lock: Mutex<()>,
}

impl PermissionManager {
    /// Open the grant file at `path`. A missing file is an empty set.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PermissionError> {
        let path = path.into();
        let stamp = FileStamp::of(&path);
        let grants = read_grants(&path)?;

        tracing::debug!(path = %path.display(), granted = grants.len(), "Loaded grant file");

        Ok(Self {
            path: Some(path),
            grants: watch::Sender::new(grants),
            stamp: Mutex::new(stamp),
            write_lock: Mutex::new(()),
        })
    }

    /// A grant set that lives only in memory.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            grants: watch::Sender::new(BTreeSet::new()),
            stamp: Mutex::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the grant file, if persisted.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `caller` may query this plugin.
    pub fn has_permission(&self, caller: &str) -> bool {
        self.reload_if_changed();
        !caller.is_empty() && self.grants.borrow().contains(caller)
    }

    /// Stream of `has_permission(caller)`, starting with the current value
    /// and emitting again on every change of the grant set.
    pub fn watch_permission(&self, caller: &str) -> impl Stream<Item = bool> + Send + 'static {
        self.reload_if_changed();
        let caller = caller.to_string();
        WatchStream::new(self.grants.subscribe()).map(move |grants| grants.contains(&caller))
    }

    /// Every granted caller, sorted.
    pub fn granted_callers(&self) -> Vec<String> {
        self.reload_if_changed();
        self.grants.borrow().iter().cloned().collect()
    }

    /// Grant `caller` access.
    pub fn grant_permission(&self, caller: &str) -> Result<(), PermissionError> {
        if caller.is_empty() {
            return Err(PermissionError::EmptyCaller);
        }
        self.update(|grants| grants.insert(caller.to_string()))?;
        tracing::debug!(caller, "Granted plugin access");
        Ok(())
    }

    /// Revoke `caller`'s access. Revoking an unknown caller is a no-op.
    pub fn revoke_permission(&self, caller: &str) -> Result<(), PermissionError> {
        self.update(|grants| grants.remove(caller))?;
        tracing::debug!(caller, "Revoked plugin access");
        Ok(())
    }

    fn update(&self, change: impl FnOnce(&mut BTreeSet<String>) -> bool) -> Result<(), PermissionError> {
        let _guard = self.write_lock.lock();
        self.reload_if_changed();

        let mut next = self.grants.borrow().clone();
        if !change(&mut next) {
            return Ok(());
        }

        if let Some(ref path) = self.path {
            persist(path, &next)?;
            *self.stamp.lock() = FileStamp::of(path);
        }
        self.grants.send_replace(next);
        Ok(())
    }

    /// Re-read the grant file if it changed since it was last read.
    fn reload_if_changed(&self) {
        let Some(ref path) = self.path else { return };

        let mut stamp = self.stamp.lock();
        let current = FileStamp::of(path);
        if current == *stamp {
            return;
        }

        match read_grants(path) {
            Ok(grants) => {
                tracing::debug!(path = %path.display(), granted = grants.len(), "Reloaded grant file");
                *stamp = current;
                self.grants.send_if_modified(|old| {
                    if *old == grants {
                        return false;
                    }
                    *old = grants;
                    true
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Keeping previous grants");
            }
        }
    }
}

/// Read the grant file. A missing file is an empty set.
fn read_grants(path: &Path) -> Result<BTreeSet<String>, PermissionError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_grants(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeSet::new()),
        Err(source) => Err(PermissionError::Io { path: path.to_path_buf(), source }),
    }
}

fn parse_grants(content: &str) -> BTreeSet<String> {
    content.lines().map(str::trim).filter(|line| !line.is_empty()).map(String::from).collect()
}

/// Write through a temporary file so readers never see a partial set.
fn persist(path: &Path, grants: &BTreeSet<String>) -> Result<(), PermissionError> {
    let io_err = |source| PermissionError::Io { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut content = String::new();
    for caller in grants {
        content.push_str(caller);
        content.push('\n');
    }

    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_is_empty() {
        let temp = TempDir::new().unwrap();
        let manager = PermissionManager::open(temp.path().join("grants")).unwrap();
        assert!(!manager.has_permission("launcher"));
        assert!(manager.granted_callers().is_empty());
    }

    #[test]
    fn test_grant_is_immediately_visible_and_persisted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data").join("grants");

        let manager = PermissionManager::open(&path).unwrap();
        manager.grant_permission("launcher").unwrap();
        assert!(manager.has_permission("launcher"));

        let reopened = PermissionManager::open(&path).unwrap();
        assert!(reopened.has_permission("launcher"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "launcher\n");
    }

    #[test]
    fn test_revoke() {
        let manager = PermissionManager::ephemeral();
        manager.grant_permission("launcher").unwrap();
        manager.grant_permission("other").unwrap();
        manager.revoke_permission("launcher").unwrap();

        assert!(!manager.has_permission("launcher"));
        assert_eq!(manager.granted_callers(), vec!["other".to_string()]);

        manager.revoke_permission("never-granted").unwrap();
    }

    #[test]
    fn test_empty_caller_is_never_granted() {
        let manager = PermissionManager::ephemeral();
        assert!(matches!(manager.grant_permission(""), Err(PermissionError::EmptyCaller)));
        assert!(!manager.has_permission(""));
    }

    #[test]
    fn test_grant_file_ignores_blank_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("grants");
        std::fs::write(&path, "launcher\n\n  other  \n").unwrap();

        let manager = PermissionManager::open(&path).unwrap();
        assert_eq!(manager.granted_callers(), vec!["launcher".to_string(), "other".to_string()]);
    }

    #[test]
    fn test_grant_from_another_process_is_picked_up() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("grants");

        let serving = PermissionManager::open(&path).unwrap();
        assert!(!serving.has_permission("launcher"));

        // a separate grant flow writes the same file
        PermissionManager::open(&path).unwrap().grant_permission("launcher").unwrap();
        assert!(serving.has_permission("launcher"));

        std::fs::write(&path, "").unwrap();
        assert!(!serving.has_permission("launcher"));
    }

    #[test]
    fn test_local_write_keeps_external_grants() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("grants");

        let manager = PermissionManager::open(&path).unwrap();
        std::fs::write(&path, "other\n").unwrap();
        manager.grant_permission("launcher").unwrap();

        assert_eq!(manager.granted_callers(), vec!["launcher".to_string(), "other".to_string()]);
    }

    #[tokio::test]
    async fn test_watch_permission() {
        let manager = PermissionManager::ephemeral();
        let mut stream = Box::pin(manager.watch_permission("launcher"));

        assert_eq!(stream.next().await, Some(false));

        manager.grant_permission("launcher").unwrap();
        assert_eq!(stream.next().await, Some(true));

        manager.revoke_permission("launcher").unwrap();
        assert_eq!(stream.next().await, Some(false));
    }
}
