//! 工作区根目录
//!
//! 根目录在进程启动时创建并规范化，进程生命周期内不会被删除。
//! 所有文件操作与命令执行持有共享锁；仓库克隆（先清空再重建）持有独占锁，
//! 因此读操作只会看到克隆前或克隆后的完整状态。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// 共享访问凭证，持有期间克隆无法开始
pub type SharedAccess = OwnedRwLockReadGuard<()>;

/// 独占访问凭证，持有期间所有文件操作与命令等待
pub type ExclusiveAccess = OwnedRwLockWriteGuard<()>;

#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    path: PathBuf,
    lock: Arc<RwLock<()>>,
}

impl WorkspaceRoot {
    /// Ensure the directory exists and pin its canonical path
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        let path = path.canonicalize()?;
        Ok(Self {
            path,
            lock: Arc::new(RwLock::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// tokio 的 RwLock 是公平锁：排队中的克隆会阻塞其后到达的读者
    pub async fn shared(&self) -> SharedAccess {
        self.lock.clone().read_owned().await
    }

    pub async fn exclusive(&self) -> ExclusiveAccess {
        self.lock.clone().write_owned().await
    }

    /// True when the root holds no entries at all
    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(fs::read_dir(&self.path)?.next().is_none())
    }

    /// Remove every child of the root, keeping the root directory itself.
    ///
    /// Callers must hold [`ExclusiveAccess`].
    pub fn clear(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_and_canonicalizes() {
        let temp = TempDir::new().unwrap();
        let root = WorkspaceRoot::open(temp.path().join("nested/./workspace")).unwrap();
        assert!(root.path().is_dir());
        assert!(root.path().is_absolute());
        assert!(root.is_empty().unwrap());
    }

    #[test]
    fn test_clear_keeps_root() {
        let temp = TempDir::new().unwrap();
        let root = WorkspaceRoot::open(temp.path()).unwrap();
        fs::create_dir_all(root.path().join("src/deep")).unwrap();
        fs::write(root.path().join("src/deep/lib.rs"), "x").unwrap();
        fs::write(root.path().join("README.md"), "x").unwrap();

        root.clear().unwrap();

        assert!(root.path().is_dir());
        assert!(root.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_exclusive_waits_for_shared() {
        let temp = TempDir::new().unwrap();
        let root = WorkspaceRoot::open(temp.path()).unwrap();

        let reader = root.shared().await;
        let pending = tokio::time::timeout(Duration::from_millis(50), root.exclusive()).await;
        assert!(pending.is_err(), "exclusive access granted while a reader is active");

        drop(reader);
        let writer = tokio::time::timeout(Duration::from_secs(1), root.exclusive()).await;
        assert!(writer.is_ok());
    }

    #[tokio::test]
    async fn test_readers_share() {
        let temp = TempDir::new().unwrap();
        let root = WorkspaceRoot::open(temp.path()).unwrap();

        let first = root.shared().await;
        let second = tokio::time::timeout(Duration::from_millis(50), root.shared()).await;
        assert!(second.is_ok());
        drop(first);
    }
}
