use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use fd_lock::RwLock;

use crate::errors::{Error, Result};

/// Removes the directory if it exists and recreates it empty.
pub fn reset(dir: &str) -> Result<()> {
    log::info!("resetting working directory '{}'", dir);
    match fs::remove_dir_all(dir) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("'{}' does not exist yet", dir);
        }
        Err(e) => {
            return Err(Error::Io {
                message: format!("failed to remove '{}' ({})", dir, e),
            })
        }
    }
    fs::create_dir_all(dir).map_err(|e| Error::Io {
        message: format!("failed to create '{}' ({})", dir, e),
    })
}

/// Lock file path for the working directory.
/// Lives next to the directory since the directory itself gets wiped.
pub fn lock_path(dir: &str) -> PathBuf {
    let dir = Path::new(dir.trim_end_matches('/'));
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    dir.with_file_name(name)
}

/// Opens the advisory lock file of the working directory.
/// Call "try_write" on the returned lock and hold the guard for the
/// whole pipeline; a second invocation then fails fast.
pub fn open_lock(dir: &str) -> Result<RwLock<File>> {
    let path = lock_path(dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let f = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&path)
        .map_err(|e| Error::Io {
            message: format!("failed to open lock file {} ({})", path.display(), e),
        })?;
    Ok(RwLock::new(f))
}

pub fn busy(dir: &str) -> Error {
    Error::Io {
        message: format!(
            "working directory '{}' is in use by another invocation ({} is locked)",
            dir,
            lock_path(dir).display()
        ),
    }
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- workdir::test_reset --exact --show-output
#[test]
fn test_reset() {
    let _ = env_logger::builder().is_test(true).try_init();

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("quorum-cluster");
    let dir = dir.to_str().unwrap();

    // missing directory still succeeds
    reset(dir).unwrap();
    assert!(Path::new(dir).is_dir());
    assert_eq!(fs::read_dir(dir).unwrap().count(), 0);

    fs::create_dir_all(Path::new(dir).join("0")).unwrap();
    fs::write(Path::new(dir).join("0").join("nodekey"), b"abc").unwrap();
    fs::write(Path::new(dir).join("genesis.json"), b"{}").unwrap();
    reset(dir).unwrap();
    assert!(Path::new(dir).is_dir());
    assert_eq!(fs::read_dir(dir).unwrap().count(), 0);
}

/// RUST_LOG=debug cargo test --package quorum-ops --lib -- workdir::test_lock --exact --show-output
#[test]
fn test_lock() {
    let _ = env_logger::builder().is_test(true).try_init();

    assert_eq!(
        lock_path("/tmp/quorum-cluster"),
        PathBuf::from("/tmp/quorum-cluster.lock")
    );
    assert_eq!(
        lock_path("/tmp/quorum-cluster/"),
        PathBuf::from("/tmp/quorum-cluster.lock")
    );

    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("wd");
    let dir = dir.to_str().unwrap();

    let mut first = open_lock(dir).unwrap();
    let guard = first.try_write();
    assert!(guard.is_ok());

    let mut second = open_lock(dir).unwrap();
    assert!(second.try_write().is_err());

    drop(guard);
    assert!(second.try_write().is_ok());
}
