//! Object-storage / distributed-filesystem adapter (§6 "Storage interface"):
//! `mkdir`/`rmdir`/`put`, all idempotent, `put` retrying with backoff.
//!
//! The production collaborator (GCS, HDFS, ...) is external to this crate;
//! [`LocalFsStorage`] is the local-filesystem reference implementation the
//! orchestrator and demo CLI use.

use std::fs;
use std::path::Path;

use crate::error::with_retry;
use crate::{Error, Result};

/// Idempotent storage primitives the orchestrator uses to stage extracted
/// and shredded files before they're loaded into the warehouse (§5, §6).
pub trait Storage: Send + Sync {
    fn mkdir(&self, path: &Path) -> Result<()>;
    fn rmdir(&self, path: &Path) -> Result<()>;
    fn put(&self, local_path: &Path, remote_dir: &Path) -> Result<()>;
}

/// Local-filesystem reference implementation of [`Storage`].
#[derive(Debug, Clone, Default)]
pub struct LocalFsStorage;

impl Storage for LocalFsStorage {
    fn mkdir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(Error::Io)
    }

    fn rmdir(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_dir_all(path).map_err(Error::Io)?;
        }
        Ok(())
    }

    fn put(&self, local_path: &Path, remote_dir: &Path) -> Result<()> {
        with_retry("storage.put", || {
            fs::create_dir_all(remote_dir)?;
            let file_name = local_path
                .file_name()
                .ok_or_else(|| Error::Storage(format!("{local_path:?} has no file name")))?;
            fs::copy(local_path, remote_dir.join(file_name))?;
            Ok(())
        })
    }
}
