//! Directory-backed blob store.
//!
//! Every blob is one file directly under the root directory. Keys are
//! percent-encoded into file names so arbitrary keys (URLs, namespaced keys)
//! map onto a single flat directory without escaping it.

use crate::backend::BlobInfoStream;
use crate::error::{ErrorKind, Result};
use crate::{BlobInfo, BlobStore, validate_key};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use tokio::fs::{self, DirEntry};

/// Everything except unreserved URL characters is encoded, which also covers
/// path separators and `.` sequences.
const FILENAME_ENCODE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');
/// In-flight writes; never listed.
const TEMP_SUFFIX: &str = ".partial";
/// Most filesystems cap a single path component at 255 bytes.
const MAX_FILENAME_LEN: usize = 255;

/// Blob store on a local directory.
///
/// # Examples
///
/// ```no_run
/// use tsundoku_storage::backend::DirectoryStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = DirectoryStore::new("cache", "/var/cache/tsundoku")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DirectoryStore {
    name: String,
    root: PathBuf,
}
impl DirectoryStore {
    /// Create a new directory store, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or is not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidRoot(root));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidRoot(root));
            }
        } else {
            // Only happens once on startup; not worth an async constructor.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_name(key: &str) -> Result<String> {
        let encoded = utf8_percent_encode(validate_key(key)?, FILENAME_ENCODE).to_string();
        if encoded.len() + TEMP_SUFFIX.len() > MAX_FILENAME_LEN {
            exn::bail!(ErrorKind::InvalidKey(key.to_string()));
        }
        Ok(encoded)
    }

    fn absolute_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.root.join(Self::file_name(key)?))
    }

    fn decode_file_name(name: &str) -> Option<String> {
        if name.ends_with(TEMP_SUFFIX) {
            return None;
        }
        percent_decode_str(name).decode_utf8().ok().map(|key| key.into_owned())
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::StorageFull => ErrorKind::StorageFull,
            _ => ErrorKind::Io(e),
        }
    }

    async fn process_entry(entry: DirEntry, prefix: Option<&str>) -> Result<Option<BlobInfo>> {
        let path = entry.path();
        let Some(key) = entry.file_name().to_str().and_then(Self::decode_file_name) else {
            return Ok(None);
        };
        if let Some(pfx) = prefix
            && !key.starts_with(pfx)
        {
            return Ok(None);
        }
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        if !metadata.is_file() {
            return Ok(None);
        }
        let modified = metadata.modified().or_raise(|| ErrorKind::BackendError("no mtime".to_string()))?;
        Ok(Some(BlobInfo::new(key, metadata.len(), UtcDateTime::from(modified))))
    }
}

#[async_trait]
impl BlobStore for DirectoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a str>) -> BlobInfoStream<'a> {
        Box::pin(stream! {
            let mut entries = match fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                Err(err) => {
                    yield Err(exn::Exn::from(Self::map_io_error(err, &self.root)));
                    return;
                },
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &self.root))); continue; },
                };
                match Self::process_entry(entry, prefix).await {
                    Ok(Some(info)) => yield Ok(info),
                    Ok(None) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.absolute_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(exn::Exn::from(Self::map_io_error(e, &path))),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.absolute_path(key)?;
        // Write then rename, so readers never observe a torn blob.
        let mut temp = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);
        let temp = PathBuf::from(temp);
        if let Err(e) = fs::write(&temp, data).await {
            let _ = fs::remove_file(&temp).await;
            return Err(exn::Exn::from(Self::map_io_error(e, &temp)));
        }
        fs::rename(&temp, &path).await.map_err(|e| Self::map_io_error(e, &path))?;
        tracing::trace!(store = %self.name, key, size = data.len(), "Stored blob");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.absolute_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(exn::Exn::from(Self::map_io_error(e, &path))),
        }
    }
}
