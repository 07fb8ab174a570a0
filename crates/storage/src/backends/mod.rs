//! Local filesystem backends for the staging area and the public namespace.

pub mod publish;
pub mod staging;

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
pub(crate) const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Resolve a single path segment under `root`, refusing anything that could
/// escape it.
///
/// Segments are names we build ourselves (fingerprint hex, chunk index,
/// validated artifact names), so only one normal component is accepted. When
/// the target already exists it is canonicalized to catch symlinks that point
/// outside the root.
pub(crate) fn child_path_sync(root: &Path, segment: &str) -> StorageResult<PathBuf> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => {
            return Err(StorageError::InvalidKey(format!(
                "unsafe path segment: {segment:?}"
            )));
        }
    }

    let path = root.join(segment);
    match std::fs::symlink_metadata(&path) {
        Ok(meta) => {
            let root_canonical = root.canonicalize()?;
            let canonical = path.canonicalize().map_err(|e| {
                if meta.file_type().is_symlink() {
                    StorageError::InvalidKey(format!("symlink target missing or invalid: {segment}"))
                } else {
                    StorageError::Io(e)
                }
            })?;
            if !canonical.starts_with(&root_canonical) {
                return Err(StorageError::InvalidKey(format!(
                    "resolved path escapes storage root: {segment}"
                )));
            }
            Ok(path)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(path),
        Err(err) => Err(StorageError::Io(err)),
    }
}

/// Async wrapper around [`child_path_sync`]; canonicalization blocks.
pub(crate) async fn child_path(root: &Path, segment: &str) -> StorageResult<PathBuf> {
    let root = root.to_path_buf();
    let segment = segment.to_string();
    tokio::task::spawn_blocking(move || child_path_sync(&root, &segment))
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))?
}

/// Sibling temp path for `path`, unique per call.
pub(crate) fn temp_sibling(path: &Path) -> PathBuf {
    let suffix = format!(".tmp.{}", Uuid::new_v4());
    let name = path
        .file_name()
        .map(|n| format!(".{}{suffix}", n.to_string_lossy()))
        .unwrap_or(suffix);
    path.with_file_name(name)
}

/// True for names produced by [`temp_sibling`].
pub(crate) fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(".tmp.")
}

/// Write `data` to a temp sibling and fsync it. The caller decides how the
/// temp file becomes visible.
pub(crate) async fn write_temp(path: &Path, data: &[u8]) -> StorageResult<PathBuf> {
    let temp_path = temp_sibling(path);
    let result = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        Ok::<_, std::io::Error>(())
    }
    .await;
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(temp_path)
}

/// Atomically replace `path` with `data`.
pub(crate) async fn write_atomic(path: &Path, data: Bytes) -> StorageResult<()> {
    let temp_path = write_temp(path, &data).await?;
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

/// Atomically create `path` with `data` unless it already exists.
///
/// Returns false when `path` was already present. The hard link fails with
/// `AlreadyExists` instead of overwriting, so concurrent writers of the same
/// path cannot both win.
pub(crate) async fn write_new(path: &Path, data: &[u8]) -> StorageResult<bool> {
    let temp_path = write_temp(path, data).await?;
    let linked = fs::hard_link(&temp_path, path).await;
    let _ = fs::remove_file(&temp_path).await;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Map `NotFound` to [`StorageError::NotFound`] with a readable key.
pub(crate) fn not_found_as(key: impl Into<String>) -> impl FnOnce(std::io::Error) -> StorageError {
    let key = key.into();
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(key)
        } else {
            StorageError::Io(e)
        }
    }
}

/// Stream a file in fixed-size pieces.
pub(crate) fn file_stream(file: fs::File) -> crate::traits::ByteStream {
    use tokio::io::AsyncReadExt;

    let stream = async_stream::try_stream! {
        let mut file = file;
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    };
    Box::pin(stream)
}
