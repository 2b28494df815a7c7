//! Filesystem helpers shared by the file-backed termini and the SSL store.

use std::io;
use std::path::Path;

use tokio::io::AsyncWriteExt;

/// Writes `data` to `dest` atomically: temp file in the same directory,
/// fsync, then rename over the destination. Parent directories are created.
pub(crate) async fn atomic_write(dest: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = dest.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let written = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, dest).await
    }
    .await;
    if written.is_err() {
        // Best effort; the write error is what matters to the caller.
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    written
}

/// Reads `path`, mapping a missing file to `None`.
pub(crate) async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Removes `path`; returns whether a file was actually removed.
pub(crate) async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// File stems in `dir` carrying `extension`, sorted. A missing directory is empty.
pub(crate) async fn list_stems(dir: &Path, extension: &str) -> io::Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut stems = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    Ok(stems)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a/b/web01.json");
        atomic_write(&dest, b"one").await.unwrap();
        atomic_write(&dest, b"two").await.unwrap();
        assert_eq!(read_optional(&dest).await.unwrap().unwrap(), b"two");
        assert_eq!(list_stems(&dest.parent().unwrap(), "json").await.unwrap(), vec!["web01"]);
    }

    #[tokio::test]
    async fn missing_files_are_not_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(read_optional(&path).await.unwrap().is_none());
        assert!(!remove_if_exists(&path).await.unwrap());
        assert!(list_stems(&dir.path().join("nope"), "json").await.unwrap().is_empty());
    }
}
