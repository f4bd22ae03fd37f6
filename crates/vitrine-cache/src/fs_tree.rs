//! Hierarchical file-tree backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempPath;
use tokio::{fs, io::AsyncWriteExt};
use url::Url;
use vitrine_store::ObjectRef;

use crate::{
    CacheError, CacheResult,
    backend::{CacheBackend, EntryInfo, EntryWriter},
};

/// Nested-directory backend: the key's `/`-segments become directories, the
/// final segment is the leaf file.
///
/// The bucket is *not* part of the physical path: two buckets sharing a key
/// string map to the same file. Known limitation, deliberately left
/// unresolved (namespacing by bucket would invalidate existing trees).
pub struct FsTreeBackend {
    root: PathBuf,
}

impl FsTreeBackend {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Maps a key to its on-tree path.
    ///
    /// Rejects absolute keys, empty segments and `.`/`..` — the tree never
    /// invents paths outside its root.
    fn entry_path(&self, key: &str) -> CacheResult<PathBuf> {
        if key.starts_with('/') {
            return Err(CacheError::InvalidKey(format!("absolute key: {key}")));
        }
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(CacheError::InvalidKey(format!("unsafe segment in: {key}")));
            }
            path.push(segment);
        }
        Ok(path)
    }

    async fn walk(&self) -> CacheResult<Vec<EntryInfo>> {
        let mut out = Vec::new();
        let mut pending: Vec<PathBuf> = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                // Dot-prefixed files are never entries: in-flight writer
                // temp files and the backend probe marker.
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    pending.push(entry.path());
                } else if meta.is_file() {
                    let rel = entry
                        .path()
                        .strip_prefix(&self.root)
                        .map_err(|e| CacheError::Backend(e.to_string()))?
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push(EntryInfo {
                        name: rel,
                        size_bytes: meta.len(),
                    });
                }
            }
        }
        Ok(out)
    }

    async fn remove_path(path: &Path) -> CacheResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Streams into a temp file beside the destination; the entry becomes
/// visible only when `finish` renames it into place. Dropping the writer
/// without finishing removes the temp file, so an aborted download never
/// leaves a truncated entry behind.
struct FsEntryWriter {
    file: fs::File,
    tmp: TempPath,
    dest: PathBuf,
    written: u64,
}

#[async_trait]
impl EntryWriter for FsEntryWriter {
    async fn write_chunk(&mut self, chunk: &[u8]) -> CacheResult<()> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> CacheResult<u64> {
        let Self {
            mut file,
            tmp,
            dest,
            written,
        } = *self;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tmp.persist(&dest)
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(written)
    }
}

#[async_trait]
impl CacheBackend for FsTreeBackend {
    async fn exists(&self, obj: &ObjectRef) -> bool {
        let Ok(path) = self.entry_path(&obj.key) else {
            return false;
        };
        fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
    }

    async fn read(&self, obj: &ObjectRef) -> CacheResult<Option<Bytes>> {
        let path = self.entry_path(&obj.key)?;
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_writer(&self, obj: &ObjectRef) -> CacheResult<Box<dyn EntryWriter>> {
        let dest = self.entry_path(&obj.key)?;
        let parent = dest.parent().ok_or_else(|| {
            CacheError::Backend(format!("entry has no parent dir: {}", dest.display()))
        })?;
        fs::create_dir_all(parent).await?;

        // Same directory as the destination so the final rename never
        // crosses a filesystem boundary.
        let (std_file, tmp) = tempfile::NamedTempFile::new_in(parent)?.into_parts();
        Ok(Box::new(FsEntryWriter {
            file: fs::File::from_std(std_file),
            tmp,
            dest,
            written: 0,
        }))
    }

    async fn entry_url(&self, obj: &ObjectRef) -> Option<Url> {
        if !self.exists(obj).await {
            return None;
        }
        let path = self.entry_path(&obj.key).ok()?;
        Url::from_file_path(path).ok()
    }

    async fn entry_size(&self, obj: &ObjectRef) -> Option<u64> {
        let path = self.entry_path(&obj.key).ok()?;
        let meta = fs::metadata(path).await.ok()?;
        meta.is_file().then_some(meta.len())
    }

    async fn remove(&self, obj: &ObjectRef) -> CacheResult<()> {
        let path = self.entry_path(&obj.key)?;
        Self::remove_path(&path).await
    }

    async fn enumerate(&self) -> CacheResult<Vec<EntryInfo>> {
        self.walk().await
    }

    async fn remove_named(&self, name: &str) -> CacheResult<()> {
        let path = self.entry_path(name)?;
        Self::remove_path(&path).await
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn obj(key: &str) -> ObjectRef {
        ObjectRef::new("media", key).unwrap()
    }

    #[rstest]
    #[tokio::test]
    async fn write_read_roundtrip_with_nested_key() {
        let dir = TempDir::new().unwrap();
        let backend = FsTreeBackend::new(dir.path());

        let target = obj("ds/video/seg0.ts");
        assert!(!backend.exists(&target).await);

        let mut writer = backend.open_writer(&target).await.unwrap();
        writer.write_chunk(b"hello ").await.unwrap();
        writer.write_chunk(b"tree").await.unwrap();
        assert_eq!(writer.finish().await.unwrap(), 10);

        assert!(backend.exists(&target).await);
        assert_eq!(
            backend.read(&target).await.unwrap().unwrap().as_ref(),
            b"hello tree"
        );
        assert_eq!(backend.entry_size(&target).await, Some(10));
        assert!(dir.path().join("ds/video/seg0.ts").is_file());
    }

    #[rstest]
    #[tokio::test]
    async fn bucket_is_not_part_of_the_physical_path() {
        let dir = TempDir::new().unwrap();
        let backend = FsTreeBackend::new(dir.path());

        let a = ObjectRef::new("bucket-a", "shared/key.bin").unwrap();
        let b = ObjectRef::new("bucket-b", "shared/key.bin").unwrap();

        let mut writer = backend.open_writer(&a).await.unwrap();
        writer.write_chunk(b"from-a").await.unwrap();
        writer.finish().await.unwrap();

        // Documented collision: the second bucket sees the first's entry.
        assert!(backend.exists(&b).await);
    }

    #[rstest]
    #[case::dotdot("../escape.bin")]
    #[case::dot("a/./b.bin")]
    #[case::absolute("/etc/passwd")]
    #[case::empty_segment("a//b.bin")]
    #[tokio::test]
    async fn unsafe_keys_are_rejected(#[case] key: &str) {
        let dir = TempDir::new().unwrap();
        let backend = FsTreeBackend::new(dir.path());
        let target = obj(key);

        assert!(!backend.exists(&target).await);
        assert!(backend.open_writer(&target).await.is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn enumerate_lists_relative_names_and_sizes() {
        let dir = TempDir::new().unwrap();
        let backend = FsTreeBackend::new(dir.path());

        for (key, data) in [("a/one.bin", &b"12345"[..]), ("b/c/two.bin", &b"123"[..])] {
            let mut writer = backend.open_writer(&obj(key)).await.unwrap();
            writer.write_chunk(data).await.unwrap();
            writer.finish().await.unwrap();
        }

        let mut entries = backend.enumerate().await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                EntryInfo {
                    name: "a/one.bin".into(),
                    size_bytes: 5
                },
                EntryInfo {
                    name: "b/c/two.bin".into(),
                    size_bytes: 3
                },
            ]
        );

        backend.remove_named("a/one.bin").await.unwrap();
        assert_eq!(backend.enumerate().await.unwrap().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn unfinished_writer_leaves_no_entry() {
        let dir = TempDir::new().unwrap();
        let backend = FsTreeBackend::new(dir.path());
        let target = obj("ds/a.bin");

        let mut writer = backend.open_writer(&target).await.unwrap();
        writer.write_chunk(b"truncated").await.unwrap();
        // Dropped without finish: the temp file is removed, nothing committed.
        drop(writer);

        assert!(!backend.exists(&target).await);
        assert!(backend.read(&target).await.unwrap().is_none());
        assert!(backend.enumerate().await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn open_writer_is_invisible_until_finished() {
        let dir = TempDir::new().unwrap();
        let backend = FsTreeBackend::new(dir.path());
        let target = obj("ds/a.bin");

        let mut writer = backend.open_writer(&target).await.unwrap();
        writer.write_chunk(b"pending").await.unwrap();

        assert!(!backend.exists(&target).await);
        assert!(backend.enumerate().await.unwrap().is_empty());

        writer.finish().await.unwrap();
        assert!(backend.exists(&target).await);
        assert_eq!(backend.enumerate().await.unwrap().len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn remove_swallows_not_found() {
        let dir = TempDir::new().unwrap();
        let backend = FsTreeBackend::new(dir.path());
        backend.remove(&obj("never/written.bin")).await.unwrap();
    }

    #[rstest]
    #[tokio::test]
    async fn entry_url_is_a_file_url_only_when_present() {
        let dir = TempDir::new().unwrap();
        let backend = FsTreeBackend::new(dir.path());
        let target = obj("a/media.mp4");

        assert!(backend.entry_url(&target).await.is_none());

        let mut writer = backend.open_writer(&target).await.unwrap();
        writer.write_chunk(b"x").await.unwrap();
        writer.finish().await.unwrap();

        let url = backend.entry_url(&target).await.unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("/a/media.mp4"));
    }
}
