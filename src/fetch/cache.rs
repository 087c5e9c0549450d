use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Writes `bytes` to a temporary sibling of `target` and renames it into
/// place, so a reader never observes a half-written file.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(
        "{}.{}.{}.tmp",
        name,
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// On-disk store of fetched documents keyed by a hash of the URL they came from.
/// Entries are written with [`write_atomic`].
#[derive(Debug, Clone)]
pub struct DocumentCache {
    dir: PathBuf,
}

impl DocumentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_for(url: &Url) -> String {
        format!("{:x}", Sha256::digest(url.as_str().as_bytes()))
    }

    pub fn path_for(&self, url: &Url) -> PathBuf {
        self.dir.join(format!("{}.cache", Self::key_for(url)))
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.path_for(url).is_file()
    }

    pub fn read(&self, url: &Url) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(url)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write(&self, url: &Url, bytes: &[u8]) -> Result<PathBuf> {
        let target = self.path_for(url);
        write_atomic(&target, bytes)?;
        log::debug!("Cached {} at {:?}", url, target);
        Ok(target)
    }

    pub fn remove(&self, url: &Url) -> Result<()> {
        match fs::remove_file(self.path_for(url)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_read_remove() {
        let dir = tempdir().unwrap();
        let cache = DocumentCache::new(dir.path().join("cache")).unwrap();
        let url = Url::parse("https://www.sec.gov/Archives/edgar/data/1/000000000125000001/form4.xml").unwrap();

        assert!(!cache.contains(&url));
        assert!(cache.read(&url).unwrap().is_none());

        cache.write(&url, b"<ownershipDocument/>").unwrap();
        assert!(cache.contains(&url));
        assert_eq!(cache.read(&url).unwrap().unwrap(), b"<ownershipDocument/>");

        cache.remove(&url).unwrap();
        assert!(!cache.contains(&url));
        cache.remove(&url).unwrap();
    }

    #[test]
    fn test_key_depends_only_on_url() {
        let a = Url::parse("https://www.sec.gov/a.xml").unwrap();
        let b = Url::parse("https://www.sec.gov/b.xml").unwrap();
        assert_eq!(DocumentCache::key_for(&a), DocumentCache::key_for(&a));
        assert_ne!(DocumentCache::key_for(&a), DocumentCache::key_for(&b));
        assert_eq!(DocumentCache::key_for(&a).len(), 64);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let cache = DocumentCache::new(dir.path()).unwrap();
        let url = Url::parse("https://www.sec.gov/a.xml").unwrap();
        cache.write(&url, b"first").unwrap();
        cache.write(&url, b"second").unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".cache"));
        assert_eq!(cache.read(&url).unwrap().unwrap(), b"second");
    }
}
