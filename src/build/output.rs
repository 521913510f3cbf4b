//! Output sinks: where emitted files end up.
//!
//! Production writes to the output directory on disk. Development keeps every
//! emitted file in an in-memory store that the dev server reads from, so a
//! rebuild never touches the disk.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Destination for emitted files.
///
/// Paths are relative to the output root and always use `/` separators
/// (e.g. `css/site.css`).
pub trait OutputSink: Send + Sync + std::fmt::Debug {
    /// Write (or replace) a file.
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()>;

    /// Read a file, `None` if it does not exist.
    fn read(&self, path: &str) -> io::Result<Option<Vec<u8>>>;

    /// All file paths currently in the sink, sorted.
    fn list(&self) -> io::Result<Vec<String>>;

    /// Remove everything.
    fn clear(&self) -> io::Result<()>;

    /// On-disk root, if this sink is backed by a directory.
    fn root(&self) -> Option<&Path> {
        None
    }

    fn exists(&self, path: &str) -> bool {
        matches!(self.read(path), Ok(Some(_)))
    }
}

/// Convert a relative path into the slash-separated form used by sinks.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Files written under a directory on disk.
#[derive(Debug, Clone)]
pub struct DiskOutput {
    root: PathBuf,
}

impl DiskOutput {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        path.split('/').filter(|s| !s.is_empty()).fold(self.root.clone(), |acc, s| acc.join(s))
    }
}

impl OutputSink for DiskOutput {
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, contents)
    }

    fn read(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.full_path(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let mut files = Vec::new();
        if self.root.is_dir() {
            collect_files(&self.root, &self.root, &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    /// Remove the whole output directory. A missing directory is not an error.
    fn clear(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(to_slash(relative));
        }
    }
    Ok(())
}

/// Files held in memory, served directly by the dev server.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "in-memory output lock poisoned")
}

impl OutputSink for MemoryOutput {
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let mut files = self.files.write().map_err(|_| poisoned())?;
        files.insert(path.trim_start_matches('/').to_string(), contents.to_vec());
        Ok(())
    }

    fn read(&self, path: &str) -> io::Result<Option<Vec<u8>>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files.get(path.trim_start_matches('/')).cloned())
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let files = self.files.read().map_err(|_| poisoned())?;
        Ok(files.keys().cloned().collect())
    }

    fn clear(&self) -> io::Result<()> {
        self.files.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_output_roundtrip() {
        let out = MemoryOutput::new();
        out.write("css/site.css", b"body{}").unwrap();
        assert_eq!(out.read("css/site.css").unwrap(), Some(b"body{}".to_vec()));
        assert_eq!(out.read("/css/site.css").unwrap(), Some(b"body{}".to_vec()));
        assert_eq!(out.read("css/missing.css").unwrap(), None);
        assert!(out.exists("css/site.css"));
    }

    #[test]
    fn test_memory_output_list_sorted_and_clear() {
        let out = MemoryOutput::new();
        out.write("js/b.js", b"").unwrap();
        out.write("index.html", b"").unwrap();
        out.write("css/a.css", b"").unwrap();
        assert_eq!(out.list().unwrap(), vec!["css/a.css", "index.html", "js/b.js"]);

        out.clear().unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_disk_output_write_creates_dirs() {
        let temp = TempDir::new().unwrap();
        let out = DiskOutput::new(temp.path().join("dist"));
        out.write("assets/images/icons.png", &[1, 2, 3]).unwrap();

        assert!(temp.path().join("dist/assets/images/icons.png").is_file());
        assert_eq!(out.read("assets/images/icons.png").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(out.list().unwrap(), vec!["assets/images/icons.png"]);
    }

    #[test]
    fn test_disk_output_clear_missing_dir_is_ok() {
        let temp = TempDir::new().unwrap();
        let out = DiskOutput::new(temp.path().join("never-created"));
        assert!(out.clear().is_ok());
        assert!(out.list().unwrap().is_empty());
    }

    #[test]
    fn test_disk_output_clear_removes_tree() {
        let temp = TempDir::new().unwrap();
        let out = DiskOutput::new(temp.path().join("dist"));
        out.write("js/app.js", b"1").unwrap();
        out.clear().unwrap();
        assert!(!temp.path().join("dist").exists());
    }

    #[test]
    fn test_to_slash() {
        assert_eq!(to_slash(Path::new("css/pages/home.css")), "css/pages/home.css");
        assert_eq!(to_slash(Path::new("index.html")), "index.html");
    }
}
