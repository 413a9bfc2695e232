// Virtual Filesystem
// In-memory filesystem privately owned by a single execution unit

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Errors raised by virtual filesystem operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VfsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),
}

/// An in-memory filesystem addressed by absolute `/`-separated paths.
///
/// Each execution unit owns exactly one of these; it is never shared
/// across units. Files are flat byte buffers, directories are plain
/// path entries. Listings come back sorted.
#[derive(Debug, Default)]
pub struct VirtualFs {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl VirtualFs {
    /// Create an empty filesystem containing only the root directory.
    pub fn new() -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert("/".to_string());
        Self {
            files: BTreeMap::new(),
            dirs,
        }
    }

    /// Whether a file or directory exists at `path`.
    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }

    /// Whether a directory exists at `path`.
    pub fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    /// Create a directory. The parent must already exist.
    pub fn mkdir(&mut self, path: &str) -> Result<(), VfsError> {
        if self.exists(path) {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        let parent = parent_of(path);
        if !self.dirs.contains(parent) {
            return Err(VfsError::NotADirectory(parent.to_string()));
        }
        self.dirs.insert(path.to_string());
        Ok(())
    }

    /// Write a file, replacing any previous contents. The parent
    /// directory must exist.
    pub fn write(&mut self, path: &str, bytes: Vec<u8>) -> Result<(), VfsError> {
        let parent = parent_of(path);
        if !self.dirs.contains(parent) {
            return Err(VfsError::NotADirectory(parent.to_string()));
        }
        self.files.insert(path.to_string(), bytes);
        Ok(())
    }

    /// Borrow a file's contents.
    pub fn read(&self, path: &str) -> Result<&[u8], VfsError> {
        self.files
            .get(path)
            .map(|b| b.as_slice())
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    /// Remove a file and return its bytes, transferring ownership to
    /// the caller.
    pub fn take(&mut self, path: &str) -> Result<Vec<u8>, VfsError> {
        self.files
            .remove(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    /// Remove a file.
    pub fn remove_file(&mut self, path: &str) -> Result<(), VfsError> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    /// Remove a directory and everything under it.
    pub fn remove_dir_all(&mut self, path: &str) -> Result<(), VfsError> {
        if !self.dirs.contains(path) {
            return Err(VfsError::NotFound(path.to_string()));
        }
        let prefix = format!("{}/", path);
        self.files.retain(|p, _| !p.starts_with(&prefix));
        self.dirs.retain(|p| p != path && !p.starts_with(&prefix));
        Ok(())
    }

    /// Remove an empty directory.
    pub fn rmdir(&mut self, path: &str) -> Result<(), VfsError> {
        if !self.dirs.contains(path) {
            return Err(VfsError::NotFound(path.to_string()));
        }
        if self.entries_of(path).next().is_some() {
            return Err(VfsError::NotEmpty(path.to_string()));
        }
        self.dirs.remove(path);
        Ok(())
    }

    /// Sorted names of the direct entries of a directory.
    pub fn read_dir(&self, path: &str) -> Result<Vec<String>, VfsError> {
        if !self.dirs.contains(path) {
            return Err(VfsError::NotFound(path.to_string()));
        }
        let mut entries: Vec<String> = self.entries_of(path).collect();
        entries.sort();
        Ok(entries)
    }

    fn entries_of<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = String> + 'a {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        self.files
            .keys()
            .chain(self.dirs.iter())
            .filter_map(move |p| {
                let rest = p.strip_prefix(&prefix)?;
                // Only direct children, not entries of subdirectories.
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(i) => &path[..i],
        None => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mkdir_write_read() {
        let mut fs = VirtualFs::new();
        fs.mkdir("/working").unwrap();
        fs.write("/working/e1m1.map", b"brush soup".to_vec()).unwrap();

        assert!(fs.exists("/working/e1m1.map"));
        assert_eq!(fs.read("/working/e1m1.map").unwrap(), b"brush soup");
    }

    #[test]
    fn test_write_requires_parent() {
        let mut fs = VirtualFs::new();
        let err = fs.write("/nowhere/a.bsp", Vec::new()).unwrap_err();
        assert_eq!(err, VfsError::NotADirectory("/nowhere".to_string()));
    }

    #[test]
    fn test_take_moves_bytes_out() {
        let mut fs = VirtualFs::new();
        fs.mkdir("/working").unwrap();
        fs.write("/working/out.bsp", vec![1, 2, 3]).unwrap();

        assert_eq!(fs.take("/working/out.bsp").unwrap(), vec![1, 2, 3]);
        assert!(!fs.exists("/working/out.bsp"));
    }

    #[test]
    fn test_rmdir_refuses_nonempty() {
        let mut fs = VirtualFs::new();
        fs.mkdir("/working").unwrap();
        fs.write("/working/a", Vec::new()).unwrap();

        assert_eq!(
            fs.rmdir("/working").unwrap_err(),
            VfsError::NotEmpty("/working".to_string())
        );
        fs.remove_file("/working/a").unwrap();
        fs.rmdir("/working").unwrap();
        assert!(!fs.exists("/working"));
    }

    #[test]
    fn test_remove_dir_all_takes_nested_content() {
        let mut fs = VirtualFs::new();
        fs.mkdir("/working").unwrap();
        fs.mkdir("/working/sub").unwrap();
        fs.write("/working/sub/deep.tmp", Vec::new()).unwrap();
        fs.write("/working/a.bsp", Vec::new()).unwrap();

        fs.remove_dir_all("/working/sub").unwrap();

        assert!(!fs.exists("/working/sub"));
        assert!(!fs.exists("/working/sub/deep.tmp"));
        // Siblings untouched.
        assert!(fs.exists("/working/a.bsp"));
    }

    #[test]
    fn test_read_dir_sorted_direct_children() {
        let mut fs = VirtualFs::new();
        fs.mkdir("/working").unwrap();
        fs.mkdir("/working/sub").unwrap();
        fs.write("/working/b.prt", Vec::new()).unwrap();
        fs.write("/working/a.bsp", Vec::new()).unwrap();
        fs.write("/working/sub/deep", Vec::new()).unwrap();

        assert_eq!(fs.read_dir("/working").unwrap(), vec!["a.bsp", "b.prt", "sub"]);
    }
}
