use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VolumeError {
    #[error("No such file or directory '{path}'")]
    NotFound { path: String },
    #[error("'{path}' already exists")]
    AlreadyExists { path: String },
    #[error("Parent directory of '{path}' does not exist")]
    MissingParent { path: String },
    #[error("'{path}' is a directory")]
    IsDirectory { path: String },
    #[error("'{path}' is not valid UTF-8 text")]
    NotText { path: String },
    #[error("Unknown volume '{volume}'")]
    UnknownVolume { volume: String },
    #[error("Volume '{volume}' is read-only")]
    ReadOnly { volume: String },
    #[error("'{path}' is not a volume path")]
    InvalidPath { path: String },
}

/// A storage volume addressed by absolute paths.
pub trait Volume {
    fn exists_sync(&self, path: &str) -> bool;
    fn mkdir_sync(&mut self, path: &str) -> Result<(), VolumeError>;
    fn write_file_sync(&mut self, path: &str, contents: &[u8]) -> Result<(), VolumeError>;
    fn read_file_sync(&self, path: &str) -> Result<Vec<u8>, VolumeError>;

    /// Canonical form of `path`: rooted, `.`/`..` resolved, no repeated or
    /// trailing separators. Empty input stays empty.
    fn normalize(&self, path: &str) -> String {
        normalize(path)
    }
}

pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

/// Volume kept entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryVolume {
    directories: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl Default for MemoryVolume {
    fn default() -> Self {
        Self {
            directories: BTreeSet::from(["/".to_string()]),
            files: BTreeMap::new(),
        }
    }
}

impl MemoryVolume {
    pub fn new() -> Self {
        Self::default()
    }

    /// File paths in lexical order.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl Volume for MemoryVolume {
    fn exists_sync(&self, path: &str) -> bool {
        let path = normalize(path);
        self.directories.contains(&path) || self.files.contains_key(&path)
    }

    fn mkdir_sync(&mut self, path: &str) -> Result<(), VolumeError> {
        let path = normalize(path);
        if self.exists_sync(&path) {
            return Err(VolumeError::AlreadyExists { path });
        }
        if !self.directories.contains(parent(&path)) {
            return Err(VolumeError::MissingParent { path });
        }
        self.directories.insert(path);
        Ok(())
    }

    fn write_file_sync(&mut self, path: &str, contents: &[u8]) -> Result<(), VolumeError> {
        let path = normalize(path);
        if self.directories.contains(&path) {
            return Err(VolumeError::IsDirectory { path });
        }
        if !self.directories.contains(parent(&path)) {
            return Err(VolumeError::MissingParent { path });
        }
        self.files.insert(path, contents.to_vec());
        Ok(())
    }

    fn read_file_sync(&self, path: &str) -> Result<Vec<u8>, VolumeError> {
        let path = normalize(path);
        if self.directories.contains(&path) {
            return Err(VolumeError::IsDirectory { path });
        }
        self.files
            .get(&path)
            .cloned()
            .ok_or(VolumeError::NotFound { path })
    }
}

/// Creates `directory` and every missing ancestor.
pub fn mkdir_tree(volume: &mut dyn Volume, directory: &str) -> Result<(), VolumeError> {
    let directory = volume.normalize(directory);
    let mut current = String::new();
    for segment in directory.split('/').filter(|segment| !segment.is_empty()) {
        current.push('/');
        current.push_str(segment);
        if !volume.exists_sync(&current) {
            volume.mkdir_sync(&current)?;
        }
    }
    Ok(())
}
