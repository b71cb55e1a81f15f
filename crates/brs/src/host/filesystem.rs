use super::volume::{MemoryVolume, Volume, VolumeError};
use std::collections::BTreeMap;

/// Volumes every device has.
pub const DEFAULT_VOLUMES: [&str; 4] = ["pkg:", "common:", "tmp:", "cachefs:"];

/// Volumes interpreted code may only read.
const READ_ONLY_VOLUMES: [&str; 2] = ["pkg:", "common:"];

/// Named volumes addressed as `volume:/path`.
pub struct FileSystem {
    volumes: BTreeMap<String, Box<dyn Volume>>,
}

impl FileSystem {
    pub fn empty() -> Self {
        Self {
            volumes: BTreeMap::new(),
        }
    }

    pub fn mount(&mut self, name: &str, volume: Box<dyn Volume>) -> Option<Box<dyn Volume>> {
        self.volumes.insert(name.to_ascii_lowercase(), volume)
    }

    pub fn volume(&self, name: &str) -> Option<&dyn Volume> {
        self.volumes
            .get(&name.to_ascii_lowercase())
            .map(|volume| &**volume)
    }

    pub fn volume_mut(&mut self, name: &str) -> Option<&mut (dyn Volume + 'static)> {
        self.volumes
            .get_mut(&name.to_ascii_lowercase())
            .map(|volume| &mut **volume)
    }

    pub fn volume_names(&self) -> impl Iterator<Item = &str> {
        self.volumes.keys().map(String::as_str)
    }

    /// Splits `pkg:/a/b` into `("pkg:", "/a/b")`.
    pub fn split(path: &str) -> Result<(String, &str), VolumeError> {
        match path.find(':') {
            Some(index) if index > 0 => Ok((
                path[..=index].to_ascii_lowercase(),
                &path[index + 1..],
            )),
            _ => Err(VolumeError::InvalidPath {
                path: path.to_string(),
            }),
        }
    }

    pub fn read_text(&self, path: &str) -> Result<String, VolumeError> {
        let (name, local) = Self::split(path)?;
        let volume = self
            .volume(&name)
            .ok_or(VolumeError::UnknownVolume { volume: name })?;
        let bytes = volume.read_file_sync(local)?;
        String::from_utf8(bytes).map_err(|_| VolumeError::NotText {
            path: path.to_string(),
        })
    }

    /// Writes on behalf of interpreted code, which cannot touch read-only
    /// volumes.
    pub fn write_text(&mut self, path: &str, text: &str) -> Result<(), VolumeError> {
        let (name, local) = Self::split(path)?;
        if READ_ONLY_VOLUMES.contains(&name.as_str()) {
            return Err(VolumeError::ReadOnly { volume: name });
        }
        let volume = self
            .volume_mut(&name)
            .ok_or(VolumeError::UnknownVolume {
                volume: name.clone(),
            })?;
        volume.write_file_sync(local, text.as_bytes())
    }
}

impl Default for FileSystem {
    fn default() -> Self {
        let mut file_system = Self::empty();
        for name in DEFAULT_VOLUMES {
            file_system.mount(name, Box::new(MemoryVolume::new()));
        }
        file_system
    }
}
