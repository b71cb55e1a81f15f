//! Installing a channel package sent by the host and running it.

use super::device::{DeviceContext, DeviceInfo};
use super::volume::{Volume, VolumeError, mkdir_tree};
use crate::components::registry::ComponentRegistry;
use crate::parser::Manifest;
use crate::pipeline::{ErrorSink, LibraryId, RunPipeline, RunReport, SourceUnit};
use crate::runtime::{Evaluator, OutputSink};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where bundled libraries are installed on the `common:` volume.
const LIBRARY_ROOT: &str = "/LibCore";

/// Libraries copied to `common:` on install.
const INSTALLED_LIBRARIES: [LibraryId; 2] = [LibraryId::Core, LibraryId::Defender];

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("Invalid package message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Volume '{0}' is not mounted")]
    MissingVolume(&'static str),
    #[error(transparent)]
    Volume(#[from] VolumeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Source,
    Text,
    Image,
    Font,
    Audio,
}

/// One file of the package. `id` indexes the payload table of its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePath {
    pub url: String,
    pub id: usize,
    #[serde(rename = "type")]
    pub kind: AssetKind,
}

/// Everything the host sends to start a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMessage {
    #[serde(default)]
    pub device: DeviceInfo,
    pub paths: Vec<PackagePath>,
    #[serde(default)]
    pub brs: Vec<String>,
    #[serde(default)]
    pub texts: Vec<String>,
    #[serde(default)]
    pub images: Vec<Vec<u8>>,
    #[serde(default)]
    pub fonts: Vec<Vec<u8>>,
}

impl PackageMessage {
    pub fn from_json(json: &str) -> Result<Self, PackageError> {
        Ok(serde_json::from_str(json)?)
    }

    fn payload(&self, path: &PackagePath) -> Option<Vec<u8>> {
        match path.kind {
            AssetKind::Source => self.brs.get(path.id).map(|text| text.as_bytes().to_vec()),
            AssetKind::Text => self.texts.get(path.id).map(|text| text.as_bytes().to_vec()),
            AssetKind::Image => self.images.get(path.id).cloned(),
            AssetKind::Font => self.fonts.get(path.id).cloned(),
            // Audio is streamed by the host; the file only records its index
            AssetKind::Audio => Some(path.id.to_string().into_bytes()),
        }
    }
}

/// A package written to the device volumes, ready to run.
pub struct InstalledPackage {
    pub device: DeviceContext,
    pub units: Vec<SourceUnit>,
    pub manifest: Manifest,
}

pub fn install(message: &PackageMessage) -> Result<InstalledPackage, PackageError> {
    let mut device = DeviceContext::new(message.device.clone());

    let common = device
        .file_system
        .volume_mut("common:")
        .ok_or(PackageError::MissingVolume("common:"))?;
    for library in INSTALLED_LIBRARIES {
        let path = format!("{LIBRARY_ROOT}/{}", library.path());
        mkdir_tree(&mut *common, parent_directory(&path))?;
        common.write_file_sync(&path, library.source().as_bytes())?;
    }

    let package = device
        .file_system
        .volume_mut("pkg:")
        .ok_or(PackageError::MissingVolume("pkg:"))?;
    let mut units = Vec::new();
    for path in &message.paths {
        let Some(payload) = message.payload(path) else {
            log::warn!("No {:?} payload #{} for '{}'", path.kind, path.id, path.url);
            continue;
        };
        // Sources run even when their copy on pkg: cannot be written
        if path.kind == AssetKind::Source
            && let Some(text) = message.brs.get(path.id)
        {
            units.push(SourceUnit::new(path.url.clone(), text.clone()));
        }
        if let Err(error) = write_asset(&mut *package, &path.url, &payload) {
            log::warn!("Could not write '{}': {error}", path.url);
        }
    }

    let manifest = match package.read_file_sync("/manifest") {
        Ok(bytes) => Manifest::parse(&String::from_utf8_lossy(&bytes)),
        Err(error) => {
            log::debug!("Package has no manifest: {error}");
            Manifest::new()
        }
    };

    log::info!(
        "Installed package with {} file(s), {} source unit(s)",
        message.paths.len(),
        units.len()
    );
    Ok(InstalledPackage {
        device,
        units,
        manifest,
    })
}

fn parent_directory(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn write_asset(volume: &mut dyn Volume, url: &str, contents: &[u8]) -> Result<(), VolumeError> {
    let path = volume.normalize(&format!("/{url}"));
    let directory = parent_directory(&path);
    if !volume.exists_sync(directory) {
        mkdir_tree(volume, directory)?;
    }
    volume.write_file_sync(&path, contents)
}

/// Installs `message` and runs it with the reference evaluator.
pub fn run_package(
    message: &PackageMessage,
    registry: &ComponentRegistry,
    sink: &mut dyn ErrorSink,
    output: Box<dyn OutputSink>,
) -> Result<RunReport, PackageError> {
    let installed = install(message)?;
    let mut interpreter = Evaluator::new(registry);
    Ok(RunPipeline::new(&mut interpreter, sink)
        .manifest(installed.manifest)
        .device(installed.device)
        .output(output)
        .run(&installed.units))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> PackageMessage {
        PackageMessage::from_json(
            r#"{
                "device": {"friendlyName": "Test box"},
                "paths": [
                    {"url": "manifest", "id": 0, "type": "text"},
                    {"url": "source/main.brs", "id": 0, "type": "source"},
                    {"url": "images/icon.png", "id": 0, "type": "image"},
                    {"url": "sounds/beep.wav", "id": 3, "type": "audio"},
                    {"url": "source/missing.brs", "id": 9, "type": "source"}
                ],
                "brs": ["sub main()\nprint \"hi\"\nend sub\n"],
                "texts": ["title=Test\nbs_const=debug=true\n"],
                "images": [[137, 80, 78, 71]]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn install_writes_every_file() {
        let installed = install(&message()).unwrap();
        let package = installed.device.file_system.volume("pkg:").unwrap();
        assert!(package.exists_sync("/source/main.brs"));
        assert_eq!(package.read_file_sync("/images/icon.png").unwrap(), vec![137, 80, 78, 71]);
        assert_eq!(package.read_file_sync("/sounds/beep.wav").unwrap(), b"3");
        assert!(!package.exists_sync("/source/missing.brs"));
        assert_eq!(installed.device.info.friendly_name, "Test box");
    }

    #[test]
    fn install_collects_sources_and_manifest() {
        let installed = install(&message()).unwrap();
        assert_eq!(installed.units.len(), 1);
        assert_eq!(installed.units[0].path, "source/main.brs");
        assert_eq!(installed.manifest.flag("debug"), Some(true));
    }

    #[test]
    fn install_copies_bundled_libraries() {
        let installed = install(&message()).unwrap();
        let common = installed.device.file_system.volume("common:").unwrap();
        let core = common.read_file_sync("/LibCore/v30/bslCore.brs").unwrap();
        assert_eq!(core, LibraryId::Core.source().as_bytes());
        assert!(common.exists_sync("/LibCore/v30/bslDefender.brs"));
    }

    #[test]
    fn unwritable_sources_still_run() {
        let message = PackageMessage::from_json(
            r#"{
                "paths": [
                    {"url": "source", "id": 0, "type": "text"},
                    {"url": "source/main.brs", "id": 0, "type": "source"}
                ],
                "brs": ["x = 1\n"],
                "texts": ["a file where a directory should be"]
            }"#,
        )
        .unwrap();
        let installed = install(&message).unwrap();
        let package = installed.device.file_system.volume("pkg:").unwrap();
        assert!(!package.exists_sync("/source/main.brs"));
        assert_eq!(installed.units.len(), 1);
        assert_eq!(installed.units[0].path, "source/main.brs");
    }

    #[test]
    fn malformed_messages_are_rejected() {
        assert!(matches!(
            PackageMessage::from_json("{\"paths\": 3}"),
            Err(PackageError::Json(_))
        ));
    }
}
