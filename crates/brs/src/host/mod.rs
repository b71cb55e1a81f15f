//! Host-side plumbing: device description, storage volumes, packages.

pub mod device;
pub mod filesystem;
pub mod package;
pub mod volume;

pub use device::{DeviceContext, DeviceInfo, ModelTable};
pub use filesystem::FileSystem;
pub use package::{
    AssetKind, InstalledPackage, PackageError, PackageMessage, PackagePath, install, run_package,
};
pub use volume::{MemoryVolume, Volume, VolumeError, mkdir_tree};
