pub mod bundle_source;
pub mod patchers;

pub use bundle_source::{BundleSource, BundleSourceError, ConfigMapBundleSource, FileBundleSource, StaticBundleSource};
pub use patchers::{InMemoryConfigMapStore, KubeConfigMapPatcher, MergePatcher, PatchError};
