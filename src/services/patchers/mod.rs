mod config_map_patcher;
mod inmemory;
mod patcher;

pub use config_map_patcher::KubeConfigMapPatcher;
pub use inmemory::{FieldPath, InMemoryConfigMapStore};
pub use patcher::{MergePatcher, PatchError};
