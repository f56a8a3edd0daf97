mod resource_key;

pub use resource_key::ResourceKey;

/// Label requesting that the trust bundle be injected into a ConfigMap.
pub const INJECT_LABEL: &str = "trust-manager.io/inject-bundle";
/// Annotation carrying the hash of the last injected bundle.
pub const HASH_ANNOTATION: &str = "trust.cert-manager.io/hash";
/// Data key the bundle is written to.
pub const BUNDLE_DATA_KEY: &str = "ca.crt";
/// Field manager used for every write issued by the injector and the cleaner.
pub const FIELD_MANAGER: &str = "trust-manager-injector";

pub const INJECTOR_CONTROLLER_NAME: &str = "configmap-injector";
pub const CLEANER_CONTROLLER_NAME: &str = "configmap-injector-cleaner";
