use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use sha2::{Digest, Sha256};

use crate::common::{ResourceKey, BUNDLE_DATA_KEY, HASH_ANNOTATION};

/// Lowercase hex SHA-256 of the bundle, written to the hash annotation.
pub fn bundle_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Desired state carrying the bundle and its hash. Fields not listed here are left to other writers.
pub fn build_inject_patch(key: &ResourceKey, content: &str) -> ConfigMap {
    let mut patch = build_retract_patch(key);
    patch.metadata.annotations = Some(BTreeMap::from([(HASH_ANNOTATION.to_owned(), bundle_hash(content))]));
    patch.data = Some(BTreeMap::from([(BUNDLE_DATA_KEY.to_owned(), content.to_owned())]));
    patch
}

/// Desired state claiming no fields at all, applying it releases whatever the field manager owned before.
pub fn build_retract_patch(key: &ResourceKey) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(key.name.clone()),
            namespace: Some(key.namespace.clone()),
            ..Default::default()
        },
        ..Default::default()
    }
}
