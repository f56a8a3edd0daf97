use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{Patch, PatchParams},
    Api, Client,
};
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use super::patcher::{MergePatcher, PatchError};
use crate::common::ResourceKey;

/// Server-side apply against the Kubernetes API.
#[derive(Clone, TypedBuilder)]
pub struct KubeConfigMapPatcher {
    client: Client,
}

#[async_trait]
impl MergePatcher for KubeConfigMapPatcher {
    async fn apply(&self, field_manager: &str, key: &ResourceKey, patch: &ConfigMap, force: bool) -> Result<ConfigMap, PatchError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &key.namespace);
        let mut patch_params = PatchParams::apply(field_manager);
        if force {
            patch_params = patch_params.force();
        }

        match api.patch(&key.name, &patch_params, &Patch::Apply(patch)).await {
            Ok(applied) => {
                debug!("apply {key} ok, resource version {:?}", applied.metadata.resource_version);
                Ok(applied)
            },
            Err(e) => {
                warn!("apply {key} failed {e:?}");
                Err(PatchError::from(e))
            },
        }
    }
}
