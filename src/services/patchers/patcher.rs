use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;

use crate::common::ResourceKey;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("resource not found")]
    NotFound,
    #[error("conflict {0}")]
    Conflict(String),
    #[error("transient failure {0}")]
    Transient(String),
    #[error("patch rejected {0}")]
    Invalid(String),
}

impl From<kube::Error> for PatchError {
    fn from(error: kube::Error) -> Self {
        match &error {
            kube::Error::Api(response) => match response.code {
                404 => PatchError::NotFound,
                409 => PatchError::Conflict(response.message.clone()),
                400 | 422 => PatchError::Invalid(response.message.clone()),
                _ => PatchError::Transient(response.message.clone()),
            },
            _ => PatchError::Transient(error.to_string()),
        }
    }
}

/// Field-scoped declarative merge of a partial ConfigMap against live state.
///
/// Every field present in `patch` becomes owned by `field_manager`. Fields the manager owned
/// before and which are missing from `patch` are released, and removed from the object when no
/// other manager owns them. `force` resolves conflicts in favour of `field_manager`.
///
/// Whether a missing resource is created depends on the implementation. Server-side apply
/// against the API server upserts, so callers only reconcile objects they have observed.
#[async_trait]
pub trait MergePatcher: Send + Sync {
    async fn apply(&self, field_manager: &str, key: &ResourceKey, patch: &ConfigMap, force: bool) -> Result<ConfigMap, PatchError>;
}
