use std::time::Duration;

pub mod cleaner;
pub mod dispatcher;
pub mod filters;
pub mod injector;
pub mod patch_builder;

pub use cleaner::Cleaner;
pub use dispatcher::{ConfigMapController, DispatchContext, Reconciler};
pub use filters::EventFilter;
pub use injector::Injector;
use k8s_openapi::api::core::v1::ConfigMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    common::{ResourceKey, FIELD_MANAGER},
    services::{BundleSourceError, MergePatcher, PatchError},
};

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ControllerError {
    #[error("patch failed {0}")]
    PatchFailed(String),
    #[error("bundle unavailable {0}")]
    BundleUnavailable(String),
    #[error("reconcile cancelled")]
    Cancelled,
    #[error("invalid payload {0}")]
    InvalidPayload(String),
}

impl ControllerError {
    /// Contract violations are not worth retrying until the object changes.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ControllerError::InvalidPayload(_))
    }
}

impl From<BundleSourceError> for ControllerError {
    fn from(error: BundleSourceError) -> Self {
        ControllerError::BundleUnavailable(error.to_string())
    }
}

const RECONCILE_ERROR_WAIT: Duration = Duration::from_secs(10);

type Result<T, E = ControllerError> = std::result::Result<T, E>;

/// Submits `patch` as a forced apply under [`FIELD_MANAGER`]. A missing resource means there is nothing to converge.
pub(crate) async fn submit_patch(patcher: &dyn MergePatcher, key: &ResourceKey, patch: &ConfigMap, cancel: &CancellationToken) -> Result<()> {
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ControllerError::Cancelled),
        result = patcher.apply(FIELD_MANAGER, key, patch, true) => result,
    };

    match result {
        Ok(applied) => {
            debug!("patch applied, resource version {:?}", applied.metadata.resource_version);
            Ok(())
        },
        Err(PatchError::NotFound) => {
            info!("{key} no longer exists, nothing to do");
            Ok(())
        },
        Err(PatchError::Invalid(message)) => {
            warn!("patch rejected {message}");
            Err(ControllerError::InvalidPayload(message))
        },
        Err(e @ (PatchError::Conflict(_) | PatchError::Transient(_))) => {
            warn!("patch failed {e}");
            Err(ControllerError::PatchFailed(e.to_string()))
        },
    }
}
