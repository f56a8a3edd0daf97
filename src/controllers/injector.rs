use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use typed_builder::TypedBuilder;

use super::{dispatcher::Reconciler, filters::EventFilter, patch_builder, submit_patch, ControllerError};
use crate::{
    common::{ResourceKey, INJECTOR_CONTROLLER_NAME},
    services::{BundleSource, MergePatcher},
};

type Result<T, E = ControllerError> = std::result::Result<T, E>;

/// Writes the current bundle and its hash into every ConfigMap asking for it.
#[derive(TypedBuilder)]
pub struct Injector {
    bundle_source: Arc<dyn BundleSource>,
    patcher: Arc<dyn MergePatcher>,
    #[builder(default)]
    resync_interval: Option<Duration>,
}

#[async_trait]
impl Reconciler for Injector {
    fn name(&self) -> &'static str {
        INJECTOR_CONTROLLER_NAME
    }

    fn filter(&self) -> EventFilter {
        EventFilter::injector()
    }

    #[instrument(level = "info", name = "Injector", skip_all, fields(id = %key))]
    async fn reconcile(&self, key: &ResourceKey, cancel: &CancellationToken) -> Result<Action> {
        let resolved = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ControllerError::Cancelled),
            resolved = self.bundle_source.resolve(key) => resolved,
        };
        let content = resolved.map_err(|e| {
            warn!("unable to resolve bundle {e}");
            ControllerError::from(e)
        })?;

        let patch = patch_builder::build_inject_patch(key, &content);
        debug!("injecting bundle {}", patch_builder::bundle_hash(&content));
        submit_patch(self.patcher.as_ref(), key, &patch, cancel).await?;

        Ok(self.resync_interval.map_or_else(Action::await_change, Action::requeue))
    }
}
