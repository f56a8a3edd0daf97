use std::sync::Arc;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use typed_builder::TypedBuilder;

use super::{dispatcher::Reconciler, filters::EventFilter, patch_builder, submit_patch, ControllerError};
use crate::{
    common::{ResourceKey, CLEANER_CONTROLLER_NAME},
    services::MergePatcher,
};

type Result<T, E = ControllerError> = std::result::Result<T, E>;

/// Releases the bundle and hash from ConfigMaps which stopped asking for the bundle.
#[derive(TypedBuilder)]
pub struct Cleaner {
    patcher: Arc<dyn MergePatcher>,
}

#[async_trait]
impl Reconciler for Cleaner {
    fn name(&self) -> &'static str {
        CLEANER_CONTROLLER_NAME
    }

    fn filter(&self) -> EventFilter {
        EventFilter::cleaner()
    }

    #[instrument(level = "info", name = "Cleaner", skip_all, fields(id = %key))]
    async fn reconcile(&self, key: &ResourceKey, cancel: &CancellationToken) -> Result<Action> {
        debug!("releasing injected fields");
        submit_patch(self.patcher.as_ref(), key, &patch_builder::build_retract_patch(key), cancel).await?;
        Ok(Action::await_change())
    }
}
