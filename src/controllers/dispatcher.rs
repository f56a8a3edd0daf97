use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::{future::BoxFuture, FutureExt, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    runtime::{
        controller::{self, Action},
        metadata_watcher, reflector, watcher, Controller, WatchStreamExt,
    },
    Api, Client,
};
use kube_core::PartialObjectMeta;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use super::{filters::EventFilter, ControllerError, RECONCILE_ERROR_WAIT};
use crate::common::ResourceKey;

type Result<T, E = ControllerError> = std::result::Result<T, E>;

/// Level-triggered handler for one watch. Only the identity of the object is handed over, the
/// handler must converge whatever the live state is when it runs.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    fn name(&self) -> &'static str;
    fn filter(&self) -> EventFilter;
    async fn reconcile(&self, key: &ResourceKey, cancel: &CancellationToken) -> Result<Action>;
}

#[derive(TypedBuilder)]
pub struct DispatchContext<R> {
    client: Client,
    reconciler: Arc<R>,
    shutdown: CancellationToken,
    reconcile_timeout: Duration,
    #[builder(default = 4)]
    concurrency: u16,
}

/// Metadata-only watch over every ConfigMap, filtered with the reconciler's [`EventFilter`] and
/// driven by a kube [`Controller`], which keeps at most one reconcile in flight per object.
#[derive(TypedBuilder)]
pub struct ConfigMapController<R> {
    ctx: Arc<DispatchContext<R>>,
}

impl<R: Reconciler> ConfigMapController<R> {
    pub fn get_controller(&'_ self) -> BoxFuture<'_, ()> {
        let context = &self.ctx;
        let name = context.reconciler.name();
        let filter = context.reconciler.filter();
        let shutdown = context.shutdown.clone();

        let (reader, writer) = reflector::store::<PartialObjectMeta<ConfigMap>>();
        let stream = metadata_watcher(Api::<ConfigMap>::all(context.client.clone()), watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .applied_objects()
            .try_filter(move |object| futures::future::ready(filter.matches(object)));

        Controller::for_stream(stream, reader)
            .with_config(controller::Config::default().concurrency(context.concurrency))
            .graceful_shutdown_on(async move { shutdown.cancelled().await })
            .run(Self::reconcile, Self::error_policy, Arc::clone(context))
            .for_each(move |result| {
                match result {
                    Ok((object, action)) => debug!("{name} reconciled {object} {action:?}"),
                    Err(e) => warn!("{name} reconcile failed {e}"),
                }
                futures::future::ready(())
            })
            .boxed()
    }

    #[allow(clippy::needless_pass_by_value)]
    fn error_policy(_object: Arc<PartialObjectMeta<ConfigMap>>, err: &ControllerError, _ctx: Arc<DispatchContext<R>>) -> Action {
        if err.is_retryable() {
            Action::requeue(RECONCILE_ERROR_WAIT)
        } else {
            Action::await_change()
        }
    }

    async fn reconcile(object: Arc<PartialObjectMeta<ConfigMap>>, ctx: Arc<DispatchContext<R>>) -> Result<Action> {
        let key = ResourceKey::try_from_resource(&*object)?;
        // requeues hand over the cached object whether or not it still passes the filter
        if !ctx.reconciler.filter().matches(&*object) {
            debug!("{} skipping {key}, filter no longer matches", ctx.reconciler.name());
            return Ok(Action::await_change());
        }
        reconcile_with_deadline(ctx.reconciler.as_ref(), &key, &ctx.shutdown, ctx.reconcile_timeout).await
    }
}

/// Runs one reconcile under a child of `shutdown`, cancelling it once `timeout` elapses.
pub(crate) async fn reconcile_with_deadline<R: Reconciler + ?Sized>(
    reconciler: &R,
    key: &ResourceKey,
    shutdown: &CancellationToken,
    timeout: Duration,
) -> Result<Action> {
    let cancel = shutdown.child_token();
    if let Ok(result) = tokio::time::timeout(timeout, reconciler.reconcile(key, &cancel)).await {
        result
    } else {
        cancel.cancel();
        warn!("{} reconcile of {key} did not finish within {timeout:?}", reconciler.name());
        Err(ControllerError::Cancelled)
    }
}
