use std::sync::Arc;

use futures::FutureExt;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod common;
pub mod configuration;
pub mod controllers;
pub mod services;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

use configuration::Configuration;
use controllers::{Cleaner, ConfigMapController, DispatchContext, Injector};
use services::{KubeConfigMapPatcher, MergePatcher};

/// Runs the injector and the cleaner until `shutdown` is cancelled.
pub async fn start(configuration: Configuration, shutdown: CancellationToken) -> Result<()> {
    info!("Bundle injector started");
    let client = Client::try_default().await?;

    let bundle_source = configuration.bundle_source.build(client.clone());
    let patcher: Arc<dyn MergePatcher> = Arc::new(KubeConfigMapPatcher::builder().client(client.clone()).build());

    let injector = Injector::builder()
        .bundle_source(bundle_source)
        .patcher(Arc::clone(&patcher))
        .resync_interval(configuration.resync_interval())
        .build();
    let cleaner = Cleaner::builder().patcher(patcher).build();

    let injector_controller = ConfigMapController::builder()
        .ctx(Arc::new(
            DispatchContext::builder()
                .client(client.clone())
                .reconciler(Arc::new(injector))
                .shutdown(shutdown.clone())
                .reconcile_timeout(configuration.reconcile_timeout())
                .concurrency(configuration.concurrency())
                .build(),
        ))
        .build();

    let cleaner_controller = ConfigMapController::builder()
        .ctx(Arc::new(
            DispatchContext::builder()
                .client(client)
                .reconciler(Arc::new(cleaner))
                .shutdown(shutdown)
                .reconcile_timeout(configuration.reconcile_timeout())
                .concurrency(configuration.concurrency())
                .build(),
        ))
        .build();

    let injector_controller_task = async move {
        info!("Injector controller...started");
        injector_controller.get_controller().await;
        info!("Injector controller...stopped");
    };

    let cleaner_controller_task = async move {
        info!("Cleaner controller...started");
        cleaner_controller.get_controller().await;
        info!("Cleaner controller...stopped");
    };

    futures::future::join_all(vec![injector_controller_task.boxed(), cleaner_controller_task.boxed()]).await;
    info!("Bundle injector stopped");
    Ok(())
}
