use std::{path::PathBuf, sync::Arc, time::Duration};

use kube::Client;
use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::{
    common::ResourceKey,
    services::{BundleSource, ConfigMapBundleSource, FileBundleSource},
    Result,
};

const DEFAULT_CONCURRENCY: u16 = 4;
const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct FileBundleSourceConfiguration {
    pub path: PathBuf,
}

#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct ConfigMapBundleSourceConfiguration {
    pub namespace: String,
    pub name: String,
    pub key: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleSourceConfiguration {
    File(FileBundleSourceConfiguration),
    ConfigMap(ConfigMapBundleSourceConfiguration),
}

impl BundleSourceConfiguration {
    pub fn build(&self, client: Client) -> Arc<dyn BundleSource> {
        match self {
            BundleSourceConfiguration::File(file) => Arc::new(FileBundleSource::builder().path(file.path.clone()).build()),
            BundleSourceConfiguration::ConfigMap(config_map) => Arc::new(
                ConfigMapBundleSource::builder()
                    .client(client)
                    .source(ResourceKey::namespaced(&config_map.name, &config_map.namespace))
                    .data_key(config_map.key.clone())
                    .build(),
            ),
        }
    }
}

#[derive(Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    #[builder(default)]
    pub enable_open_telemetry: Option<bool>,
    #[builder(default)]
    pub concurrency: Option<u16>,
    #[builder(default)]
    pub reconcile_timeout_secs: Option<u64>,
    #[builder(default)]
    pub resync_interval_secs: Option<u64>,
    pub bundle_source: BundleSourceConfiguration,
}

#[derive(Error, Debug, PartialEq, Eq)]
enum ConfigurationError {
    #[error("bundle file path must be not empty")]
    BundleFilePath,
    #[error("bundle config map namespace, name and key must be not empty")]
    BundleConfigMap,
    #[error("concurrency must be greater than zero")]
    Concurrency,
    #[error("reconcile timeout must be greater than zero")]
    ReconcileTimeout,
    #[error("resync interval must be greater than zero")]
    ResyncInterval,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        match &self.bundle_source {
            BundleSourceConfiguration::File(file) if file.path.as_os_str().is_empty() => return Err(ConfigurationError::BundleFilePath.into()),
            BundleSourceConfiguration::ConfigMap(config_map)
                if config_map.namespace.is_empty() || config_map.name.is_empty() || config_map.key.is_empty() =>
            {
                return Err(ConfigurationError::BundleConfigMap.into());
            },
            _ => {},
        }
        match (self.concurrency, self.reconcile_timeout_secs, self.resync_interval_secs) {
            (Some(0), _, _) => Err(ConfigurationError::Concurrency.into()),
            (_, Some(0), _) => Err(ConfigurationError::ReconcileTimeout.into()),
            (_, _, Some(0)) => Err(ConfigurationError::ResyncInterval.into()),
            _ => Ok(()),
        }
    }

    pub fn concurrency(&self) -> u16 {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        self.reconcile_timeout_secs.map_or(DEFAULT_RECONCILE_TIMEOUT, Duration::from_secs)
    }

    pub fn resync_interval(&self) -> Option<Duration> {
        self.resync_interval_secs.map(Duration::from_secs)
    }
}
