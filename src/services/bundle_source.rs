use std::path::PathBuf;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use rustls_pki_types::{pem::PemObject, CertificateDer};
use tracing::debug;
use typed_builder::TypedBuilder;

use crate::common::ResourceKey;

#[derive(thiserror::Error, Debug)]
pub enum BundleSourceError {
    #[error("unable to read bundle {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to fetch bundle {0}")]
    Kube(#[from] kube::Error),
    #[error("bundle key {key} missing in {source_name}")]
    MissingKey { source_name: String, key: String },
    #[error("bundle contains no certificates")]
    NoCertificates,
    #[error("bundle is not valid PEM {0}")]
    InvalidPem(String),
}

/// Supplies the bundle injected into a given ConfigMap. Content is opaque to the controllers.
#[async_trait]
pub trait BundleSource: Send + Sync {
    async fn resolve(&self, key: &ResourceKey) -> Result<String, BundleSourceError>;
}

fn validate_pem(content: &str) -> Result<(), BundleSourceError> {
    let mut certificates = 0;
    for certificate in CertificateDer::pem_slice_iter(content.as_bytes()) {
        certificate.map_err(|e| BundleSourceError::InvalidPem(format!("{e:?}")))?;
        certificates += 1;
    }
    if certificates == 0 {
        return Err(BundleSourceError::NoCertificates);
    }
    Ok(())
}

#[derive(Clone, Debug, TypedBuilder)]
pub struct StaticBundleSource {
    #[builder(setter(into))]
    content: String,
}

#[async_trait]
impl BundleSource for StaticBundleSource {
    async fn resolve(&self, _key: &ResourceKey) -> Result<String, BundleSourceError> {
        Ok(self.content.clone())
    }
}

/// Reads the bundle from disk on every resolve, so a rotated file is picked up by the next reconcile.
#[derive(Clone, Debug, TypedBuilder)]
pub struct FileBundleSource {
    #[builder(setter(into))]
    path: PathBuf,
}

#[async_trait]
impl BundleSource for FileBundleSource {
    async fn resolve(&self, key: &ResourceKey) -> Result<String, BundleSourceError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        validate_pem(&content)?;
        debug!("resolved bundle for {key} from {}", self.path.display());
        Ok(content)
    }
}

/// Reads the bundle from one key of a source ConfigMap.
#[derive(Clone, TypedBuilder)]
pub struct ConfigMapBundleSource {
    client: Client,
    source: ResourceKey,
    #[builder(setter(into))]
    data_key: String,
}

#[async_trait]
impl BundleSource for ConfigMapBundleSource {
    async fn resolve(&self, key: &ResourceKey) -> Result<String, BundleSourceError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.source.namespace);
        let source = api.get(&self.source.name).await?;
        let Some(content) = source.data.and_then(|mut data| data.remove(&self.data_key)) else {
            return Err(BundleSourceError::MissingKey {
                source_name: self.source.to_string(),
                key: self.data_key.clone(),
            });
        };
        validate_pem(&content)?;
        debug!("resolved bundle for {key} from {}", self.source);
        Ok(content)
    }
}
