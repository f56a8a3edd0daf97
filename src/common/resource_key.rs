use std::fmt::Display;

use kube::{Resource, ResourceExt};

use crate::controllers::ControllerError;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn namespaced(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
        }
    }

    /// Identity of a watched object. ConfigMaps are namespaced so both parts must be present.
    pub fn try_from_resource<R: Resource>(resource: &R) -> Result<Self, ControllerError> {
        let Some(name) = resource.meta().name.clone().filter(|name| !name.is_empty()) else {
            return Err(ControllerError::InvalidPayload("Resource name is not provided".to_owned()));
        };
        let Some(namespace) = resource.namespace().filter(|namespace| !namespace.is_empty()) else {
            return Err(ControllerError::InvalidPayload(format!("Resource {name} has no namespace")));
        };
        Ok(Self { namespace, name })
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
