use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use super::patcher::{MergePatcher, PatchError};
use crate::common::ResourceKey;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldPath {
    Label(String),
    Annotation(String),
    Data(String),
}

impl FieldPath {
    fn map<'a>(&self, config_map: &'a ConfigMap) -> Option<&'a BTreeMap<String, String>> {
        match self {
            FieldPath::Label(_) => config_map.metadata.labels.as_ref(),
            FieldPath::Annotation(_) => config_map.metadata.annotations.as_ref(),
            FieldPath::Data(_) => config_map.data.as_ref(),
        }
    }

    fn map_mut<'a>(&self, config_map: &'a mut ConfigMap) -> &'a mut Option<BTreeMap<String, String>> {
        match self {
            FieldPath::Label(_) => &mut config_map.metadata.labels,
            FieldPath::Annotation(_) => &mut config_map.metadata.annotations,
            FieldPath::Data(_) => &mut config_map.data,
        }
    }

    fn key(&self) -> &str {
        match self {
            FieldPath::Label(key) | FieldPath::Annotation(key) | FieldPath::Data(key) => key,
        }
    }

    fn get<'a>(&self, config_map: &'a ConfigMap) -> Option<&'a String> {
        self.map(config_map).and_then(|map| map.get(self.key()))
    }

    fn set(&self, config_map: &mut ConfigMap, value: String) {
        self.map_mut(config_map).get_or_insert_with(BTreeMap::new).insert(self.key().to_owned(), value);
    }

    fn remove(&self, config_map: &mut ConfigMap) {
        let map = self.map_mut(config_map);
        if let Some(values) = map.as_mut() {
            values.remove(self.key());
            if values.is_empty() {
                *map = None;
            }
        }
    }

    fn fields_of(config_map: &ConfigMap) -> BTreeMap<FieldPath, String> {
        let labels = config_map.labels().iter().map(|(k, v)| (FieldPath::Label(k.clone()), v.clone()));
        let annotations = config_map.annotations().iter().map(|(k, v)| (FieldPath::Annotation(k.clone()), v.clone()));
        let data = config_map.data.iter().flatten().map(|(k, v)| (FieldPath::Data(k.clone()), v.clone()));
        labels.chain(annotations).chain(data).collect()
    }
}

#[derive(Clone, Debug)]
struct StoredConfigMap {
    object: ConfigMap,
    managed_fields: BTreeMap<String, BTreeSet<FieldPath>>,
    generation: u64,
}

impl StoredConfigMap {
    fn bump_version(&mut self) {
        self.generation += 1;
        self.object.metadata.resource_version = Some(self.generation.to_string());
    }

    fn owned_by_others(&self, field_manager: &str, field: &FieldPath) -> bool {
        self.managed_fields.iter().any(|(manager, fields)| manager != field_manager && fields.contains(field))
    }
}

/// In-process model of server-side apply over ConfigMaps, used by the test suite and for dry runs.
///
/// Tracks which field manager owns each label, annotation and data key, so releasing fields
/// behaves like the API server: only fields owned solely by the applying manager disappear.
/// Unlike server-side apply, applying to a missing object returns [`PatchError::NotFound`] and creates nothing.
#[derive(Clone, Default)]
pub struct InMemoryConfigMapStore {
    objects: Arc<Mutex<HashMap<ResourceKey, StoredConfigMap>>>,
    failures: Arc<Mutex<VecDeque<PatchError>>>,
    apply_calls: Arc<AtomicUsize>,
}

impl InMemoryConfigMapStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_objects(&self) -> Result<MutexGuard<'_, HashMap<ResourceKey, StoredConfigMap>>, PatchError> {
        self.objects.lock().map_err(|_| PatchError::Transient("store lock poisoned".to_owned()))
    }

    /// Creates `config_map`, every field it carries is owned by `field_manager`.
    pub fn create(&self, field_manager: &str, config_map: ConfigMap) -> Result<ConfigMap, PatchError> {
        let key = ResourceKey::try_from_resource(&config_map).map_err(|e| PatchError::Invalid(e.to_string()))?;
        let mut objects = self.lock_objects()?;
        if objects.contains_key(&key) {
            return Err(PatchError::Conflict(format!("{key} already exists")));
        }
        let fields = FieldPath::fields_of(&config_map).into_keys().collect::<BTreeSet<_>>();
        let mut stored = StoredConfigMap {
            object: config_map,
            managed_fields: BTreeMap::new(),
            generation: 0,
        };
        if !fields.is_empty() {
            stored.managed_fields.insert(field_manager.to_owned(), fields);
        }
        stored.bump_version();
        let created = stored.object.clone();
        objects.insert(key, stored);
        Ok(created)
    }

    /// Full replacement of labels, annotations and data, the way an update issued by another client behaves.
    /// Changed or added fields move to `field_manager`, removed fields are dropped from every manager.
    pub fn update(&self, field_manager: &str, config_map: ConfigMap) -> Result<ConfigMap, PatchError> {
        let key = ResourceKey::try_from_resource(&config_map).map_err(|e| PatchError::Invalid(e.to_string()))?;
        let mut objects = self.lock_objects()?;
        let stored = objects.get_mut(&key).ok_or(PatchError::NotFound)?;

        let before = FieldPath::fields_of(&stored.object);
        let after = FieldPath::fields_of(&config_map);
        for fields in stored.managed_fields.values_mut() {
            fields.retain(|field| after.get(field).is_some_and(|value| before.get(field) == Some(value)));
        }
        let updated_fields = after.iter().filter(|(field, value)| before.get(*field) != Some(*value)).map(|(field, _)| field.clone());
        stored.managed_fields.entry(field_manager.to_owned()).or_default().extend(updated_fields);
        stored.managed_fields.retain(|_, fields| !fields.is_empty());

        stored.object.metadata.labels.clone_from(&config_map.metadata.labels);
        stored.object.metadata.annotations.clone_from(&config_map.metadata.annotations);
        stored.object.data.clone_from(&config_map.data);
        if before != after {
            stored.bump_version();
        }
        Ok(stored.object.clone())
    }

    pub fn delete(&self, key: &ResourceKey) -> Result<ConfigMap, PatchError> {
        let mut objects = self.lock_objects()?;
        objects.remove(key).map(|stored| stored.object).ok_or(PatchError::NotFound)
    }

    pub fn get(&self, key: &ResourceKey) -> Option<ConfigMap> {
        self.lock_objects().ok().and_then(|objects| objects.get(key).map(|stored| stored.object.clone()))
    }

    pub fn managed_fields(&self, key: &ResourceKey, field_manager: &str) -> BTreeSet<FieldPath> {
        self.lock_objects()
            .ok()
            .and_then(|objects| objects.get(key).and_then(|stored| stored.managed_fields.get(field_manager).cloned()))
            .unwrap_or_default()
    }

    /// Makes the next apply fail with `error` before touching any object.
    pub fn fail_next_apply(&self, error: PatchError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(error);
        }
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    fn apply_sync(&self, field_manager: &str, key: &ResourceKey, patch: &ConfigMap, force: bool) -> Result<ConfigMap, PatchError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().ok().and_then(|mut failures| failures.pop_front()) {
            return Err(error);
        }
        if patch.metadata.name.as_deref() != Some(key.name.as_str()) || patch.metadata.namespace.as_deref() != Some(key.namespace.as_str()) {
            return Err(PatchError::Invalid(format!("patch identity does not match {key}")));
        }

        let mut objects = self.lock_objects()?;
        let stored = objects.get_mut(key).ok_or(PatchError::NotFound)?;
        let applied = FieldPath::fields_of(patch);

        if !force {
            let conflicts = applied
                .iter()
                .filter(|(field, value)| stored.owned_by_others(field_manager, field) && field.get(&stored.object) != Some(*value))
                .map(|(field, _)| format!("{field:?}"))
                .collect::<Vec<_>>();
            if !conflicts.is_empty() {
                return Err(PatchError::Conflict(format!("{key} fields owned by other managers {}", conflicts.join(", "))));
            }
        }

        let object_before = stored.object.clone();
        let managed_before = stored.managed_fields.clone();
        let previously_owned = stored.managed_fields.remove(field_manager).unwrap_or_default();

        for (field, value) in &applied {
            if field.get(&stored.object) != Some(value) {
                for fields in stored.managed_fields.values_mut() {
                    fields.remove(field);
                }
                field.set(&mut stored.object, value.clone());
            }
        }
        for field in previously_owned.iter().filter(|field| !applied.contains_key(*field)) {
            if !stored.owned_by_others(field_manager, field) {
                field.remove(&mut stored.object);
            }
        }

        if !applied.is_empty() {
            stored.managed_fields.insert(field_manager.to_owned(), applied.into_keys().collect());
        }
        stored.managed_fields.retain(|_, fields| !fields.is_empty());

        if stored.object != object_before || stored.managed_fields != managed_before {
            stored.bump_version();
        }
        Ok(stored.object.clone())
    }
}

#[async_trait]
impl MergePatcher for InMemoryConfigMapStore {
    async fn apply(&self, field_manager: &str, key: &ResourceKey, patch: &ConfigMap, force: bool) -> Result<ConfigMap, PatchError> {
        self.apply_sync(field_manager, key, patch, force)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    use super::{FieldPath, InMemoryConfigMapStore};
    use crate::{
        common::ResourceKey,
        services::patchers::{MergePatcher, PatchError},
    };

    fn config_map(name: &str, data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some("default".to_owned()),
                ..Default::default()
            },
            data: Some(data.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect::<BTreeMap<_, _>>()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_apply_does_not_create() {
        let store = InMemoryConfigMapStore::new();
        let key = ResourceKey::namespaced("missing", "default");
        let result = store.apply("manager", &key, &config_map("missing", &[("a", "1")]), true).await;
        assert_eq!(result.unwrap_err(), PatchError::NotFound);
        assert!(store.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_apply_releases_only_own_fields() {
        let store = InMemoryConfigMapStore::new();
        let key = ResourceKey::namespaced("cm", "default");
        store.create("creator", config_map("cm", &[("mine", "x"), ("theirs", "y")])).unwrap();

        // taking over a field with the same value shares it
        store.apply("manager", &key, &config_map("cm", &[("mine", "x"), ("new", "z")]), true).await.unwrap();
        let applied = store.apply("manager", &key, &config_map("cm", &[]), true).await.unwrap();

        let data = applied.data.unwrap();
        assert_eq!(data.get("mine").map(String::as_str), Some("x"));
        assert_eq!(data.get("theirs").map(String::as_str), Some("y"));
        assert!(!data.contains_key("new"));
        assert!(store.managed_fields(&key, "manager").is_empty());
    }

    #[tokio::test]
    async fn test_forced_apply_takes_ownership() {
        let store = InMemoryConfigMapStore::new();
        let key = ResourceKey::namespaced("cm", "default");
        store.create("creator", config_map("cm", &[("shared", "x")])).unwrap();

        let conflict = store.apply("manager", &key, &config_map("cm", &[("shared", "y")]), false).await;
        assert!(matches!(conflict, Err(PatchError::Conflict(_))));

        store.apply("manager", &key, &config_map("cm", &[("shared", "y")]), true).await.unwrap();
        assert!(store.managed_fields(&key, "creator").is_empty());
        assert!(store.managed_fields(&key, "manager").contains(&FieldPath::Data("shared".to_owned())));

        let released = store.apply("manager", &key, &config_map("cm", &[]), true).await.unwrap();
        assert_eq!(released.data, None);
    }

    #[tokio::test]
    async fn test_identical_apply_keeps_resource_version() {
        let store = InMemoryConfigMapStore::new();
        let key = ResourceKey::namespaced("cm", "default");
        store.create("creator", config_map("cm", &[])).unwrap();

        let first = store.apply("manager", &key, &config_map("cm", &[("a", "1")]), true).await.unwrap();
        let second = store.apply("manager", &key, &config_map("cm", &[("a", "1")]), true).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.apply_calls(), 2);
    }

    #[tokio::test]
    async fn test_apply_calls_are_shared_between_clones() {
        let store = InMemoryConfigMapStore::new();
        let other = store.clone();
        let key = ResourceKey::namespaced("cm", "default");
        store.create("creator", config_map("cm", &[])).unwrap();

        let patch = config_map("cm", &[("a", "1")]);
        let (first, second) = tokio::join!(store.apply("manager", &key, &patch, true), other.apply("manager", &key, &patch, true));
        first.unwrap();
        second.unwrap();
        other.fail_next_apply(PatchError::Conflict("stale".to_owned()));
        assert!(store.apply("manager", &key, &patch, true).await.is_err());
        assert!(other.apply("manager", &ResourceKey::namespaced("missing", "default"), &config_map("missing", &[]), true).await.is_err());

        assert_eq!(store.apply_calls(), 4);
        assert_eq!(other.apply_calls(), 4);
    }

    #[tokio::test]
    async fn test_update_drops_removed_fields_from_owners() {
        let store = InMemoryConfigMapStore::new();
        let key = ResourceKey::namespaced("cm", "default");
        store.create("creator", config_map("cm", &[])).unwrap();
        store.apply("manager", &key, &config_map("cm", &[("a", "1")]), true).await.unwrap();

        store.update("editor", config_map("cm", &[("b", "2")])).unwrap();
        assert!(store.managed_fields(&key, "manager").is_empty());
        assert_eq!(store.managed_fields(&key, "editor").len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_and_identity_check() {
        let store = InMemoryConfigMapStore::new();
        let key = ResourceKey::namespaced("cm", "default");
        store.create("creator", config_map("cm", &[])).unwrap();

        store.fail_next_apply(PatchError::Transient("etcd unavailable".to_owned()));
        let failed = store.apply("manager", &key, &config_map("cm", &[("a", "1")]), true).await;
        assert_eq!(failed.unwrap_err(), PatchError::Transient("etcd unavailable".to_owned()));

        let wrong = store.apply("manager", &key, &config_map("other", &[("a", "1")]), true).await;
        assert!(matches!(wrong, Err(PatchError::Invalid(_))));
        assert!(store.get(&key).unwrap().data.unwrap_or_default().is_empty());
    }
}
