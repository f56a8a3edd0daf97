use kube::ResourceExt;

use crate::common::{HASH_ANNOTATION, INJECT_LABEL};

/// Predicate deciding whether a watched object is handed to a controller.
///
/// Filters only look at labels and annotations and are evaluated by the dispatch layer against
/// the current cached object, so a reconcile always starts from the latest observed state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventFilter {
    HasLabel(String),
    HasAnnotation(String),
    Not(Box<EventFilter>),
    All(Vec<EventFilter>),
}

impl EventFilter {
    pub fn has_label(key: &str) -> Self {
        Self::HasLabel(key.to_owned())
    }

    pub fn has_annotation(key: &str) -> Self {
        Self::HasAnnotation(key.to_owned())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn all(filters: Vec<EventFilter>) -> Self {
        Self::All(filters)
    }

    /// Objects asking for the bundle.
    pub fn injector() -> Self {
        Self::has_label(INJECT_LABEL)
    }

    /// Objects we injected into earlier which no longer ask for the bundle.
    pub fn cleaner() -> Self {
        Self::all(vec![Self::has_annotation(HASH_ANNOTATION), Self::has_label(INJECT_LABEL).not()])
    }

    pub fn matches<R: ResourceExt>(&self, resource: &R) -> bool {
        match self {
            Self::HasLabel(key) => resource.labels().contains_key(key),
            Self::HasAnnotation(key) => resource.annotations().contains_key(key),
            Self::Not(inner) => !inner.matches(resource),
            Self::All(filters) => filters.iter().all(|filter| filter.matches(resource)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use kube_core::{PartialObjectMeta, PartialObjectMetaExt};

    use super::EventFilter;
    use crate::common::{HASH_ANNOTATION, INJECT_LABEL};

    fn config_map(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> ConfigMap {
        let to_map = |pairs: &[(&str, &str)]| pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect::<BTreeMap<_, _>>();
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("cm-1".to_owned()),
                namespace: Some("default".to_owned()),
                labels: Some(to_map(labels)),
                annotations: Some(to_map(annotations)),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_has_label_ignores_value() {
        let filter = EventFilter::has_label(INJECT_LABEL);
        assert!(filter.matches(&config_map(&[(INJECT_LABEL, "foo")], &[])));
        assert!(filter.matches(&config_map(&[(INJECT_LABEL, "")], &[])));
        assert!(!filter.matches(&config_map(&[("app", "my-app")], &[])));
        assert!(!filter.matches(&ConfigMap::default()));
    }

    #[test]
    fn test_has_annotation_does_not_look_at_labels() {
        let filter = EventFilter::has_annotation(HASH_ANNOTATION);
        assert!(filter.matches(&config_map(&[], &[(HASH_ANNOTATION, "abc")])));
        assert!(!filter.matches(&config_map(&[(HASH_ANNOTATION, "abc")], &[])));
    }

    #[test]
    fn test_not_and_all() {
        let filter = EventFilter::has_label("a").not();
        assert!(filter.matches(&config_map(&[], &[])));
        assert!(!filter.matches(&config_map(&[("a", "1")], &[])));

        let filter = EventFilter::all(vec![EventFilter::has_label("a"), EventFilter::has_annotation("b")]);
        assert!(filter.matches(&config_map(&[("a", "1")], &[("b", "2")])));
        assert!(!filter.matches(&config_map(&[("a", "1")], &[])));
        assert!(EventFilter::all(vec![]).matches(&ConfigMap::default()));
    }

    #[test]
    fn test_injector_and_cleaner_are_mutually_exclusive() {
        let injector = EventFilter::injector();
        let cleaner = EventFilter::cleaner();
        let states = [
            config_map(&[], &[]),
            config_map(&[(INJECT_LABEL, "foo")], &[]),
            config_map(&[(INJECT_LABEL, "foo")], &[(HASH_ANNOTATION, "abc")]),
            config_map(&[("app", "my-app")], &[(HASH_ANNOTATION, "abc")]),
        ];
        let expected = [(false, false), (true, false), (true, false), (false, true)];
        for (state, (inject, clean)) in states.iter().zip(expected) {
            assert_eq!(injector.matches(state), inject);
            assert_eq!(cleaner.matches(state), clean);
            assert!(!(injector.matches(state) && cleaner.matches(state)));
        }
    }

    #[test]
    fn test_filters_work_on_metadata_only_objects() {
        let meta: PartialObjectMeta<ConfigMap> = config_map(&[], &[(HASH_ANNOTATION, "abc")]).metadata.into_response_partial();
        assert!(EventFilter::cleaner().matches(&meta));
        assert!(!EventFilter::injector().matches(&meta));
    }
}
