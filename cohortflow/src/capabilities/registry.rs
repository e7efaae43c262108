//! Name-keyed registry of transforms.

use super::Transform;
use crate::errors::ConfigError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of transform instances, keyed by [`Transform::name`].
#[derive(Default)]
pub struct TransformRegistry {
    transforms: RwLock<HashMap<String, Arc<dyn Transform>>>,
}

impl TransformRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transform under its own name.
    ///
    /// Returns the transform previously registered under that name, if any.
    pub fn register(&self, transform: Arc<dyn Transform>) -> Option<Arc<dyn Transform>> {
        let name = transform.name().to_string();
        self.transforms.write().insert(name, transform)
    }

    /// Registers a transform and returns the registry.
    #[must_use]
    pub fn with(self, transform: Arc<dyn Transform>) -> Self {
        self.register(transform);
        self
    }

    /// Looks up a transform by identifier.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.read().get(name).cloned()
    }

    /// Checks if a transform is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.transforms.read().contains_key(name)
    }

    /// Lists registered transform identifiers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.transforms.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered transforms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.read().is_empty()
    }

    /// Resolves an ordered list of identifiers.
    ///
    /// Duplicates are kept; the result has the same length and order as `ids`.
    pub fn resolve<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Arc<dyn Transform>>, ConfigError> {
        let transforms = self.transforms.read();
        ids.iter()
            .map(|id| {
                let id = id.as_ref();
                transforms
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownTransform(id.to_string()))
            })
            .collect()
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("transforms", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{FnTransform, IdentityTransform};

    fn upper() -> Arc<dyn Transform> {
        Arc::new(FnTransform::new("upper", |artifact| {
            Ok(artifact.payload.to_ascii_uppercase())
        }))
    }

    #[test]
    fn test_register_and_get() {
        let registry = TransformRegistry::new();
        assert!(registry.is_empty());

        assert!(registry.register(Arc::new(IdentityTransform::new())).is_none());
        assert!(registry.contains("identity"));
        assert!(registry.get("identity").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_replaces() {
        let registry = TransformRegistry::new();
        registry.register(Arc::new(IdentityTransform::named("t1")));
        let previous = registry.register(Arc::new(IdentityTransform::named("t1")));

        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_keeps_order_and_duplicates() {
        let registry = TransformRegistry::new()
            .with(Arc::new(IdentityTransform::new()))
            .with(upper());

        let resolved = registry.resolve(&["upper", "identity", "upper"]).unwrap();
        let names: Vec<_> = resolved.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["upper", "identity", "upper"]);
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = TransformRegistry::new().with(upper());

        let err = registry.resolve(&["upper", "thumbnail"]).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownTransform(ref id) if id == "thumbnail"));
    }

    #[test]
    fn test_resolve_empty() {
        let registry = TransformRegistry::new();
        let ids: Vec<String> = Vec::new();
        assert!(registry.resolve(&ids).unwrap().is_empty());
    }

    #[test]
    fn test_names_sorted() {
        let registry = TransformRegistry::new()
            .with(upper())
            .with(Arc::new(IdentityTransform::new()));
        assert_eq!(registry.names(), vec!["identity", "upper"]);
    }
}
