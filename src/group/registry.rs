//! Group Registry
//!
//! An explicit, shareable registry mapping group names to group instances,
//! owned by the application's composition root and passed by reference to
//! whatever needs lookup (the peer HTTP server resolves request paths
//! through it). One lock guards the map; it is read on every lookup and
//! written once per namespace.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::Group;

/// Named registry of cache groups.
#[derive(Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group under its name.
    ///
    /// Returns the group previously registered under the same name, if any
    /// (the caller decides whether displacement is acceptable).
    pub fn register(&self, group: Arc<Group>) -> Option<Arc<Group>> {
        self.groups
            .write()
            .insert(group.name().to_owned(), group)
    }

    /// Look up a group by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Names of all registered groups.
    pub fn names(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }

    /// Number of registered groups.
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    /// True if no groups are registered.
    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}

impl std::fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("groups", &self.names())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{Loader, LoaderFn};

    fn echo_loader() -> Arc<dyn Loader> {
        Arc::new(LoaderFn::new(|key: String| async move {
            Ok(key.into_bytes().into())
        }))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = GroupRegistry::new();
        assert!(registry.is_empty());

        let group = Arc::new(Group::new("users", 0, echo_loader()));
        assert!(registry.register(Arc::clone(&group)).is_none());

        let found = registry.lookup("users").expect("group registered");
        assert!(Arc::ptr_eq(&found, &group));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_name() {
        let registry = GroupRegistry::new();
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn test_reregistration_displaces_previous_group() {
        let registry = GroupRegistry::new();
        let first = Arc::new(Group::new("users", 0, echo_loader()));
        let second = Arc::new(Group::new("users", 0, echo_loader()));

        registry.register(Arc::clone(&first));
        let displaced = registry.register(Arc::clone(&second));

        assert!(Arc::ptr_eq(&displaced.expect("first group displaced"), &first));
        let found = registry.lookup("users").expect("group registered");
        assert!(Arc::ptr_eq(&found, &second));
    }

    #[test]
    fn test_names_lists_groups() {
        let registry = GroupRegistry::new();
        registry.register(Arc::new(Group::new("a", 0, echo_loader())));
        registry.register(Arc::new(Group::new("b", 0, echo_loader())));

        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
}
