//! Provider registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::SubtitleProvider;

/// Mapping from provider id to implementation.
///
/// Adding a provider means registering an implementation here; nothing in
/// the engine branches on provider identity. Registration order is
/// preserved and defines the default fan-out order.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    by_id: HashMap<String, Arc<dyn SubtitleProvider>>,
    order: Vec<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. A second registration under the same id
    /// replaces the first.
    pub fn register(&mut self, provider: Arc<dyn SubtitleProvider>) {
        let id = provider.id().to_string();
        if self.by_id.insert(id.clone(), provider).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn SubtitleProvider>> {
        self.by_id.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Provider ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SubtitleProvider>> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;

    #[test]
    fn test_register_and_get() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("unacs")));
        registry.register(Arc::new(MockProvider::new("subsland")));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("unacs"));
        assert!(registry.get("subsland").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_registration_order_preserved() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("b")));
        registry.register(Arc::new(MockProvider::new("a")));
        registry.register(Arc::new(MockProvider::new("c")));

        assert_eq!(registry.ids(), &["b", "a", "c"]);
    }

    #[test]
    fn test_reregistration_replaces_without_duplicating() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("unacs")));
        registry.register(Arc::new(MockProvider::new("unacs")));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ids(), &["unacs"]);
    }
}
