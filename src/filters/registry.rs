//! Filter registry for looking up filters by name.

use crate::core::error::{ConfigurationError, TilestreamResult};
use crate::core::node::{Category, FilterMetadata, ImageFilter};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Factory building a configured filter from JSON parameters.
pub type FilterFactory =
    Arc<dyn Fn(&Value) -> TilestreamResult<Box<dyn ImageFilter>> + Send + Sync>;

/// Registry entry containing metadata and factory.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Factory function to create instances.
    pub factory: FilterFactory,
    /// Metadata of a default-configured instance.
    pub metadata: FilterMetadata,
    /// Whether this filter is enabled.
    pub enabled: bool,
}

/// Registry for all available filter types.
///
/// Filters are kept in registration order, so listings are stable.
pub struct FilterRegistry {
    filters: IndexMap<String, RegistryEntry>,
    categories: IndexMap<Category, Vec<String>>,
}

impl FilterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            filters: IndexMap::new(),
            categories: IndexMap::new(),
        }
    }

    /// Create a registry pre-populated with built-in filters.
    pub fn with_builtins() -> TilestreamResult<Self> {
        let mut registry = Self::new();
        crate::filters::builtin::register_all(&mut registry)?;
        Ok(registry)
    }

    /// Register a filter type.
    ///
    /// The factory is called once with `null` parameters to read the
    /// metadata, so every factory must accept an empty configuration.
    pub fn register<F>(&mut self, factory: F) -> TilestreamResult<()>
    where
        F: Fn(&Value) -> TilestreamResult<Box<dyn ImageFilter>> + Send + Sync + 'static,
    {
        let metadata = factory(&Value::Null)?.metadata();
        let id = metadata.id.clone();
        let category = metadata.category;

        let entry = RegistryEntry {
            factory: Arc::new(factory),
            metadata,
            enabled: true,
        };

        if self.filters.insert(id.clone(), entry).is_none() {
            self.categories.entry(category).or_default().push(id);
        }
        Ok(())
    }

    /// Build a filter by ID.
    pub fn create(&self, id: &str, params: &Value) -> TilestreamResult<Box<dyn ImageFilter>> {
        match self.filters.get(id).filter(|e| e.enabled) {
            Some(entry) => (entry.factory)(params),
            None => Err(ConfigurationError::UnknownFilter(id.to_string()).into()),
        }
    }

    /// Get metadata for a filter without creating an instance.
    pub fn get_metadata(&self, id: &str) -> Option<&FilterMetadata> {
        self.filters.get(id).map(|e| &e.metadata)
    }

    /// Check if a filter is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.filters.contains_key(id)
    }

    /// Get all registered filter IDs.
    pub fn filter_ids(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(|s| s.as_str())
    }

    /// Metadata of every enabled filter, in registration order.
    pub fn list(&self) -> Vec<&FilterMetadata> {
        self.filters
            .values()
            .filter(|e| e.enabled)
            .map(|e| &e.metadata)
            .collect()
    }

    /// Get filters by category.
    pub fn filters_by_category(&self, category: &Category) -> Vec<&str> {
        self.categories
            .get(category)
            .map(|ids| ids.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Search filters by id, name or description.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();
        self.filters
            .iter()
            .filter(|(id, entry)| {
                id.to_lowercase().contains(&query)
                    || entry.metadata.name.to_lowercase().contains(&query)
                    || entry.metadata.description.to_lowercase().contains(&query)
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Enable or disable a filter.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        if let Some(entry) = self.filters.get_mut(id) {
            entry.enabled = enabled;
            true
        } else {
            false
        }
    }

    /// Unregister a filter.
    pub fn unregister(&mut self, id: &str) -> bool {
        if let Some(entry) = self.filters.shift_remove(id) {
            if let Some(ids) = self.categories.get_mut(&entry.metadata.category) {
                ids.retain(|i| i != id);
            }
            true
        } else {
            false
        }
    }

    /// Get the total number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a filter's JSON parameters; `null` means all defaults.
pub fn parse_parameters<T>(filter: &str, params: &Value) -> TilestreamResult<T>
where
    T: DeserializeOwned + Default,
{
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone()).map_err(|e| {
        ConfigurationError::InvalidParameter {
            filter: filter.to_string(),
            parameter: "parameters".to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TilestreamError;
    use serde_json::json;

    #[test]
    fn test_builtins_listed_in_order() {
        let registry = FilterRegistry::with_builtins().unwrap();
        let ids: Vec<&str> = registry.list().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["majority_voting", "edge_density", "threshold"]);
        assert!(registry
            .filters_by_category(&Category::Classification)
            .contains(&"majority_voting"));
    }

    #[test]
    fn test_create_with_parameters() {
        let registry = FilterRegistry::with_builtins().unwrap();
        let filter = registry
            .create("majority_voting", &json!({ "radius": 2, "tie_policy": { "undecided": 9 } }))
            .unwrap();
        assert_eq!(filter.padding().0, [2, 2]);

        let bad = registry.create("majority_voting", &json!({ "radius": 1, "colour": "red" }));
        assert!(matches!(
            bad,
            Err(TilestreamError::Configuration(ConfigurationError::InvalidParameter { .. }))
        ));
    }

    #[test]
    fn test_unknown_and_disabled() {
        let mut registry = FilterRegistry::with_builtins().unwrap();
        assert!(matches!(
            registry.create("gaussian", &Value::Null),
            Err(TilestreamError::Configuration(ConfigurationError::UnknownFilter(_)))
        ));

        registry.set_enabled("threshold", false);
        assert!(registry.create("threshold", &Value::Null).is_err());
        assert_eq!(registry.list().len(), 2);

        assert!(registry.unregister("threshold"));
        assert!(!registry.contains("threshold"));
        assert!(registry.filters_by_category(&Category::Math).is_empty());
    }

    #[test]
    fn test_search() {
        let registry = FilterRegistry::with_builtins().unwrap();
        assert_eq!(registry.search("DENSITY"), vec!["edge_density"]);
        assert!(registry.search("nonexistent").is_empty());
    }
}
