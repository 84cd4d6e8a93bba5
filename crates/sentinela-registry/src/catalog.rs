use crate::options::MonitorDefinition;
use sentinela_common::name::normalize_monitor_name;
use std::collections::HashMap;
use std::sync::Arc;

/// Every monitor definition this process can run, keyed by normalized
/// name. Compiled monitors and plugin-provided monitors register here;
/// the controller-elected process inserts the corresponding store rows.
#[derive(Default)]
pub struct DefinitionCatalog {
    definitions: HashMap<String, Arc<MonitorDefinition>>,
}

impl DefinitionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under its normalized name. Returns the
    /// name actually used. Re-registration replaces the previous
    /// definition.
    pub fn insert(&mut self, name: &str, definition: MonitorDefinition) -> String {
        let normalized = normalize_monitor_name(name);
        if self
            .definitions
            .insert(normalized.clone(), Arc::new(definition))
            .is_some()
        {
            tracing::warn!(monitor = %normalized, "Monitor definition replaced in catalog");
        }
        normalized
    }

    pub fn get(&self, name: &str) -> Option<Arc<MonitorDefinition>> {
        self.definitions.get(&normalize_monitor_name(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(&normalize_monitor_name(name))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<MonitorDefinition>)> {
        self.definitions
            .iter()
            .map(|(name, definition)| (name.as_str(), definition))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
