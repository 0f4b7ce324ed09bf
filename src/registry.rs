//! Registry of filter kinds available to a session.
//!
//! The registry is an explicit value built at startup and handed to the
//! session; there is no process-wide table. Filters wrapping external
//! libraries are registered with their library handle:
//!
//! ```rust,ignore
//! let mut registry = FilterRegistry::with_builtins();
//! registry.register(m2psdmx::register(Arc::new(MyParser)));
//! registry.register(ffenc::register(Arc::new(MyCodecs)));
//! let session = Session::new(Arc::new(registry), SessionConfig::default());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filter::{Filter, FilterArgs, FilterRegister};
use crate::filters;
use crate::property::PropertyMap;

/// Registry of filter registers by name.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    registers: HashMap<String, Arc<FilterRegister>>,
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the library-free filters (`fin`, `inspect`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(filters::fin::register());
        registry.register(filters::inspect::register());
        registry
    }

    /// Register a filter kind. A previous register with the same name is
    /// replaced.
    pub fn register(&mut self, register: FilterRegister) {
        let name = register.name().to_string();
        if self
            .registers
            .insert(name.clone(), Arc::new(register))
            .is_some()
        {
            tracing::warn!(filter = %name, "filter register replaced");
        }
    }

    /// Look up a register.
    pub fn get(&self, name: &str) -> Option<Arc<FilterRegister>> {
        self.registers.get(name).cloned()
    }

    /// Check if a filter kind is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registers.contains_key(name)
    }

    /// Instantiate a filter by name.
    pub fn create(
        &self,
        name: &str,
        args: &FilterArgs,
    ) -> Result<(Arc<FilterRegister>, Box<dyn Filter>)> {
        let register = self
            .get(name)
            .ok_or_else(|| Error::FilterNotFound(name.to_string()))?;
        let filter = register.instantiate(args)?;
        Ok((register, filter))
    }

    /// Registers whose input capabilities accept a pid with `props`,
    /// sorted by name.
    pub fn find_accepting(&self, props: &PropertyMap) -> Vec<Arc<FilterRegister>> {
        let mut found: Vec<_> = self
            .registers
            .values()
            .filter(|r| r.caps().accepts_input(props))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name().cmp(b.name()));
        found
    }

    /// All registered names, sorted.
    pub fn list_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::StreamType;
    use crate::property::PropertyKey;

    #[test]
    fn test_builtins() {
        let registry = FilterRegistry::with_builtins();
        assert!(registry.is_registered("fin"));
        assert!(registry.is_registered("inspect"));
        assert_eq!(registry.list_filters(), vec!["fin", "inspect"]);
    }

    #[test]
    fn test_create_unknown() {
        let registry = FilterRegistry::new();
        assert!(matches!(
            registry.create("nope", &FilterArgs::new()),
            Err(Error::FilterNotFound(_))
        ));
    }

    #[test]
    fn test_find_accepting() {
        let registry = FilterRegistry::with_builtins();
        let props = PropertyMap::new().with(PropertyKey::StreamType, StreamType::Visual);
        let names: Vec<_> = registry
            .find_accepting(&props)
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["inspect"]);
    }
}
