//! Filter registration descriptors.

use std::fmt;
use std::sync::Arc;

use super::args::{ArgDescriptor, FilterArgs, resolve};
use super::caps::FilterCaps;
use super::Filter;
use crate::error::Result;
use crate::property::PropertyValue;

/// Constructor creating a filter from resolved arguments.
pub type FilterConstructor = Arc<dyn Fn(&FilterArgs) -> Result<Box<dyn Filter>> + Send + Sync>;

/// Everything the graph needs to know about a filter kind.
#[derive(Clone)]
pub struct FilterRegister {
    name: String,
    description: String,
    args: Vec<ArgDescriptor>,
    caps: FilterCaps,
    wildcard_args: bool,
    constructor: FilterConstructor,
}

impl fmt::Debug for FilterRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegister")
            .field("name", &self.name)
            .field("args", &self.args.len())
            .field("caps", &self.caps.bundles().len())
            .finish()
    }
}

impl FilterRegister {
    /// Create a register for `name`.
    pub fn new(
        name: impl Into<String>,
        constructor: impl Fn(&FilterArgs) -> Result<Box<dyn Filter>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            args: Vec::new(),
            caps: FilterCaps::none(),
            wildcard_args: false,
            constructor: Arc::new(constructor),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare an argument.
    pub fn with_arg(mut self, arg: ArgDescriptor) -> Self {
        self.args.push(arg);
        self
    }

    /// Set the capabilities.
    pub fn with_caps(mut self, caps: FilterCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Accept undeclared arguments and forward them to
    /// [`Filter::update_arg`].
    pub fn wildcard_args(mut self) -> Self {
        self.wildcard_args = true;
        self
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared arguments.
    pub fn args(&self) -> &[ArgDescriptor] {
        &self.args
    }

    /// Capabilities.
    pub fn caps(&self) -> &FilterCaps {
        &self.caps
    }

    /// Build a filter. Undeclared arguments of wildcard filters are passed
    /// through `update_arg`.
    pub fn instantiate(&self, args: &FilterArgs) -> Result<Box<dyn Filter>> {
        let (resolved, extra) = resolve(&self.args, self.wildcard_args, args)?;
        let mut filter = (self.constructor)(&resolved)?;
        for (name, value) in &extra {
            filter.update_arg(name, value)?;
        }
        Ok(filter)
    }

    /// Undeclared arguments `args` would forward, for inspection.
    pub fn extra_args(&self, args: &FilterArgs) -> Result<Vec<(String, PropertyValue)>> {
        resolve(&self.args, self.wildcard_args, args).map(|(_, extra)| extra)
    }
}
