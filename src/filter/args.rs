//! Declarative filter arguments.

use crate::error::{Error, Result};
use crate::property::PropertyValue;

/// Type of an argument value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Boolean flag.
    Bool,
    /// Unsigned integer.
    Uint,
    /// Floating point number.
    Double,
    /// Free-form string.
    String,
}

/// Description of one filter argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgDescriptor {
    /// Argument name.
    pub name: &'static str,
    /// Value type.
    pub kind: ArgType,
    /// Value used when the argument is not given.
    pub default: Option<PropertyValue>,
    /// Help text.
    pub description: &'static str,
}

impl ArgDescriptor {
    /// Boolean argument.
    pub fn bool(name: &'static str, default: bool, description: &'static str) -> Self {
        Self {
            name,
            kind: ArgType::Bool,
            default: Some(PropertyValue::Bool(default)),
            description,
        }
    }

    /// Unsigned integer argument.
    pub fn uint(name: &'static str, default: u64, description: &'static str) -> Self {
        Self {
            name,
            kind: ArgType::Uint,
            default: Some(PropertyValue::Uint(default)),
            description,
        }
    }

    /// Floating point argument.
    pub fn double(name: &'static str, default: f64, description: &'static str) -> Self {
        Self {
            name,
            kind: ArgType::Double,
            default: Some(PropertyValue::Double(default)),
            description,
        }
    }

    /// String argument, optional when `default` is `None`.
    pub fn string(
        name: &'static str,
        default: Option<&'static str>,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind: ArgType::String,
            default: default.map(PropertyValue::from),
            description,
        }
    }

    /// Convert a value to this argument's type.
    ///
    /// Strings are parsed, integers widen to doubles.
    pub fn coerce(&self, value: &PropertyValue) -> Result<PropertyValue> {
        let bad = || {
            Error::BadParam(format!(
                "argument {}: cannot use {value} as {:?}",
                self.name, self.kind
            ))
        };
        match (self.kind, value) {
            (ArgType::Bool, PropertyValue::Bool(_))
            | (ArgType::Uint, PropertyValue::Uint(_))
            | (ArgType::Double, PropertyValue::Double(_))
            | (ArgType::String, PropertyValue::String(_)) => Ok(value.clone()),
            (ArgType::Bool, PropertyValue::String(s)) => match s.as_str() {
                "true" | "yes" | "1" => Ok(PropertyValue::Bool(true)),
                "false" | "no" | "0" => Ok(PropertyValue::Bool(false)),
                _ => Err(bad()),
            },
            (ArgType::Uint, PropertyValue::String(s)) => {
                s.parse().map(PropertyValue::Uint).map_err(|_| bad())
            }
            (ArgType::Uint, PropertyValue::Int(v)) if *v >= 0 => Ok(PropertyValue::Uint(*v as u64)),
            (ArgType::Double, PropertyValue::String(s)) => {
                s.parse().map(PropertyValue::Double).map_err(|_| bad())
            }
            (ArgType::Double, other) => other.as_double().map(PropertyValue::Double).ok_or_else(bad),
            (ArgType::String, other) => Ok(PropertyValue::String(other.to_string())),
            _ => Err(bad()),
        }
    }
}

/// Named argument values passed to a filter constructor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterArgs {
    values: Vec<(String, PropertyValue)>,
}

impl FilterArgs {
    /// Create an empty argument set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style set.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set or overwrite an argument.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(n, _)| *n == name) {
            Some((_, current)) => *current = value,
            None => self.values.push((name, value)),
        }
    }

    /// Get an argument.
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(PropertyValue::as_bool)
    }

    /// Get an unsigned integer argument.
    pub fn get_uint(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(PropertyValue::as_uint)
    }

    /// Get a floating point argument.
    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(PropertyValue::as_double)
    }

    /// Get a string argument.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropertyValue::as_str)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no argument is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Validate `given` against `descriptors` and fill in defaults.
///
/// Returns the typed arguments and, when `wildcard` is set, the
/// undeclared arguments to forward to the filter as options.
pub(crate) fn resolve(
    descriptors: &[ArgDescriptor],
    wildcard: bool,
    given: &FilterArgs,
) -> Result<(FilterArgs, Vec<(String, PropertyValue)>)> {
    let mut resolved = FilterArgs::new();
    let mut extra = Vec::new();

    for desc in descriptors {
        if let Some(default) = &desc.default {
            resolved.set(desc.name, default.clone());
        }
    }
    for (name, value) in given.iter() {
        match descriptors.iter().find(|d| d.name == name) {
            Some(desc) => resolved.set(name, desc.coerce(value)?),
            None if wildcard => extra.push((name.to_string(), value.clone())),
            None => return Err(Error::BadParam(format!("unknown argument {name}"))),
        }
    }
    Ok((resolved, extra))
}
