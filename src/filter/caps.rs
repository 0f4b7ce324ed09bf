//! Capability declarations used to wire filters together.
//!
//! A filter declares one or more [`CapsBundle`]s. A bundle lists
//! properties an input pid must (or must not) carry, and properties the
//! filter's outputs will carry. A pid is accepted when any bundle's input
//! entries all match it.

use smallvec::SmallVec;

use crate::property::{PropertyKey, PropertyMap, PropertyValue};

/// Flags of a capability entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapFlags(u8);

impl CapFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Entry applies to input pids.
    pub const INPUT: Self = Self(1 << 0);
    /// Entry applies to output pids.
    pub const OUTPUT: Self = Self(1 << 1);
    /// Entry matches when the value is NOT present.
    pub const EXCLUDED: Self = Self(1 << 2);

    /// Check if flag is set.
    pub const fn contains(self, flag: Self) -> bool {
        (self.0 & flag.0) == flag.0
    }

    /// Combine flags.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Values a capability entry accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum CapValue {
    /// Any value, as long as the property is present.
    Any,
    /// One of the listed values.
    OneOf(SmallVec<[PropertyValue; 4]>),
}

impl CapValue {
    /// Single accepted value.
    pub fn exact(value: impl Into<PropertyValue>) -> Self {
        let mut values = SmallVec::new();
        values.push(value.into());
        CapValue::OneOf(values)
    }

    /// Several accepted values.
    pub fn one_of<V: Into<PropertyValue>>(values: impl IntoIterator<Item = V>) -> Self {
        CapValue::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Check a property value against this entry. Strings compare
    /// without case.
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match self {
            CapValue::Any => true,
            CapValue::OneOf(values) => values.iter().any(|v| value_eq(v, value)),
        }
    }

    /// The accepted value if exactly one is listed.
    pub fn as_fixed(&self) -> Option<&PropertyValue> {
        match self {
            CapValue::OneOf(values) if values.len() == 1 => values.first(),
            _ => None,
        }
    }
}

fn value_eq(a: &PropertyValue, b: &PropertyValue) -> bool {
    match (a, b) {
        (PropertyValue::String(a), PropertyValue::String(b)) => a.eq_ignore_ascii_case(b),
        (PropertyValue::Enum(a), other) | (other, PropertyValue::Enum(a)) => {
            other.as_enum() == Some(*a)
        }
        (PropertyValue::Uint(_), _) | (_, PropertyValue::Uint(_)) => {
            a.as_uint().is_some() && a.as_uint() == b.as_uint()
        }
        _ => a == b,
    }
}

/// One capability entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    /// Property key.
    pub key: PropertyKey,
    /// Accepted values.
    pub value: CapValue,
    /// Entry flags.
    pub flags: CapFlags,
}

impl Capability {
    fn matches(&self, props: &PropertyMap) -> bool {
        let found = props.get(self.key).is_some_and(|v| self.value.accepts(v));
        if self.flags.contains(CapFlags::EXCLUDED) {
            !found
        } else {
            found
        }
    }
}

/// A set of capability entries evaluated together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapsBundle {
    caps: SmallVec<[Capability; 6]>,
}

impl CapsBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, key: PropertyKey, value: CapValue, flags: CapFlags) -> Self {
        self.caps.push(Capability { key, value, flags });
        self
    }

    /// Require an input property to be one of `values`.
    pub fn input<V: Into<PropertyValue>>(
        self,
        key: PropertyKey,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(key, CapValue::one_of(values), CapFlags::INPUT)
    }

    /// Require an input property to be present with any value.
    pub fn input_any(self, key: PropertyKey) -> Self {
        self.push(key, CapValue::Any, CapFlags::INPUT)
    }

    /// Reject inputs whose property equals `value`.
    pub fn input_excluded(self, key: PropertyKey, value: impl Into<PropertyValue>) -> Self {
        self.push(
            key,
            CapValue::exact(value),
            CapFlags::INPUT.union(CapFlags::EXCLUDED),
        )
    }

    /// Declare an output property.
    pub fn output<V: Into<PropertyValue>>(
        self,
        key: PropertyKey,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(key, CapValue::one_of(values), CapFlags::OUTPUT)
    }

    /// Entries of this bundle.
    pub fn entries(&self) -> &[Capability] {
        &self.caps
    }

    /// Check whether a pid with `props` satisfies every input entry.
    pub fn accepts_input(&self, props: &PropertyMap) -> bool {
        let mut inputs = self
            .caps
            .iter()
            .filter(|c| c.flags.contains(CapFlags::INPUT))
            .peekable();
        if inputs.peek().is_none() {
            return false;
        }
        inputs.all(|c| c.matches(props))
    }

    /// Check whether output `props` fit the declared output entries.
    pub fn matches_output(&self, props: &PropertyMap) -> bool {
        self.caps
            .iter()
            .filter(|c| c.flags.contains(CapFlags::OUTPUT))
            .all(|c| match props.get(c.key) {
                Some(v) => c.value.accepts(v),
                None => true,
            })
    }
}

/// Capabilities of a filter: a list of alternative bundles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCaps {
    bundles: Vec<CapsBundle>,
}

impl FilterCaps {
    /// No capabilities: the filter never auto-wires.
    pub fn none() -> Self {
        Self::default()
    }

    /// Add a bundle.
    pub fn bundle(mut self, bundle: CapsBundle) -> Self {
        self.bundles.push(bundle);
        self
    }

    /// Bundles in declaration order.
    pub fn bundles(&self) -> &[CapsBundle] {
        &self.bundles
    }

    /// Check whether any bundle accepts a pid with `props`.
    pub fn accepts_input(&self, props: &PropertyMap) -> bool {
        self.bundles.iter().any(|b| b.accepts_input(props))
    }

    /// Check whether any bundle declares outputs matching `props`.
    pub fn matches_output(&self, props: &PropertyMap) -> bool {
        self.bundles.iter().any(|b| b.matches_output(props))
    }

    /// Input properties pinned to a single value, taken from the first
    /// bundle declaring them. Used as destination hints upstream.
    pub fn fixed_inputs(&self) -> PropertyMap {
        let mut fixed = PropertyMap::new();
        for bundle in &self.bundles {
            for cap in bundle.entries() {
                if !cap.flags.contains(CapFlags::INPUT) || cap.flags.contains(CapFlags::EXCLUDED) {
                    continue;
                }
                if let Some(value) = cap.value.as_fixed() {
                    if !fixed.contains(cap.key) {
                        fixed.set(cap.key, value.clone());
                    }
                }
            }
        }
        fixed
    }
}
