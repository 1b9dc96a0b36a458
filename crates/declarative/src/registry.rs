//! Resource type descriptors and the registry that holds them

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::argument::{ArgumentKind, DefaultValue, Field};
use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::provider::{NullProvider, Provider};

/// Fields every resource type carries besides its own table.
///
/// `policy` is handled separately since it is not a plain value.
pub const COMMON_FIELDS: &[Field] = &[
    Field::new("watch", ArgumentKind::List).with_default(DefaultValue::EmptyList),
    Field::new("provider", ArgumentKind::String),
];

/// Schema, policies and providers of one resource type
pub struct ResourceType {
    pub name: &'static str,
    pub fields: &'static [Field],
    policies: Vec<Policy>,
    providers: Vec<Arc<dyn Provider>>,
}

impl ResourceType {
    pub fn new(name: &'static str, fields: &'static [Field]) -> Self {
        Self {
            name,
            fields,
            policies: Vec::new(),
            providers: vec![Arc::new(NullProvider)],
        }
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn with_provider(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Field descriptor by name, including the common fields.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .chain(COMMON_FIELDS)
            .find(|f| f.name == name)
    }

    /// Whether `name` may appear as a key in a declaration of this type.
    pub fn accepts(&self, name: &str) -> bool {
        name == "policy" || self.field(name).is_some()
    }

    /// Policy by name. `null` is available on every type.
    pub fn policy(&self, name: &str) -> Option<Policy> {
        if name == Policy::NULL.name {
            return Some(Policy::NULL);
        }
        self.policies.iter().find(|p| p.name == name).copied()
    }

    /// The first policy flagged default, else the null policy.
    pub fn default_policy(&self) -> Policy {
        self.policies
            .iter()
            .find(|p| p.default)
            .copied()
            .unwrap_or(Policy::NULL)
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Providers implementing `policy`.
    pub fn providers_for(&self, policy: &str) -> Vec<Arc<dyn Provider>> {
        self.providers
            .iter()
            .filter(|p| p.policies().contains(&policy))
            .cloned()
            .collect()
    }

    fn check(&self) -> Result<()> {
        if !self.fields.iter().any(|f| f.name == "name") {
            return Err(Error::parse(format!(
                "Resource type {} does not declare a name field",
                self.name
            )));
        }
        for (i, policy) in self.policies.iter().enumerate() {
            if self.policies[..i].iter().any(|p| p.name == policy.name) {
                return Err(Error::parse(format!(
                    "Resource type {} defines policy '{}' twice",
                    self.name, policy.name
                )));
            }
        }
        for provider in &self.providers {
            if let Some(missing) = provider.policies().iter().find(|p| self.policy(p).is_none()) {
                return Err(Error::parse(format!(
                    "Provider '{}' implements policy '{}' which {} does not have",
                    provider.name(),
                    missing,
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("name", &self.name)
            .field("policies", &self.policies.iter().map(|p| p.name).collect::<Vec<_>>())
            .field("providers", &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Registered resource types, keyed by type name
#[derive(Debug, Default)]
pub struct Registry {
    types: BTreeMap<&'static str, Arc<ResourceType>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type. Type names must be unique.
    pub fn register(&mut self, resource_type: ResourceType) -> Result<()> {
        if self.types.contains_key(resource_type.name) {
            return Err(Error::parse(format!(
                "Redefinition of resource {}",
                resource_type.name
            )));
        }
        resource_type.check()?;
        log::trace!("registered resource type {:?}", resource_type);
        self.types.insert(resource_type.name, Arc::new(resource_type));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ResourceType>> {
        self.types.get(name).cloned()
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }
}
