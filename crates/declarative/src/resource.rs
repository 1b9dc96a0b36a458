//! Resources: declared units of desired state
//!
//! A resource moves through `Unvalidated -> Validated -> Applied`. All of its
//! arguments are resolved when it is constructed, so declaration errors are
//! reported before anything on the target is touched.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::argument::Argument;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::node::{Anchor, Node};
use crate::policy::{Policy, PolicyCollection, PolicyTrigger};
use crate::registry::{COMMON_FIELDS, ResourceType};

/// Where a resource is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Unvalidated,
    Validated,
    Applied { changed: bool },
}

/// A downstream resource waiting on an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observer {
    /// Downstream resource id
    pub resource: String,
    /// Policy the downstream resource switches to
    pub policy: String,
}

/// One declared unit of desired state
#[derive(Debug)]
pub struct Resource {
    kind: Arc<ResourceType>,
    name: String,
    arguments: BTreeMap<&'static str, Argument>,
    declared: Vec<String>,
    policy: Option<PolicyCollection>,
    observers: BTreeMap<String, Vec<Observer>>,
    anchor: Anchor,
    watched: bool,
    original_hash: Option<String>,
    lifecycle: Lifecycle,
}

impl Resource {
    /// Build a resource of type `kind` from its declaration mapping.
    pub fn new(kind: Arc<ResourceType>, node: &Node) -> Result<Self> {
        if !node.is_mapping() {
            return Err(Error::parse_at(
                format!("Not a valid {} definition", kind.name),
                node.anchor(),
            ));
        }

        let declared = node.keys()?;
        for key in &declared {
            if !kind.accepts(key) {
                return Err(Error::parse_at(
                    format!("'{}' is not a valid option for resource {}", key, kind.name),
                    node.anchor(),
                ));
            }
        }

        let mut arguments = BTreeMap::new();
        for field in kind.fields.iter().chain(COMMON_FIELDS) {
            if let Some(value) = field.resolve(&node.get_key(field.name))? {
                arguments.insert(field.name, value);
            }
        }

        let name = arguments
            .get("name")
            .and_then(Argument::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::parse_at(format!("{} resource has no name", kind.name), node.anchor())
            })?;

        let resource = Self {
            policy: PolicyCollection::parse(&node.get_key("policy"))?,
            kind,
            name,
            arguments,
            declared,
            observers: BTreeMap::new(),
            anchor: node.anchor().clone(),
            watched: false,
            original_hash: None,
            lifecycle: Lifecycle::Unvalidated,
        };
        resource.potential_policies()?;
        Ok(resource)
    }

    /// `Type[name]`
    pub fn id(&self) -> String {
        format!("{}[{}]", self.kind.name, self.name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.kind
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Resolved argument, or `None` if neither declared nor defaulted.
    ///
    /// Asking for an argument the type does not have is an error.
    pub fn argument(&self, name: &str) -> Result<Option<&Argument>> {
        if self.kind.field(name).is_none() {
            return Err(Error::UnknownArgument {
                resource_type: self.kind.name.to_string(),
                argument: name.to_string(),
            });
        }
        Ok(self.arguments.get(name))
    }

    /// Resolved arguments keyed by field name.
    pub fn arguments(&self) -> &BTreeMap<&'static str, Argument> {
        &self.arguments
    }

    /// String argument; a missing argument or a programming error yields `None`.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).and_then(Argument::as_str)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.arguments.get(name).and_then(Argument::as_int)
    }

    pub fn get_mode(&self, name: &str) -> Option<u32> {
        self.arguments.get(name).and_then(Argument::as_mode)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.arguments.get(name).and_then(Argument::as_bool)
    }

    pub fn get_path(&self, name: &str) -> Option<&Path> {
        self.arguments.get(name).and_then(Argument::as_path)
    }

    pub fn get_list(&self, name: &str) -> Option<&[Value]> {
        self.arguments.get(name).and_then(Argument::as_list)
    }

    pub fn get_dict(&self, name: &str) -> Option<&serde_json::Map<String, Value>> {
        self.arguments.get(name).and_then(Argument::as_dict)
    }

    /// Whether an argument is declared or defaulted. Used by policy signatures.
    pub fn is_present(&self, name: &str) -> Result<bool> {
        if name == "policy" {
            return Ok(self.policy.is_some());
        }
        Ok(self.argument(name)?.is_some())
    }

    /// The explicit `provider` argument.
    pub fn provider_override(&self) -> Option<&str> {
        self.get_str("provider")
    }

    /// Paths declared under `watch`.
    pub fn watch(&self) -> Vec<String> {
        self.get_list("watch")
            .unwrap_or_default()
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn policy_collection(&self) -> Option<&PolicyCollection> {
        self.policy.as_ref()
    }

    pub fn triggers(&self) -> &[PolicyTrigger] {
        match &self.policy {
            Some(collection) => collection.triggers(),
            None => &[],
        }
    }

    /// The policy used when no override is in effect.
    pub fn literal_policy(&self) -> Result<Policy> {
        match self.policy.as_ref().map(PolicyCollection::literal) {
            None => Ok(self.kind.default_policy()),
            Some(None) => Ok(Policy::NULL),
            Some(Some(name)) => self.lookup_policy(name),
        }
    }

    /// Every policy this resource could be applied under: the literal
    /// policy first, then each policy a trigger could select.
    pub fn potential_policies(&self) -> Result<Vec<Policy>> {
        let mut policies = vec![self.literal_policy()?];
        if let Some(collection) = &self.policy {
            for name in collection.trigger_policies() {
                let policy = self.lookup_policy(name)?;
                if !policies.contains(&policy) {
                    policies.push(policy);
                }
            }
        }
        Ok(policies)
    }

    fn lookup_policy(&self, name: &str) -> Result<Policy> {
        self.kind.policy(name).ok_or_else(|| Error::NoValidPolicy {
            resource: self.id(),
            policy: name.to_string(),
        })
    }

    /// Register `observer` to be overridden when this resource fires `event`.
    pub fn register_observer(&mut self, event: &str, observer: Observer) {
        self.observers
            .entry(event.to_string())
            .or_default()
            .push(observer);
    }

    pub fn observers(&self) -> &BTreeMap<String, Vec<Observer>> {
        &self.observers
    }

    pub(crate) fn clear_observers(&mut self) {
        self.observers.clear();
    }

    /// Whether this resource was synthesised from another resource's `watch`.
    pub fn is_watched(&self) -> bool {
        self.watched
    }

    pub(crate) fn mark_watched(&mut self) {
        self.watched = true;
    }

    /// Hash of the file named by this resource before the run started.
    pub fn original_hash(&self) -> Option<&str> {
        self.original_hash.as_deref()
    }

    /// Content hash of the file named by this resource, `None` if it does
    /// not exist.
    pub fn hash(&self, ctx: &Context<'_>) -> Result<Option<String>> {
        let path = Path::new(&self.name);
        if !ctx.transport.isfile(path) {
            return Ok(None);
        }
        let contents = ctx.transport.get(path)?;
        Ok(Some(blake3::hash(&contents).to_hex().to_string()))
    }

    /// Record the pre-apply hash used to detect changes to watched files.
    pub fn snapshot_hash(&mut self, ctx: &Context<'_>) -> Result<()> {
        self.original_hash = self.hash(ctx)?;
        log::debug!("{} hash before apply: {:?}", self.id(), self.original_hash);
        Ok(())
    }

    /// Check that every potential policy conforms and resolves to exactly
    /// one provider.
    pub fn validate(&mut self, ctx: &Context<'_>) -> Result<()> {
        for key in &self.declared {
            if !self.kind.accepts(key) {
                return Err(Error::parse_at(
                    format!("'{}' is not a valid option for resource {}", key, self.kind.name),
                    &self.anchor,
                ));
            }
        }
        for policy in self.potential_policies()? {
            policy.validate(self)?;
            policy.get_provider(self, ctx)?;
        }
        self.lifecycle = Lifecycle::Validated;
        Ok(())
    }

    /// Run the side-effect free checks of every potential policy's provider.
    pub fn test(&self, ctx: &mut Context<'_>) -> Result<()> {
        for policy in self.potential_policies()? {
            let provider = policy.get_provider(self, ctx)?;
            provider.test(self, ctx)?;
        }
        Ok(())
    }

    /// Apply the resource and report whether it changed anything.
    ///
    /// A pending event override wins over `policy`, which wins over the
    /// resource's literal or default policy. The override is consumed
    /// whatever the outcome.
    pub fn apply(&mut self, ctx: &mut Context<'_>, policy: Option<&str>) -> Result<bool> {
        let id = self.id();
        let policy = match ctx.state.overridden_policy(&id).or(policy) {
            Some(name) => self.lookup_policy(name)?,
            None => self.literal_policy()?,
        };
        log::debug!("applying {} with policy '{}'", id, policy.name);

        let result = self.run_provider(policy, ctx);
        ctx.state.clear_override(&id)?;
        let changed = result?;

        self.lifecycle = Lifecycle::Applied { changed };
        if changed {
            self.fire_event(policy.name, ctx)?;
        }
        Ok(changed)
    }

    fn run_provider(&self, policy: Policy, ctx: &mut Context<'_>) -> Result<bool> {
        policy.validate(self)?;
        let provider = policy.get_provider(self, ctx)?;
        provider.apply(self, ctx)
    }

    /// Install policy overrides on every observer of `event`.
    pub fn fire_event(&self, event: &str, ctx: &mut Context<'_>) -> Result<()> {
        for observer in self.observers.get(event).into_iter().flatten() {
            log::debug!(
                "{} fired '{}': {} will use policy '{}'",
                self.id(),
                event,
                observer.resource,
                observer.policy
            );
            ctx.state.override_policy(&observer.resource, &observer.policy)?;
        }
        Ok(())
    }
}
