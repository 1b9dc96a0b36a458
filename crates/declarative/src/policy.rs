//! Policies and their declaration forms
//!
//! A [`Policy`] is a named mode of managing a resource, gated by a signature
//! of [`Assertion`]s over which arguments are declared. Resources select
//! policies either literally (`policy = "remove"`) or through triggers bound
//! to upstream resources, captured by [`PolicyCollection`].

use serde_json::Value;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::provider::{Provider, select_provider};
use crate::resource::Resource;

/// A predicate over argument presence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assertion {
    /// The argument is declared (or defaulted)
    Present(&'static str),
    /// The argument is not declared
    Absent(&'static str),
    /// Every sub-assertion holds
    And(&'static [Assertion]),
    /// At most one sub-assertion holds
    Nand(&'static [Assertion]),
    /// Exactly one sub-assertion holds
    Xor(&'static [Assertion]),
}

impl Assertion {
    /// Evaluate against a resource.
    ///
    /// Naming an argument the resource type does not have is an error.
    pub fn test(&self, resource: &Resource) -> Result<bool> {
        match self {
            Self::Present(name) => resource.is_present(name),
            Self::Absent(name) => resource.is_present(name).map(|present| !present),
            Self::And(inner) => Ok(count_true(inner, resource)? == inner.len()),
            Self::Nand(inner) => Ok(count_true(inner, resource)? <= 1),
            Self::Xor(inner) => Ok(count_true(inner, resource)? == 1),
        }
    }
}

fn count_true(assertions: &[Assertion], resource: &Resource) -> Result<usize> {
    let mut count = 0;
    for assertion in assertions {
        if assertion.test(resource)? {
            count += 1;
        }
    }
    Ok(count)
}

/// A named, signature-gated mode of managing a resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub name: &'static str,
    pub default: bool,
    pub signature: &'static [Assertion],
}

impl Policy {
    /// The policy that does nothing, used when a type has no default.
    pub const NULL: Self = Self::new("null");

    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            default: false,
            signature: &[],
        }
    }

    /// Mark this as the type's default policy.
    pub const fn as_default(mut self) -> Self {
        self.default = true;
        self
    }

    pub const fn signature(mut self, signature: &'static [Assertion]) -> Self {
        self.signature = signature;
        self
    }

    /// Whether every assertion of the signature holds for `resource`.
    pub fn conforms(&self, resource: &Resource) -> Result<bool> {
        for assertion in self.signature {
            if !assertion.test(resource)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Like [`conforms`](Self::conforms), failing with `NonConformingPolicy`.
    pub fn validate(&self, resource: &Resource) -> Result<()> {
        if self.conforms(resource)? {
            Ok(())
        } else {
            Err(Error::NonConformingPolicy {
                resource: resource.id(),
                policy: self.name.to_string(),
            })
        }
    }

    /// The single provider valid for this policy and resource.
    pub fn get_provider(&self, resource: &Resource, ctx: &Context<'_>) -> Result<Arc<dyn Provider>> {
        let candidates = resource.resource_type().providers_for(self.name);
        select_provider(&candidates, self, resource, ctx)
    }
}

/// "Switch to `policy` when `on` fires `when`"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTrigger {
    /// Policy the downstream resource switches to
    pub policy: String,
    /// Event (policy name) fired by the upstream resource
    pub when: String,
    /// Upstream resource id, e.g. `File[/etc/motd]`
    pub on: String,
}

/// The resolved `policy` argument of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyCollection {
    /// `policy = "remove"`
    Literal(String),
    /// `policy = { restart = { when = "apply", on = "File[/etc/x]" } }`
    Triggered(Vec<PolicyTrigger>),
}

impl PolicyCollection {
    /// Parse the `policy` node of a declaration. A missing node yields `None`.
    pub fn parse(node: &Node) -> Result<Option<Self>> {
        if node.is_missing() {
            return Ok(None);
        }
        if !node.is_mapping() {
            let name = node
                .as_string()
                .map_err(|_| Error::parse_at("Not a valid policy declaration", node.anchor()))?;
            return Ok(Some(Self::Literal(name)));
        }

        let mut triggers = Vec::new();
        // Keys are policy names, which may contain dashes, so they are read raw.
        for (policy, conditions) in node.as_dict()? {
            let conditions = Node::new(conditions, node.anchor().key(&policy));
            let items = if conditions.is_list() {
                conditions.get_iterable()?
            } else {
                vec![conditions]
            };
            if items.is_empty() {
                return Err(Error::parse_at(
                    format!("policy '{policy}' has no trigger conditions"),
                    node.anchor(),
                ));
            }
            for item in items {
                triggers.push(parse_trigger(&policy, &item)?);
            }
        }

        if triggers.is_empty() {
            return Err(Error::parse_at("empty policy block", node.anchor()));
        }
        Ok(Some(Self::Triggered(triggers)))
    }

    /// The literal policy name; `None` for trigger-only declarations,
    /// which behave as the null policy until triggered.
    pub fn literal(&self) -> Option<&str> {
        match self {
            Self::Literal(name) => Some(name),
            Self::Triggered(_) => None,
        }
    }

    pub fn triggers(&self) -> &[PolicyTrigger] {
        match self {
            Self::Literal(_) => &[],
            Self::Triggered(triggers) => triggers,
        }
    }

    /// Every policy name a trigger could select, in declaration order.
    pub fn trigger_policies(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for trigger in self.triggers() {
            if !names.contains(&trigger.policy.as_str()) {
                names.push(&trigger.policy);
            }
        }
        names
    }
}

fn parse_trigger(policy: &str, node: &Node) -> Result<PolicyTrigger> {
    if !node.is_mapping() {
        return Err(Error::parse_at(
            format!("trigger for policy '{policy}' must be a mapping with 'when' and 'on'"),
            node.anchor(),
        ));
    }
    let field = |name: &str| -> Result<String> {
        let child = node.get_key(name);
        match child.resolve()? {
            Value::String(s) => Ok(s.clone()),
            _ => Err(Error::parse_at(
                format!("'{name}' of a trigger must be a string"),
                child.anchor(),
            )),
        }
    };
    Ok(PolicyTrigger {
        policy: policy.to_string(),
        when: field("when")?,
        on: field("on")?,
    })
}
