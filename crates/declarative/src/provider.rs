//! Providers implement policies
//!
//! Each resource type registers a static list of providers. For a given
//! resource and policy exactly one of them must report itself valid.

use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::resource::Resource;

/// Implementation of one or more policies of a resource type
pub trait Provider: Send + Sync {
    /// Name used by an explicit `provider` argument
    fn name(&self) -> &'static str;

    /// Policies this provider implements
    fn policies(&self) -> &'static [&'static str];

    /// Whether this provider can handle `resource` under `policy`.
    ///
    /// An explicit `provider` argument must match by name.
    fn is_valid(&self, _policy: &Policy, resource: &Resource, _ctx: &Context<'_>) -> bool {
        resource
            .provider_override()
            .is_none_or(|name| name == self.name())
    }

    /// Side-effect free pre-flight checks (assets, users, groups).
    fn test(&self, _resource: &Resource, _ctx: &mut Context<'_>) -> Result<()> {
        Ok(())
    }

    /// Converge the target. Returns whether anything changed.
    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool>;
}

/// Provider of the null policy: never changes anything
pub struct NullProvider;

impl Provider for NullProvider {
    fn name(&self) -> &'static str {
        "null"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["null"]
    }

    fn is_valid(&self, _policy: &Policy, _resource: &Resource, _ctx: &Context<'_>) -> bool {
        true
    }

    fn apply(&self, _resource: &Resource, _ctx: &mut Context<'_>) -> Result<bool> {
        Ok(false)
    }
}

/// Pick the single valid provider among `candidates`.
pub fn select_provider(
    candidates: &[Arc<dyn Provider>],
    policy: &Policy,
    resource: &Resource,
    ctx: &Context<'_>,
) -> Result<Arc<dyn Provider>> {
    let valid: Vec<&Arc<dyn Provider>> = candidates
        .iter()
        .filter(|p| p.is_valid(policy, resource, ctx))
        .collect();

    match valid.as_slice() {
        [only] => {
            log::debug!(
                "{} policy '{}' uses provider '{}'",
                resource.id(),
                policy.name,
                only.name()
            );
            Ok(Arc::clone(only))
        }
        [] => Err(Error::NoSuitableProviders {
            resource: resource.id(),
            policy: policy.name.to_string(),
        }),
        many => Err(Error::TooManyProviders {
            resource: resource.id(),
            policy: policy.name.to_string(),
            providers: many.iter().map(|p| p.name()).collect::<Vec<_>>().join(", "),
        }),
    }
}
