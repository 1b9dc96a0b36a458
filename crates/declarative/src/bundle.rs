//! Ordered resource collections
//!
//! A [`ResourceBundle`] keeps resources in declaration order. Triggers may
//! only point at resources declared earlier: declaration order is the
//! dependency order, and events propagate in a single forward pass.

use serde_json::json;
use std::collections::HashMap;

use crate::changelog::Outcome;
use crate::context::{Context, NoProgress, ProgressCallback};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::registry::Registry;
use crate::resource::{Observer, Resource};

/// Resource type used for `watch` entries
pub const WATCH_TYPE: &str = "File";

/// Policy given to resources synthesised from `watch` entries
pub const WATCHED_POLICY: &str = "watched";

/// An ordered, id-indexed collection of resources
#[derive(Debug, Default)]
pub struct ResourceBundle {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    bound: bool,
}

impl ResourceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bundle from a list of `{ TypeName: mapping | [mapping] }` items.
    pub fn from_node(registry: &Registry, node: &Node) -> Result<Self> {
        let mut bundle = Self::new();
        for item in node.get_iterable()? {
            bundle.add_from_node(registry, &item)?;
        }
        Ok(bundle)
    }

    /// Add every resource declared by one list item.
    pub fn add_from_node(&mut self, registry: &Registry, node: &Node) -> Result<()> {
        if !node.is_mapping() {
            return Err(Error::parse_at("Not a valid Resource definition", node.anchor()));
        }
        let keys = node.keys()?;
        let [type_name] = keys.as_slice() else {
            return Err(Error::parse_at("Too many keys in list item", node.anchor()));
        };

        let instances = node.get_key(type_name);
        let instances = if instances.is_list() {
            instances.get_iterable()?
        } else {
            vec![instances]
        };
        for instance in instances {
            self.add(registry, type_name, &instance)?;
        }
        Ok(())
    }

    /// Add a single resource of `type_name`, followed by a `File` resource
    /// for each path it watches. Returns the position of the resource.
    pub fn add(&mut self, registry: &Registry, type_name: &str, node: &Node) -> Result<usize> {
        if !node.is_mapping() {
            return Err(Error::parse_at(
                format!("Expected mapping for {type_name}"),
                node.anchor(),
            ));
        }
        let kind = registry.get(type_name).ok_or_else(|| {
            Error::parse_at(
                format!("There is no resource type of '{type_name}'"),
                node.anchor(),
            )
        })?;

        let resource = Resource::new(kind, node)?;
        let watch = resource.watch();
        let position = self.insert(resource, node)?;

        let watch_anchor = node.anchor().key("watch");
        for (i, path) in watch.into_iter().enumerate() {
            let kind = registry.get(WATCH_TYPE).ok_or_else(|| {
                Error::parse_at(
                    format!("There is no resource type of '{WATCH_TYPE}'"),
                    &watch_anchor,
                )
            })?;
            let declaration = Node::new(
                json!({ "name": path, "policy": WATCHED_POLICY }),
                watch_anchor.index(i),
            );
            let mut watched = Resource::new(kind, &declaration)?;
            watched.mark_watched();
            self.insert(watched, &declaration)?;
        }

        self.bound = false;
        Ok(position)
    }

    fn insert(&mut self, resource: Resource, node: &Node) -> Result<usize> {
        let id = resource.id();
        if self.index.contains_key(&id) {
            return Err(Error::parse_at(
                format!("'{id}' cannot be defined multiple times"),
                node.anchor(),
            ));
        }
        log::trace!("added {id}");
        self.resources.push(resource);
        self.index.insert(id, self.resources.len() - 1);
        Ok(self.resources.len() - 1)
    }

    /// Register every trigger as an observer on its upstream resource.
    ///
    /// The upstream resource must exist, must not be the resource itself and
    /// must be declared earlier. Its `when` must name one of its policies.
    pub fn bind(&mut self) -> Result<()> {
        for resource in &mut self.resources {
            resource.clear_observers();
        }

        let mut bindings = Vec::new();
        for (i, resource) in self.resources.iter().enumerate() {
            let id = resource.id();
            for trigger in resource.triggers() {
                let j = *self.index.get(&trigger.on).ok_or_else(|| {
                    Error::Binding(format!(
                        "Cannot bind {} to {}: no such resource",
                        id, trigger.on
                    ))
                })?;
                if j == i {
                    return Err(Error::Binding(format!("Attempt to bind {id} to itself")));
                }
                if j > i {
                    return Err(Error::Binding(format!(
                        "Attempt to bind forwards on {id}: {} is declared later",
                        trigger.on
                    )));
                }
                if self.resources[j].resource_type().policy(&trigger.when).is_none() {
                    return Err(Error::Binding(format!(
                        "{} has no policy '{}' for {} to observe",
                        trigger.on, trigger.when, id
                    )));
                }
                log::debug!(
                    "{} will use '{}' when {} fires '{}'",
                    id,
                    trigger.policy,
                    trigger.on,
                    trigger.when
                );
                bindings.push((
                    j,
                    trigger.when.clone(),
                    Observer {
                        resource: id.clone(),
                        policy: trigger.policy.clone(),
                    },
                ));
            }
        }

        for (j, when, observer) in bindings {
            self.resources[j].register_observer(&when, observer);
        }
        self.bound = true;
        Ok(())
    }

    /// Validate every resource.
    pub fn validate(&mut self, ctx: &Context<'_>) -> Result<()> {
        for resource in &mut self.resources {
            resource.validate(ctx)?;
        }
        Ok(())
    }

    /// Validate and run the pre-flight checks of every resource.
    pub fn test(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        if !self.bound {
            self.bind()?;
        }
        for resource in &mut self.resources {
            resource.validate(ctx)?;
            resource.test(ctx)?;
        }
        Ok(())
    }

    /// Apply every resource in order. Returns whether anything changed.
    pub fn apply(&mut self, ctx: &mut Context<'_>) -> Result<bool> {
        self.apply_with_progress(ctx, &mut NoProgress)
    }

    /// Like [`apply`](Self::apply), reporting progress as it goes.
    ///
    /// The first failing resource aborts the run; resources already applied
    /// are left as they are.
    pub fn apply_with_progress(
        &mut self,
        ctx: &mut Context<'_>,
        progress: &mut dyn ProgressCallback,
    ) -> Result<bool> {
        if !self.bound {
            self.bind()?;
        }
        self.validate(ctx)?;
        for resource in self.resources.iter_mut().filter(|r| r.is_watched()) {
            resource.snapshot_hash(ctx)?;
        }

        let total = self.resources.len();
        progress.on_apply_start(total);
        let mut something_changed = false;
        for (i, resource) in self.resources.iter_mut().enumerate() {
            let id = resource.id();
            progress.on_resource_start(&id, i + 1, total);
            let result = ctx.resource(&id, |ctx| resource.apply(ctx, None));
            progress.on_resource_complete(&id, &Outcome::of(&result));
            if result? {
                something_changed = true;
            }
        }
        progress.on_apply_complete();
        Ok(something_changed)
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.index.get(id).map(|&i| &self.resources[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
