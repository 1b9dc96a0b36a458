//! Symbolic links

use declarative::{
    ArgumentKind, Assertion, Context, Error, Field, Policy, Provider, Resource, ResourceType,
    Result,
};
use std::path::Path;

use super::check_path;
use crate::changes::{AttributeChanger, ShellCommand};

const FIELDS: &[Field] = &[
    Field::new("name", ArgumentKind::FullPath).required(),
    Field::new("to", ArgumentKind::FullPath),
    Field::new("owner", ArgumentKind::String),
    Field::new("group", ArgumentKind::String),
];

const APPLY: &[Assertion] = &[Assertion::Present("name"), Assertion::Present("to")];

const REMOVE: &[Assertion] = &[
    Assertion::Present("name"),
    Assertion::Absent("to"),
    Assertion::Absent("owner"),
    Assertion::Absent("group"),
];

pub fn resource_type() -> ResourceType {
    ResourceType::new("Link", FIELDS)
        .with_policy(Policy::new("apply").as_default().signature(APPLY))
        .with_policy(Policy::new("remove").signature(REMOVE))
        .with_provider(LinkProvider)
        .with_provider(RemoveLink)
}

/// Points `name` at `to`, replacing whatever is in the way
struct LinkProvider;

impl Provider for LinkProvider {
    fn name(&self) -> &'static str {
        "link"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["apply"]
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        let name = Path::new(resource.name());
        let Some(to) = resource.get_path("to") else {
            return Err(Error::InvalidProvider(format!("{} has no target", resource.id())));
        };
        check_path(name, ctx)?;

        if !ctx.transport.exists(to) {
            if !ctx.simulate {
                return Err(Error::DanglingSymlink(format!(
                    "Destination of symlink {} does not exist",
                    to.display()
                )));
            }
            ctx.changelog.info(format!(
                "Destination of symlink {} does not exist, assuming it will be created",
                to.display()
            ));
        }

        let current = if ctx.transport.islink(name) {
            Some(ctx.transport.readlink(name)?)
        } else {
            None
        };

        let mut changed = false;
        if current.as_deref() != Some(to) {
            if ctx.transport.exists(name) || ctx.transport.islink(name) {
                changed |= ctx.change(&mut ShellCommand::new(["rm", "-rf", resource.name()]))?;
            }
            let target = to.display().to_string();
            changed |= ctx.change(&mut ShellCommand::new([
                "ln",
                "-s",
                target.as_str(),
                resource.name(),
            ]))?;
        }

        if !ctx.simulate && !ctx.transport.islink(name) {
            return Err(Error::OperationFailed(format!(
                "{} is not a symlink after it was created",
                name.display()
            )));
        }

        let attributes = AttributeChanger {
            owner: resource.get_str("owner"),
            group: resource.get_str("group"),
            mode: None,
            no_dereference: true,
        };
        Ok(attributes.apply(name, ctx)? || changed)
    }
}

struct RemoveLink;

impl Provider for RemoveLink {
    fn name(&self) -> &'static str {
        "remove-link"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["remove"]
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        let name = Path::new(resource.name());
        if !ctx.transport.exists(name) && !ctx.transport.islink(name) {
            return Ok(false);
        }
        if !ctx.transport.islink(name) {
            return Err(Error::InvalidProvider(format!(
                "{} exists and is not a link",
                name.display()
            )));
        }
        ctx.change(&mut ShellCommand::new(["rm", resource.name()]))
    }
}
